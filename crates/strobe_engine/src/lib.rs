//! Core engine for the Strobe simulation bridge.
//!
//! Strobe sits between a test pattern generator and a cycle-based logic
//! simulation. The generator streams caret-delimited messages over a
//! [`Transport`]; a [`Session`] decodes them with `strobe_protocol`, keeps
//! the pin and wave state they describe, and turns cycle requests into timed
//! actions scheduled into a [`SimHost`]. Miscompares observed by the host
//! flow back through the session's tracker, which enforces the error budget
//! and assembles transaction reports.
//!
//! # Usage
//!
//! ```
//! use strobe_engine::{Session, SessionConfig};
//!
//! let config = SessionConfig { max_errors: 25, ..SessionConfig::default() };
//! let session = Session::new(config);
//! assert_eq!(session.cycle_count(), 0);
//! ```
//!
//! Driving a session end to end needs a [`SimHost`] implementation; the
//! `strobe_vtb` crate provides one backed by an in-process testbench.
//!
//! # Modules
//!
//! - [`session`]: message loop, cycle controller and session state
//! - [`host`]: the [`SimHost`] seam and its value types
//! - [`transport`]: line transport trait and the buffered I/O adapter
//! - [`wave`]: wave tables and activation sets
//! - [`pin`]: per-pin state
//! - [`tracker`]: miscompare accounting and the error breaker
//! - [`error`]: fatal session errors

#![warn(missing_docs)]

pub mod error;
pub mod host;
pub mod pin;
pub mod session;
pub mod tracker;
pub mod transport;
pub mod wave;

pub use error::BridgeError;
pub use host::{
    Bit, HostEvent, Miscompare, NetValue, PutMode, ScheduledAction, SignalRef, SimHost,
    RECEIVED_UNKNOWN,
};
pub use pin::{Pin, PinMode};
pub use session::{Session, SessionConfig, SessionSummary, PEEK_FAIL, READY, SYNC_ACK};
pub use tracker::{ErrorTracker, MiscompareRecord, TransactionReport, MAX_TRANSACTION_RECORDS};
pub use transport::{IoTransport, Transport, TransportError};
pub use wave::{ActiveSet, ActiveSetError, Wave, WaveTable};
