//! Virtual testbench host for the Strobe simulation bridge.
//!
//! This crate provides [`VirtualBench`], an in-process implementation of the
//! engine's `SimHost` trait. It models the signal topology the RTL harness
//! exposes (per-pin drive registers, device nets, the shared finish, sync
//! and debug signals) together with the harness behavior behind it: pin
//! driver resolution, edge-triggered compare checks, and capture memories.
//! Pattern replays and tests run entire sessions against it without a
//! simulator in the loop.
//!
//! # Usage
//!
//! ```
//! use strobe_vtb::{BenchConfig, VirtualBench};
//!
//! let bench = VirtualBench::new(BenchConfig {
//!     pins: vec!["tck".to_string(), "tdo".to_string()],
//!     ..BenchConfig::default()
//! });
//! assert!(bench.store().resolve("bench.pins.tck.data").is_some());
//! assert!(bench.store().resolve("bench.dut.tdo").is_some());
//! ```
//!
//! # Modules
//!
//! - [`bench`]: the bench itself and its reactive rules
//! - [`signal`]: name-addressed four-state signal storage

#![warn(missing_docs)]

pub mod bench;
pub mod signal;

pub use bench::{BenchConfig, NetDef, VirtualBench};
pub use signal::{Signal, SignalKind, SignalStore};
