//! Wire protocol for the Strobe simulation bridge.
//!
//! The pattern generator and the bridge exchange newline-terminated ASCII
//! messages whose fields are separated by a caret (`^`). The first byte of
//! every message is a single-character opcode. This crate defines the typed
//! [`Command`] representation of those messages together with the parser and
//! encoder, so that the byte-level grammar is handled exactly once at the
//! transport boundary and everything above it dispatches on an enum.
//!
//! # Usage
//!
//! ```
//! use strobe_protocol::{parse_command, Command};
//!
//! let cmd = parse_command("2^14^1").unwrap();
//! assert_eq!(cmd, Command::DrivePin { index: 14, bit: 1 });
//! ```
//!
//! # Modules
//!
//! - `error` — Protocol parse error types
//! - `wave` — Waveform event lists and the `0_D_25_0` event grammar
//! - `command` — The opcode table, `Command` enum, parser and encoder

#![warn(missing_docs)]

pub mod command;
pub mod error;
pub mod wave;

pub use command::{encode_command, parse_command, Command};
pub use error::ParseError;
pub use wave::{encode_events, parse_events, WaveEvent, WaveSymbol, MAX_WAVE_EVENTS};
