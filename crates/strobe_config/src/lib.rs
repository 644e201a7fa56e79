//! Parsing and validation of `strobe.toml` runtime configuration files.
//!
//! This crate reads the runtime configuration file and produces a
//! strongly-typed [`StrobeConfig`] covering session settings, the server
//! socket, and the bench layout used for in-process runs.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str};
pub use types::*;
