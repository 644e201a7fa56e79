//! Configuration types deserialized from `strobe.toml`.

use serde::Deserialize;

/// The top-level runtime configuration parsed from `strobe.toml`.
///
/// Every section is optional; an empty file yields the same configuration
/// as [`StrobeConfig::default`].
#[derive(Debug, Default, PartialEq, Eq, Deserialize)]
pub struct StrobeConfig {
    /// Session settings shared by every transport.
    #[serde(default)]
    pub session: SessionSection,
    /// Socket settings for live generator connections.
    #[serde(default)]
    pub server: ServerSection,
    /// Bench layout for in-process simulation runs.
    #[serde(default)]
    pub bench: BenchSection,
}

/// Settings applied to the session regardless of how the generator connects.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Top-level scope the testbench signals live under.
    pub testbench_top: String,
    /// Miscompares tolerated before the error breaker trips.
    pub max_errors: u64,
    /// Echo every received message to the simulation log from the start.
    pub log_messages: bool,
}

impl Default for SessionSection {
    fn default() -> Self {
        SessionSection {
            testbench_top: "bench".to_string(),
            max_errors: 100,
            log_messages: false,
        }
    }
}

/// Settings for `strobe serve`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Unix socket path the server listens on.
    pub socket: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        ServerSection {
            socket: "/tmp/strobe.sock".to_string(),
        }
    }
}

/// Bench shape for in-process runs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BenchSection {
    /// Pin names to build testbench signals and device nets for.
    pub pins: Vec<String>,
    /// Exponent of the simulation time unit (e.g. `-12` for picoseconds).
    pub timescale: i32,
    /// Width of each pin's capture memory, in bits.
    pub capture_width: usize,
    /// Extra registers to define alongside the pin topology, addressable
    /// by their full hierarchical path through peek and poke.
    pub nets: Vec<NetDef>,
}

impl Default for BenchSection {
    fn default() -> Self {
        BenchSection {
            pins: Vec::new(),
            timescale: -12,
            capture_width: 32,
            nets: Vec::new(),
        }
    }
}

/// One extra register in the bench.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NetDef {
    /// Full hierarchical path of the register (e.g. `"bench.dut.status"`).
    pub name: String,
    /// Width in bits.
    pub width: usize,
}
