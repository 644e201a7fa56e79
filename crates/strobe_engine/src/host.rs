//! Abstraction over the simulation side of the bridge.
//!
//! The session never talks to a simulator directly. Everything it needs is
//! expressed through the [`SimHost`] trait: resolving hierarchical net paths
//! to opaque [`SignalRef`] handles, writing and reading values, scheduling
//! [`ScheduledAction`]s at future simulation times, and draining the resulting
//! [`HostEvent`] stream. The production host is a simulator binding; tests and
//! the replay harness use the virtual testbench from `strobe_vtb`.

use std::fmt;

use strobe_protocol::WaveSymbol;

/// Opaque handle to a resolved signal inside the host.
///
/// Handles are only meaningful to the host that issued them and stay valid
/// for the lifetime of that host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignalRef(u32);

impl SignalRef {
    /// Creates a handle from a raw host-assigned id.
    pub fn from_raw(raw: u32) -> Self {
        SignalRef(raw)
    }

    /// Returns the raw host-assigned id.
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SignalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sig#{}", self.0)
    }
}

/// A single four-state logic value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Bit {
    /// Logic low.
    #[default]
    Zero,
    /// Logic high.
    One,
    /// Unknown.
    X,
    /// High impedance.
    Z,
}

impl Bit {
    /// Returns `true` for `Zero` and `One`, `false` for `X` and `Z`.
    pub fn is_defined(self) -> bool {
        matches!(self, Bit::Zero | Bit::One)
    }

    /// Character form used in binary strings.
    pub fn as_char(self) -> char {
        match self {
            Bit::Zero => '0',
            Bit::One => '1',
            Bit::X => 'x',
            Bit::Z => 'z',
        }
    }
}

impl fmt::Display for Bit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// A four-state net value of fixed width.
///
/// Bit 0 is the least significant bit. The binary string form is rendered
/// most significant bit first, which is the order the wire protocol expects
/// for peek replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetValue {
    bits: Vec<Bit>,
}

impl NetValue {
    /// An all-zero value of the given width.
    pub fn zeros(width: usize) -> Self {
        NetValue { bits: vec![Bit::Zero; width.max(1)] }
    }

    /// An all-unknown value of the given width.
    pub fn unknown(width: usize) -> Self {
        NetValue { bits: vec![Bit::X; width.max(1)] }
    }

    /// Builds a value from the low `width` bits of `value`.
    pub fn from_u64(value: u64, width: usize) -> Self {
        let width = width.max(1);
        let bits = (0..width)
            .map(|i| if i < 64 && (value >> i) & 1 == 1 { Bit::One } else { Bit::Zero })
            .collect();
        NetValue { bits }
    }

    /// Builds a value from raw bits, least significant first.
    pub fn from_bits(bits: Vec<Bit>) -> Self {
        if bits.is_empty() {
            NetValue::zeros(1)
        } else {
            NetValue { bits }
        }
    }

    /// Width of the value in bits.
    pub fn width(&self) -> usize {
        self.bits.len()
    }

    /// Returns bit `index`, or `X` when the index is past the width.
    pub fn bit(&self, index: usize) -> Bit {
        self.bits.get(index).copied().unwrap_or(Bit::X)
    }

    /// Sets bit `index`. Out of range writes are ignored.
    pub fn set_bit(&mut self, index: usize, bit: Bit) {
        if let Some(slot) = self.bits.get_mut(index) {
            *slot = bit;
        }
    }

    /// Returns `true` when every bit is `Zero` or `One`.
    pub fn is_defined(&self) -> bool {
        self.bits.iter().all(|b| b.is_defined())
    }

    /// Interprets the value as an unsigned integer.
    ///
    /// Returns `None` when any bit is `X` or `Z`, or the width exceeds 64.
    pub fn to_u64(&self) -> Option<u64> {
        if !self.is_defined() || self.bits.len() > 64 {
            return None;
        }
        let mut out = 0u64;
        for (i, bit) in self.bits.iter().enumerate() {
            if *bit == Bit::One {
                out |= 1 << i;
            }
        }
        Some(out)
    }

    /// Renders the value as a binary string, most significant bit first.
    pub fn to_bin_string(&self) -> String {
        self.bits.iter().rev().map(|b| b.as_char()).collect()
    }
}

impl fmt::Display for NetValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_bin_string())
    }
}

/// How a value write should be applied to a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutMode {
    /// Plain write, takes effect immediately.
    Immediate,
    /// Forced write. The signal holds the value until released, ignoring
    /// ordinary writes in between.
    Force,
    /// Removes a previous force. The value argument is ignored.
    Release,
}

/// Work the session schedules into the host's timeline.
///
/// The wave symbol is bound when the action is registered, so redefining a
/// wave mid-cycle never changes what an already scheduled action applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduledAction {
    /// Apply a drive wave event to every pin in the wave's activation set.
    DriveApply {
        /// Drive wave table index.
        wave: usize,
        /// Symbol bound at registration time.
        symbol: WaveSymbol,
    },
    /// Apply a compare wave event to every pin in the wave's activation set.
    CompareApply {
        /// Compare wave table index.
        wave: usize,
        /// Symbol bound at registration time.
        symbol: WaveSymbol,
    },
    /// Marks the end of the current cycle.
    CycleEnd,
}

/// A failed pin comparison reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Miscompare {
    /// Name of the pin that failed.
    pub pin: String,
    /// The expected logic level, `0` or `1`.
    pub expected: u8,
    /// The observed level, or [`RECEIVED_UNKNOWN`] when the net was `X` or `Z`.
    pub received: i64,
}

/// Sentinel reported when a miscompared net carried an undefined value.
pub const RECEIVED_UNKNOWN: i64 = -1;

/// Events the host hands back while simulation time advances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// A previously scheduled action has come due.
    Action(ScheduledAction),
    /// The testbench observed a miscompare.
    Miscompare(Miscompare),
}

/// The session's window onto the simulation.
///
/// Implementations decide what a path or a unit of time means. The engine
/// only requires that [`advance`](SimHost::advance) yields scheduled actions
/// in time order, first-scheduled first among ties.
pub trait SimHost {
    /// Resolves a hierarchical path to a signal handle.
    fn lookup(&mut self, path: &str) -> Option<SignalRef>;

    /// Writes an integer value to a signal.
    fn put_int(&mut self, signal: SignalRef, value: u64, mode: PutMode);

    /// Writes a decimal string to a signal.
    ///
    /// Kept separate from [`put_int`](SimHost::put_int) so hosts can accept
    /// values wider than 64 bits without the engine parsing them.
    fn put_dec(&mut self, signal: SignalRef, digits: &str, mode: PutMode);

    /// Writes a text payload to a signal that carries strings.
    fn put_text(&mut self, signal: SignalRef, text: &str);

    /// Reads the current value of a signal.
    fn get(&mut self, signal: SignalRef) -> NetValue;

    /// Registers an action to fire `delay` time units from now.
    fn schedule_after(&mut self, delay: u64, action: ScheduledAction);

    /// Advances simulation time to the next event and returns it.
    ///
    /// Returns `None` once nothing further is scheduled.
    fn advance(&mut self) -> Option<HostEvent>;

    /// Exponent of the simulation time unit, e.g. `-12` for picoseconds.
    fn timescale(&self) -> i32;

    /// Flushes any buffered simulator output.
    fn flush(&mut self);

    /// Emits a line through the simulator's log.
    fn log(&mut self, message: &str);
}
