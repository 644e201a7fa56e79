//! Per-pin bookkeeping.

use crate::host::SignalRef;

/// Which side of the bridge currently owns a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PinMode {
    /// Neither driving nor comparing.
    #[default]
    Idle,
    /// The pattern is driving a value into the device.
    Driving,
    /// The pattern is strobing the device's output.
    Comparing,
}

/// A pattern pin and the testbench signals behind it.
///
/// Signal handles are resolved once, when the pin is defined. A pin whose
/// `data` signal cannot be found is recorded with `present = false` and every
/// later operation on it is silently ignored, so patterns written against a
/// fuller testbench still run.
#[derive(Debug, Clone)]
pub struct Pin {
    /// Pattern-facing pin name.
    pub name: String,
    /// Index the wire protocol addresses this pin by.
    pub index: usize,
    /// Whether the testbench actually contains this pin.
    pub present: bool,
    /// Data register feeding the pin driver.
    pub data: Option<SignalRef>,
    /// Drive enable.
    pub drive: Option<SignalRef>,
    /// Force selector, see the `FORCE_*` codes in [`crate::wave`].
    pub force_data: Option<SignalRef>,
    /// Compare enable.
    pub compare: Option<SignalRef>,
    /// Capture enable.
    pub capture: Option<SignalRef>,
    /// Drive wave this pin schedules through.
    pub drive_wave: usize,
    /// Compare wave this pin schedules through.
    pub compare_wave: usize,
    /// Current ownership state.
    pub mode: PinMode,
    /// When set, compare strobes go to `capture` instead of `compare`.
    pub capture_en: bool,
    /// Cached slot in the drive wave's activation set.
    pub drive_pos: usize,
    /// Cached slot in the compare wave's activation set.
    pub compare_pos: usize,
}

impl Pin {
    /// `true` while the pin sits in its drive wave's activation set.
    pub fn is_driving(&self) -> bool {
        self.mode == PinMode::Driving
    }

    /// `true` while the pin sits in its compare wave's activation set.
    pub fn is_comparing(&self) -> bool {
        self.mode == PinMode::Comparing
    }
}
