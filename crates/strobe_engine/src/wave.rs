//! Wave tables and their activation sets.
//!
//! A wave is an ordered list of intra-cycle events plus the set of pins the
//! wave currently applies to. Pins join a set when a pattern message puts
//! them into the matching state and leave it when they change state, so each
//! cycle only schedules events for waves that have at least one active pin.

use std::fmt;

use thiserror::Error;

use strobe_protocol::{WaveEvent, WaveSymbol};

/// Which of the two wave tables an index refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveTable {
    /// Waves applied while pins are driving.
    Drive,
    /// Waves applied while pins are comparing.
    Compare,
}

impl fmt::Display for WaveTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaveTable::Drive => write!(f, "drive"),
            WaveTable::Compare => write!(f, "compare"),
        }
    }
}

/// `force_data` code selecting the pin's own data register.
pub const FORCE_USE_DATA: u64 = 0;
/// `force_data` code pinning the pin low.
pub const FORCE_LOW: u64 = 1;
/// `force_data` code pinning the pin high.
pub const FORCE_HIGH: u64 = 2;

/// Maps a drive wave symbol to its `(force_data, drive enable)` effect.
///
/// Returns `None` for symbols that have no meaning on the drive side.
pub fn drive_levels(symbol: WaveSymbol) -> Option<(u64, bool)> {
    match symbol {
        WaveSymbol::Low => Some((FORCE_LOW, true)),
        WaveSymbol::High => Some((FORCE_HIGH, true)),
        WaveSymbol::Data => Some((FORCE_USE_DATA, true)),
        WaveSymbol::Off => Some((FORCE_USE_DATA, false)),
        WaveSymbol::Compare => None,
    }
}

/// Maps a compare wave symbol to the compare-enable level it asserts.
///
/// Returns `None` for symbols that have no meaning on the compare side.
pub fn compare_levels(symbol: WaveSymbol) -> Option<u64> {
    match symbol {
        WaveSymbol::Compare => Some(1),
        WaveSymbol::Off => Some(0),
        WaveSymbol::Low | WaveSymbol::High | WaveSymbol::Data => None,
    }
}

/// Inconsistencies detected while removing a pin from an activation set.
///
/// Positions are cached on the pins themselves, so a removal that does not
/// line up with the cached position means the bookkeeping has diverged and
/// the session can no longer trust its own state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ActiveSetError {
    /// Removal was requested from a set with no members.
    #[error("set has no active pins")]
    Empty,

    /// The cached position is past the end of the set.
    #[error("position {position} out of range for {len} active pins")]
    OutOfRange {
        /// Cached position that was presented.
        position: usize,
        /// Member count at the time of removal.
        len: usize,
    },

    /// The slot at the cached position holds a different pin.
    #[error("position {position} holds pin {found}, not the pin being removed")]
    WrongMember {
        /// Cached position that was presented.
        position: usize,
        /// Pin index actually stored there.
        found: usize,
    },
}

/// The pins a wave currently applies to.
///
/// Membership is positional: `add` returns the slot the pin landed in and
/// the pin records it, so later removal is O(1). Removal swaps the last
/// member into the vacated slot and reports it so the caller can patch that
/// pin's cached position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveSet {
    members: Vec<usize>,
}

impl ActiveSet {
    /// Adds a pin and returns the position it occupies.
    pub fn add(&mut self, pin: usize) -> usize {
        self.members.push(pin);
        self.members.len() - 1
    }

    /// Removes the pin at `position`, verifying it really is `pin`.
    ///
    /// On success returns the pin index that was swapped into `position`,
    /// or `None` when the removed member was the last one.
    pub fn remove(&mut self, position: usize, pin: usize) -> Result<Option<usize>, ActiveSetError> {
        if self.members.is_empty() {
            return Err(ActiveSetError::Empty);
        }
        let len = self.members.len();
        match self.members.get(position) {
            None => Err(ActiveSetError::OutOfRange { position, len }),
            Some(&found) if found != pin => Err(ActiveSetError::WrongMember { position, found }),
            Some(_) => {
                self.members.swap_remove(position);
                Ok(self.members.get(position).copied())
            }
        }
    }

    /// Number of active pins.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// `true` when no pin is active.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// `true` when `pin` is a member.
    pub fn contains(&self, pin: usize) -> bool {
        self.members.contains(&pin)
    }

    /// Iterates over the member pin indices.
    pub fn iter(&self) -> impl Iterator<Item = &usize> {
        self.members.iter()
    }
}

/// One entry in a wave table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Wave {
    events: Vec<WaveEvent>,
    active: ActiveSet,
}

impl Wave {
    /// An empty wave with no events and no active pins.
    pub fn new() -> Self {
        Wave::default()
    }

    /// A wave with the given events and an empty activation set.
    pub fn with_events(events: Vec<WaveEvent>) -> Self {
        Wave { events, active: ActiveSet::default() }
    }

    /// The default drive wave: assert pin data for the whole cycle.
    pub fn whole_cycle_drive() -> Self {
        Wave::with_events(vec![WaveEvent { offset: 0, symbol: WaveSymbol::Data }])
    }

    /// The wave's events in definition order.
    pub fn events(&self) -> &[WaveEvent] {
        &self.events
    }

    /// Shared view of the activation set.
    pub fn active(&self) -> &ActiveSet {
        &self.active
    }

    /// Mutable view of the activation set.
    pub fn active_mut(&mut self) -> &mut ActiveSet {
        &mut self.active
    }

    /// `true` for the one-event drive shape `(0, Data)`.
    ///
    /// Pins on such a wave keep their drive enable asserted directly instead
    /// of going through per-cycle scheduling.
    pub fn is_whole_cycle_drive(&self) -> bool {
        self.events.len() == 1
            && self.events[0].offset == 0
            && self.events[0].symbol == WaveSymbol::Data
    }
}
