//! Waveform event lists and the wire grammar that carries them.
//!
//! A waveform describes how a pin's driver or comparator behaves across one
//! cycle as an ordered list of [`WaveEvent`]s. On the wire the list is a
//! single field of alternating offset and symbol tokens separated by
//! underscores, e.g. `0_D_25_0_50_D_75_0`: drive the pin data at offset 0,
//! force low at 25, drive data again at 50, force low at 75.
//!
//! Offsets are in simulation time units relative to the start of the cycle.
//! The symbol alphabet is closed; which symbols are meaningful depends on
//! whether the list belongs to a drive or a compare waveform, and that check
//! happens when an event is applied, not here.

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Maximum number of events a single waveform may carry.
pub const MAX_WAVE_EVENTS: usize = 50;

/// A symbolic action within a waveform.
///
/// Drive waveforms use [`Low`](WaveSymbol::Low), [`High`](WaveSymbol::High),
/// [`Data`](WaveSymbol::Data) and [`Off`](WaveSymbol::Off); compare waveforms
/// use [`Compare`](WaveSymbol::Compare) and [`Off`](WaveSymbol::Off).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaveSymbol {
    /// Force the pin driver low, regardless of the pin's data value.
    Low,
    /// Force the pin driver high, regardless of the pin's data value.
    High,
    /// Drive the pin's current data value.
    Data,
    /// Assert the compare (or capture) strobe.
    Compare,
    /// Release: deassert the drive enable or compare strobe.
    Off,
}

impl WaveSymbol {
    /// Decodes a symbol from its wire character.
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '0' => Some(WaveSymbol::Low),
            '1' => Some(WaveSymbol::High),
            'D' => Some(WaveSymbol::Data),
            'C' => Some(WaveSymbol::Compare),
            'X' => Some(WaveSymbol::Off),
            _ => None,
        }
    }

    /// Returns the wire character for this symbol.
    pub fn as_char(self) -> char {
        match self {
            WaveSymbol::Low => '0',
            WaveSymbol::High => '1',
            WaveSymbol::Data => 'D',
            WaveSymbol::Compare => 'C',
            WaveSymbol::Off => 'X',
        }
    }
}

impl std::fmt::Display for WaveSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// One timed action within a waveform: apply `symbol` at `offset` time units
/// after the start of the cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveEvent {
    /// Offset from the start of the cycle, in simulation time units.
    pub offset: u64,
    /// The action to apply at that offset.
    pub symbol: WaveSymbol,
}

/// Parses an underscore-separated event field into an event list.
///
/// An empty field yields an empty list. Tokens alternate offset, symbol,
/// offset, symbol, ...; a trailing offset without its symbol is an error, as
/// is any symbol outside the alphabet or a list longer than
/// [`MAX_WAVE_EVENTS`].
pub fn parse_events(field: &str) -> Result<Vec<WaveEvent>, ParseError> {
    let mut events = Vec::new();
    if field.is_empty() {
        return Ok(events);
    }

    let mut tokens = field.split('_');
    while let Some(raw_offset) = tokens.next() {
        let offset: u64 = raw_offset
            .parse()
            .map_err(|_| ParseError::InvalidOffset(raw_offset.to_string()))?;
        let raw_symbol = tokens
            .next()
            .ok_or(ParseError::TruncatedEvents { offset })?;
        let symbol = match raw_symbol.chars().next() {
            Some(c) if raw_symbol.len() == c.len_utf8() => WaveSymbol::from_char(c),
            _ => None,
        }
        .ok_or_else(|| ParseError::InvalidSymbol(raw_symbol.to_string()))?;

        events.push(WaveEvent { offset, symbol });
        if events.len() > MAX_WAVE_EVENTS {
            return Err(ParseError::TooManyEvents {
                count: events.len(),
                limit: MAX_WAVE_EVENTS,
            });
        }
    }

    Ok(events)
}

/// Encodes an event list into the underscore-separated wire field.
pub fn encode_events(events: &[WaveEvent]) -> String {
    let mut out = String::new();
    for event in events {
        if !out.is_empty() {
            out.push('_');
        }
        out.push_str(&event.offset.to_string());
        out.push('_');
        out.push(event.symbol.as_char());
    }
    out
}
