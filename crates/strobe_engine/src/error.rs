//! Fatal session errors.

use thiserror::Error;

use strobe_protocol::{ParseError, WaveSymbol};

use crate::transport::TransportError;
use crate::wave::{ActiveSetError, WaveTable};

/// Errors that terminate a bridge session.
///
/// Any of these ends the run: the session drives its shutdown sequence and
/// then surfaces the error to the caller. Miscompares are not errors at this
/// level, they feed the error tracker instead.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The link to the pattern generator failed.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// A received message could not be parsed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ParseError),

    /// A pin operation referenced an index that was never defined.
    #[error("pin index {index} is not defined")]
    UnknownPin {
        /// The index the message carried.
        index: usize,
    },

    /// A scheduled wave event carried a symbol the table cannot apply.
    #[error("unexpected symbol '{symbol}' in {table} wave {wave}")]
    UnexpectedSymbol {
        /// Table the wave belongs to.
        table: WaveTable,
        /// Wave index within the table.
        wave: usize,
        /// The offending symbol.
        symbol: WaveSymbol,
    },

    /// An activation set and the pins' cached positions disagree.
    #[error("{table} wave {wave} activation set corrupt removing pin {pin}: {reason}")]
    ActivationCorrupt {
        /// Table the wave belongs to.
        table: WaveTable,
        /// Wave index within the table.
        wave: usize,
        /// Pin index being removed.
        pin: usize,
        /// What the set reported.
        reason: ActiveSetError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats() {
        let err = BridgeError::UnknownPin { index: 7 };
        assert_eq!(err.to_string(), "pin index 7 is not defined");

        let err = BridgeError::UnexpectedSymbol {
            table: WaveTable::Drive,
            wave: 2,
            symbol: WaveSymbol::Compare,
        };
        assert_eq!(err.to_string(), "unexpected symbol 'C' in drive wave 2");

        let err = BridgeError::ActivationCorrupt {
            table: WaveTable::Compare,
            wave: 0,
            pin: 3,
            reason: ActiveSetError::Empty,
        };
        assert_eq!(
            err.to_string(),
            "compare wave 0 activation set corrupt removing pin 3: set has no active pins"
        );
    }

    #[test]
    fn wraps_transport_and_protocol_errors() {
        let err = BridgeError::from(TransportError::Closed);
        assert_eq!(err.to_string(), "transport failure: connection closed by peer");

        let err = BridgeError::from(ParseError::Empty);
        assert_eq!(err.to_string(), "protocol error: empty message");
    }
}
