//! Protocol parse error types.
//!
//! Every way a received message can fail to decode into a [`Command`] is a
//! variant of [`ParseError`]. A parse failure is always fatal to the session:
//! the peer generates messages mechanically, so a malformed one means the two
//! sides have lost framing or disagree about the protocol version.
//!
//! [`Command`]: crate::command::Command

/// Errors produced while decoding a wire message or a waveform event list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The message was empty.
    #[error("empty message")]
    Empty,

    /// The leading field is not a recognized single-character opcode.
    #[error("unknown opcode in message: '{0}'")]
    UnknownOpcode(String),

    /// A required argument was not present.
    #[error("opcode '{opcode}' missing argument: {what}")]
    MissingArgument {
        /// The opcode being decoded.
        opcode: char,
        /// Which argument was expected.
        what: &'static str,
    },

    /// An argument was present but could not be decoded.
    #[error("opcode '{opcode}' has invalid {what}: '{value}'")]
    InvalidArgument {
        /// The opcode being decoded.
        opcode: char,
        /// Which argument failed to decode.
        what: &'static str,
        /// The offending field text.
        value: String,
    },

    /// A waveform event offset token was not a number.
    #[error("invalid waveform event offset: '{0}'")]
    InvalidOffset(String),

    /// A waveform event symbol token was not in the symbol alphabet.
    #[error("invalid waveform event symbol: '{0}'")]
    InvalidSymbol(String),

    /// A waveform event list ended with an offset but no symbol.
    #[error("waveform event list truncated after offset {offset}")]
    TruncatedEvents {
        /// The offset whose symbol was missing.
        offset: u64,
    },

    /// A waveform event list exceeded the event cap.
    #[error("waveform has {count} events, limit is {limit}")]
    TooManyEvents {
        /// Number of events in the offending list.
        count: usize,
        /// The maximum permitted number of events.
        limit: usize,
    },
}
