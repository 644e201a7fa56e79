//! The opcode table, typed [`Command`] representation, parser and encoder.
//!
//! One message is one command. The opcode is the first byte; arguments
//! follow, separated by carets. The full table:
//!
//! | Op | Arguments | Meaning |
//! |----|-----------------------------|------------------------------------|
//! | `0`| name^index^drive^compare | define pin |
//! | `1`| period | set period (clears pins and waves) |
//! | `2`| index^bit | drive pin |
//! | `3`| count | run cycles |
//! | `4`| index^bit | compare pin |
//! | `5`| index | don't-care pin |
//! | `6`| id^is_compare^events | define waveform |
//! | `7`| — | sync, replies `OK!` |
//! | `8`| — | end simulation |
//! | `9`| net | peek, replies value or `FAIL` |
//! | `a`| name | set pattern name |
//! | `b`| net^value | poke |
//! | `c`| text | set comment |
//! | `d`| 1/0 | echo received messages on/off |
//! | `e`| index | start capture |
//! | `f`| — | sync-pulse enable |
//! | `g`| — | sync-pulse disable |
//! | `h`| index | stop capture |
//! | `i`| — | version, replies version string |
//! | `j`| text | write to the simulation log |
//! | `k`| — | flush host output |
//! | `l`| — | timescale, replies exponent |
//! | `m`| limit | set max-error threshold |
//! | `n`| 1/0 | open/close transaction |
//! | `o`| — | get cycle count, replies count |
//! | `p`| count | set cycle count |
//! | `q`| 1/0 | open/close match loop |
//! | `r`| net^value | force |
//! | `s`| net | release |

use crate::error::ParseError;
use crate::wave::{encode_events, parse_events, WaveEvent};

/// A decoded protocol message.
///
/// Produced by [`parse_command`] at the transport boundary; dispatch above
/// that point is a pattern match over this enum.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Define a pin: bind a name and waveform ids to a dense index and
    /// resolve its harness signals.
    DefinePin {
        /// Pin name in the harness (`<top>.pins.<name>.*`).
        name: String,
        /// Dense pin index used by all later drive/compare messages.
        index: usize,
        /// Drive waveform id assigned to the pin.
        drive_wave: usize,
        /// Compare waveform id assigned to the pin.
        compare_wave: usize,
    },
    /// Set the cycle period in simulation time units. Clears all pins and
    /// waveform definitions as a side effect.
    SetPeriod {
        /// New period, in simulation time units.
        period: u64,
    },
    /// Put a pin into drive mode with the given data value.
    DrivePin {
        /// Pin index.
        index: usize,
        /// Data value to drive, 0 or 1.
        bit: u8,
    },
    /// Advance simulated time by `count` cycles.
    RunCycles {
        /// Number of cycles; 0 behaves as 1.
        count: u64,
    },
    /// Put a pin into compare mode with the given expected value.
    ComparePin {
        /// Pin index.
        index: usize,
        /// Expected value, 0 or 1.
        bit: u8,
    },
    /// Return a pin to the idle (don't-care) state.
    DontCarePin {
        /// Pin index.
        index: usize,
    },
    /// Define or overwrite a waveform.
    DefineWave {
        /// Waveform id within its table.
        index: usize,
        /// True for the compare table, false for the drive table.
        compare: bool,
        /// The parsed event list.
        events: Vec<WaveEvent>,
    },
    /// Synchronization point; the session replies `OK!`.
    SyncUp,
    /// End the simulation; the session's terminal command.
    Complete,
    /// Read a named signal; the session replies its binary value or `FAIL`.
    Peek {
        /// Full hierarchical net name.
        net: String,
    },
    /// Record the current pattern name in the harness debug registers.
    SetPattern {
        /// Pattern name.
        name: String,
    },
    /// Write a decimal value to a named signal.
    Poke {
        /// Full hierarchical net name.
        net: String,
        /// Decimal value text, passed through to the host.
        value: String,
    },
    /// Record a comment in the harness debug registers.
    SetComment {
        /// Comment text.
        text: String,
    },
    /// Enable or disable echoing every received message to the host log.
    LogMessages {
        /// True to echo.
        enabled: bool,
    },
    /// Start capturing a pin: compare strobes latch the observed value
    /// instead of checking it.
    StartCapture {
        /// Pin index.
        index: usize,
    },
    /// Raise the harness sync pulse signal.
    SyncEnable,
    /// Lower the harness sync pulse signal.
    SyncDisable,
    /// Stop capturing a pin.
    StopCapture {
        /// Pin index.
        index: usize,
    },
    /// Request the bridge version; the session replies the version string.
    Version,
    /// Write a line to the host simulation log.
    LogLine {
        /// Text to log.
        text: String,
    },
    /// Flush host log and waveform output.
    Flush,
    /// Request the host timescale; the session replies a signed power-of-ten
    /// exponent (e.g. `-12` for picoseconds).
    Timescale,
    /// Set the miscompare threshold that trips the error breaker.
    SetMaxErrors {
        /// New threshold.
        limit: u64,
    },
    /// Open or close a miscompare transaction. Closing emits the buffered
    /// report.
    Transaction {
        /// True to open, false to close.
        open: bool,
    },
    /// Request the cycle counter; the session replies its decimal value.
    GetCycleCount,
    /// Overwrite the cycle counter.
    SetCycleCount {
        /// New cycle count.
        count: u64,
    },
    /// Open or close a match loop.
    MatchLoop {
        /// True to open, false to close.
        open: bool,
    },
    /// Force a named signal to a decimal value, overriding its drivers.
    ForceNet {
        /// Full hierarchical net name.
        net: String,
        /// Decimal value text, passed through to the host.
        value: String,
    },
    /// Release a previously forced signal.
    ReleaseNet {
        /// Full hierarchical net name.
        net: String,
    },
}

/// Parses one wire message into a [`Command`].
///
/// `line` is the logical message without its terminating newline (a trailing
/// `\r` or `\n` is tolerated). Any deviation from the grammar is a
/// [`ParseError`], which the session treats as fatal.
pub fn parse_command(line: &str) -> Result<Command, ParseError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let opcode = line.chars().next().ok_or(ParseError::Empty)?;

    let rest = &line[opcode.len_utf8()..];
    let args = if rest.is_empty() {
        ""
    } else if let Some(stripped) = rest.strip_prefix('^') {
        stripped
    } else {
        // First field is longer than one character: not an opcode we know.
        let first = line.split('^').next().unwrap_or(line);
        return Err(ParseError::UnknownOpcode(first.to_string()));
    };

    let fields: Vec<&str> = if args.is_empty() {
        Vec::new()
    } else {
        args.split('^').collect()
    };

    match opcode {
        '0' => Ok(Command::DefinePin {
            name: field(&fields, 0, opcode, "pin name")?.to_string(),
            index: number(&fields, 1, opcode, "pin index")?,
            drive_wave: number(&fields, 2, opcode, "drive wave id")?,
            compare_wave: number(&fields, 3, opcode, "compare wave id")?,
        }),
        '1' => Ok(Command::SetPeriod {
            period: number(&fields, 0, opcode, "period")?,
        }),
        '2' => Ok(Command::DrivePin {
            index: number(&fields, 0, opcode, "pin index")?,
            bit: bit(&fields, 1, opcode, "drive value")?,
        }),
        '3' => Ok(Command::RunCycles {
            count: number(&fields, 0, opcode, "cycle count")?,
        }),
        '4' => Ok(Command::ComparePin {
            index: number(&fields, 0, opcode, "pin index")?,
            bit: bit(&fields, 1, opcode, "expected value")?,
        }),
        '5' => Ok(Command::DontCarePin {
            index: number(&fields, 0, opcode, "pin index")?,
        }),
        '6' => Ok(Command::DefineWave {
            index: number(&fields, 0, opcode, "wave id")?,
            compare: flag(&fields, 1, opcode, "compare flag")?,
            events: parse_events(field(&fields, 2, opcode, "event list")?)?,
        }),
        '7' => Ok(Command::SyncUp),
        '8' => Ok(Command::Complete),
        '9' => Ok(Command::Peek {
            net: field(&fields, 0, opcode, "net name")?.to_string(),
        }),
        'a' => Ok(Command::SetPattern {
            name: args.to_string(),
        }),
        'b' => Ok(Command::Poke {
            net: field(&fields, 0, opcode, "net name")?.to_string(),
            value: field(&fields, 1, opcode, "value")?.to_string(),
        }),
        'c' => Ok(Command::SetComment {
            text: args.to_string(),
        }),
        'd' => Ok(Command::LogMessages {
            enabled: flag(&fields, 0, opcode, "enable flag")?,
        }),
        'e' => Ok(Command::StartCapture {
            index: number(&fields, 0, opcode, "pin index")?,
        }),
        'f' => Ok(Command::SyncEnable),
        'g' => Ok(Command::SyncDisable),
        'h' => Ok(Command::StopCapture {
            index: number(&fields, 0, opcode, "pin index")?,
        }),
        'i' => Ok(Command::Version),
        'j' => Ok(Command::LogLine {
            text: args.to_string(),
        }),
        'k' => Ok(Command::Flush),
        'l' => Ok(Command::Timescale),
        'm' => Ok(Command::SetMaxErrors {
            limit: number(&fields, 0, opcode, "error limit")?,
        }),
        'n' => Ok(Command::Transaction {
            open: flag(&fields, 0, opcode, "open flag")?,
        }),
        'o' => Ok(Command::GetCycleCount),
        'p' => Ok(Command::SetCycleCount {
            count: number(&fields, 0, opcode, "cycle count")?,
        }),
        'q' => Ok(Command::MatchLoop {
            open: flag(&fields, 0, opcode, "open flag")?,
        }),
        'r' => Ok(Command::ForceNet {
            net: field(&fields, 0, opcode, "net name")?.to_string(),
            value: field(&fields, 1, opcode, "value")?.to_string(),
        }),
        's' => Ok(Command::ReleaseNet {
            net: field(&fields, 0, opcode, "net name")?.to_string(),
        }),
        _ => Err(ParseError::UnknownOpcode(
            line.split('^').next().unwrap_or(line).to_string(),
        )),
    }
}

/// Encodes a [`Command`] into its wire message, without the newline.
///
/// This is the generator side of the protocol; it is used by the replay
/// harness and by tests that feed a session.
pub fn encode_command(cmd: &Command) -> String {
    match cmd {
        Command::DefinePin {
            name,
            index,
            drive_wave,
            compare_wave,
        } => format!("0^{name}^{index}^{drive_wave}^{compare_wave}"),
        Command::SetPeriod { period } => format!("1^{period}"),
        Command::DrivePin { index, bit } => format!("2^{index}^{bit}"),
        Command::RunCycles { count } => format!("3^{count}"),
        Command::ComparePin { index, bit } => format!("4^{index}^{bit}"),
        Command::DontCarePin { index } => format!("5^{index}"),
        Command::DefineWave {
            index,
            compare,
            events,
        } => format!(
            "6^{index}^{}^{}",
            u8::from(*compare),
            encode_events(events)
        ),
        Command::SyncUp => "7^".to_string(),
        Command::Complete => "8^".to_string(),
        Command::Peek { net } => format!("9^{net}"),
        Command::SetPattern { name } => format!("a^{name}"),
        Command::Poke { net, value } => format!("b^{net}^{value}"),
        Command::SetComment { text } => format!("c^{text}"),
        Command::LogMessages { enabled } => format!("d^{}", u8::from(*enabled)),
        Command::StartCapture { index } => format!("e^{index}"),
        Command::SyncEnable => "f^".to_string(),
        Command::SyncDisable => "g^".to_string(),
        Command::StopCapture { index } => format!("h^{index}"),
        Command::Version => "i^".to_string(),
        Command::LogLine { text } => format!("j^{text}"),
        Command::Flush => "k^".to_string(),
        Command::Timescale => "l^".to_string(),
        Command::SetMaxErrors { limit } => format!("m^{limit}"),
        Command::Transaction { open } => format!("n^{}", u8::from(*open)),
        Command::GetCycleCount => "o^".to_string(),
        Command::SetCycleCount { count } => format!("p^{count}"),
        Command::MatchLoop { open } => format!("q^{}", u8::from(*open)),
        Command::ForceNet { net, value } => format!("r^{net}^{value}"),
        Command::ReleaseNet { net } => format!("s^{net}"),
    }
}

/// Returns the `i`-th argument field, rejecting absent or empty fields.
fn field<'a>(
    fields: &[&'a str],
    i: usize,
    opcode: char,
    what: &'static str,
) -> Result<&'a str, ParseError> {
    match fields.get(i) {
        Some(f) if !f.is_empty() => Ok(f),
        _ => Err(ParseError::MissingArgument { opcode, what }),
    }
}

/// Parses the `i`-th argument field as a decimal number.
fn number<T: std::str::FromStr>(
    fields: &[&str],
    i: usize,
    opcode: char,
    what: &'static str,
) -> Result<T, ParseError> {
    let raw = field(fields, i, opcode, what)?;
    raw.parse().map_err(|_| ParseError::InvalidArgument {
        opcode,
        what,
        value: raw.to_string(),
    })
}

/// Parses the `i`-th argument field as a single bit value, `0` or `1`.
fn bit(fields: &[&str], i: usize, opcode: char, what: &'static str) -> Result<u8, ParseError> {
    let raw = field(fields, i, opcode, what)?;
    match raw {
        "0" => Ok(0),
        "1" => Ok(1),
        _ => Err(ParseError::InvalidArgument {
            opcode,
            what,
            value: raw.to_string(),
        }),
    }
}

/// Parses the `i`-th argument field as a boolean flag, `0` or `1`.
fn flag(fields: &[&str], i: usize, opcode: char, what: &'static str) -> Result<bool, ParseError> {
    Ok(bit(fields, i, opcode, what)? == 1)
}
