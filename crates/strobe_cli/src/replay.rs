//! `strobe replay` — run a recorded pattern against the in-process bench.
//!
//! Reads a pattern file with one generator message per line, builds a bench
//! with the pins the pattern defines, and serves the whole file through a
//! session. Replies the generator would have received go to stdout, followed
//! by a text or JSON run report.

use std::collections::VecDeque;
use std::path::Path;

use strobe_config::StrobeConfig;
use strobe_engine::transport::{Transport, TransportError};
use strobe_engine::{BridgeError, Session, SessionSummary};
use strobe_protocol::{parse_command, Command};
use strobe_vtb::VirtualBench;

use crate::{GlobalArgs, ReplayArgs, ReportFormat};

/// Runs the `strobe replay` command.
///
/// Returns exit code 0 when the pattern completed cleanly, 1 when the
/// session failed partway through.
pub fn run(args: &ReplayArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let config = crate::resolve_config(global)?;
    let lines = read_pattern(&args.pattern)?;

    if !global.quiet {
        eprintln!("   Replaying {}", args.pattern.display());
    }

    let outcome = replay(&lines, &config);

    match args.format {
        ReportFormat::Text => {
            for line in &outcome.responses {
                println!("{line}");
            }
            if !global.quiet {
                eprintln!(
                    "   Finished after {} cycles with {} errors",
                    outcome.summary.cycles, outcome.summary.errors
                );
            }
        }
        ReportFormat::Json => {
            let report = serde_json::json!({
                "summary": outcome.summary,
                "responses": outcome.responses,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    match &outcome.error {
        Some(err) => {
            eprintln!("error: {err}");
            Ok(1)
        }
        None => Ok(0),
    }
}

/// What one replay produced.
struct ReplayOutcome {
    summary: SessionSummary,
    responses: Vec<String>,
    error: Option<BridgeError>,
}

/// Serves every pattern line through a fresh session and bench.
fn replay(lines: &[String], config: &StrobeConfig) -> ReplayOutcome {
    let mut bench_config = crate::bench_config(config);
    discover_pins(lines, &mut bench_config.pins);

    let mut bench = VirtualBench::new(bench_config);
    let mut session = Session::new(crate::session_config(config));
    let mut transport = ScriptTransport::new(lines);

    let (summary, error) = match session.run(&mut bench, &mut transport) {
        Ok(summary) => (summary, None),
        Err(err) => (session.summary(), Some(err)),
    };
    ReplayOutcome { summary, responses: transport.sent, error }
}

/// Adds every pin the pattern defines to `pins`, skipping duplicates.
///
/// Lines that do not parse are left for the session to report.
fn discover_pins(lines: &[String], pins: &mut Vec<String>) {
    for line in lines {
        if let Ok(Command::DefinePin { name, .. }) = parse_command(line) {
            if !pins.contains(&name) {
                pins.push(name);
            }
        }
    }
}

/// Reads a pattern file into one message per line.
///
/// Blank lines and `#` comment lines are skipped.
fn read_pattern(path: &Path) -> Result<Vec<String>, std::io::Error> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Feeds recorded lines to the session and captures its replies.
struct ScriptTransport {
    incoming: VecDeque<String>,
    sent: Vec<String>,
}

impl ScriptTransport {
    fn new(lines: &[String]) -> Self {
        ScriptTransport {
            incoming: lines.iter().cloned().collect(),
            sent: Vec::new(),
        }
    }
}

impl Transport for ScriptTransport {
    fn send_line(&mut self, line: &str) -> Result<(), TransportError> {
        self.sent.push(line.to_string());
        Ok(())
    }

    fn receive_line(&mut self) -> Result<String, TransportError> {
        self.incoming.pop_front().ok_or(TransportError::Closed)
    }
}
