//! Strobe CLI — drive a simulated device from recorded patterns or a live
//! pattern generator.
//!
//! Provides `strobe replay` for running a recorded pattern file against the
//! in-process bench, and `strobe serve` for exposing a bench to a pattern
//! generator over a Unix domain socket.

#![warn(missing_docs)]

mod replay;
mod serve;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use strobe_config::{ConfigError, StrobeConfig};
use strobe_engine::SessionConfig;
use strobe_vtb::{BenchConfig, NetDef};

/// Strobe — a runtime bridge between pattern generators and simulations.
#[derive(Parser, Debug)]
#[command(name = "strobe", version, about = "Strobe simulation bridge")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase log verbosity (can be repeated).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to a custom `strobe.toml` configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a recorded pattern file against the in-process bench.
    Replay(ReplayArgs),
    /// Serve a bench to a pattern generator over a Unix socket.
    Serve(ServeArgs),
}

/// Arguments for the `strobe replay` subcommand.
#[derive(Parser, Debug)]
pub struct ReplayArgs {
    /// Pattern file to replay, one generator message per line.
    pub pattern: PathBuf,

    /// Output format for the run report.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Arguments for the `strobe serve` subcommand.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Unix socket path to listen on (overrides the configured path).
    #[arg(short, long)]
    pub socket: Option<PathBuf>,
}

/// Run report output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable terminal output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Optional path to a custom config file.
    pub config: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    init_tracing(cli.quiet, cli.verbose);

    let global = GlobalArgs {
        quiet: cli.quiet,
        config: cli.config,
    };

    let result = match cli.command {
        Command::Replay(ref args) => replay::run(args, &global),
        Command::Serve(ref args) => serve::run(args, &global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

/// Installs the global tracing subscriber from the verbosity flags.
fn init_tracing(quiet: bool, verbose: u8) {
    let filter = if quiet {
        tracing_subscriber::EnvFilter::new("error")
    } else {
        match verbose {
            0 => tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "strobe_cli=info,strobe_engine=info,strobe_vtb=info".into()),
            1 => tracing_subscriber::EnvFilter::new("debug"),
            _ => tracing_subscriber::EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Loads the configuration named by `--config`, or the defaults when the
/// flag is absent.
pub(crate) fn resolve_config(global: &GlobalArgs) -> Result<StrobeConfig, ConfigError> {
    match &global.config {
        Some(path) => strobe_config::load_config(path),
        None => Ok(StrobeConfig::default()),
    }
}

/// Builds the engine session options from the loaded configuration.
pub(crate) fn session_config(config: &StrobeConfig) -> SessionConfig {
    SessionConfig {
        testbench_top: config.session.testbench_top.clone(),
        max_errors: config.session.max_errors,
        log_messages: config.session.log_messages,
        ..SessionConfig::default()
    }
}

/// Builds the bench shape from the loaded configuration.
///
/// The bench scope follows the session's testbench top.
pub(crate) fn bench_config(config: &StrobeConfig) -> BenchConfig {
    BenchConfig {
        top: config.session.testbench_top.clone(),
        pins: config.bench.pins.clone(),
        timescale: config.bench.timescale,
        capture_width: config.bench.capture_width,
        nets: config
            .bench
            .nets
            .iter()
            .map(|net| NetDef { name: net.name.clone(), width: net.width })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn parse_replay_default() {
        let cli = Cli::parse_from(["strobe", "replay", "pattern.txt"]);
        match cli.command {
            Command::Replay(ref args) => {
                assert_eq!(args.pattern, PathBuf::from("pattern.txt"));
                assert_eq!(args.format, ReportFormat::Text);
            }
            _ => panic!("expected Replay command"),
        }
    }

    #[test]
    fn parse_replay_json_format() {
        let cli = Cli::parse_from(["strobe", "replay", "pattern.txt", "--format", "json"]);
        match cli.command {
            Command::Replay(ref args) => {
                assert_eq!(args.format, ReportFormat::Json);
            }
            _ => panic!("expected Replay command"),
        }
    }

    #[test]
    fn parse_serve_default() {
        let cli = Cli::parse_from(["strobe", "serve"]);
        match cli.command {
            Command::Serve(ref args) => assert!(args.socket.is_none()),
            _ => panic!("expected Serve command"),
        }
    }

    #[test]
    fn parse_serve_with_socket() {
        let cli = Cli::parse_from(["strobe", "serve", "--socket", "/tmp/run.sock"]);
        match cli.command {
            Command::Serve(ref args) => {
                assert_eq!(args.socket, Some(PathBuf::from("/tmp/run.sock")));
            }
            _ => panic!("expected Serve command"),
        }
    }

    #[test]
    fn parse_global_flags() {
        let cli = Cli::parse_from(["strobe", "--quiet", "--config", "strobe.toml", "serve"]);
        assert!(cli.quiet);
        assert_eq!(cli.config, Some(PathBuf::from("strobe.toml")));
    }

    #[test]
    fn parse_verbose_counts_repeats() {
        let cli = Cli::parse_from(["strobe", "-v", "-v", "serve"]);
        assert_eq!(cli.verbose, 2);
        assert!(!cli.quiet);
    }

    #[test]
    fn resolve_config_defaults_without_flag() {
        let global = GlobalArgs { quiet: true, config: None };
        let config = resolve_config(&global).unwrap();
        assert_eq!(config, StrobeConfig::default());
    }

    #[test]
    fn resolve_config_reads_the_named_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("strobe.toml");
        fs::write(&path, "[session]\nmax_errors = 7\n").unwrap();

        let global = GlobalArgs { quiet: true, config: Some(path) };
        let config = resolve_config(&global).unwrap();
        assert_eq!(config.session.max_errors, 7);
    }

    #[test]
    fn session_config_carries_the_session_section() {
        let mut config = StrobeConfig::default();
        config.session.testbench_top = "tb".to_string();
        config.session.max_errors = 3;
        config.session.log_messages = true;

        let session = session_config(&config);
        assert_eq!(session.testbench_top, "tb");
        assert_eq!(session.max_errors, 3);
        assert!(session.log_messages);
    }

    #[test]
    fn bench_config_scopes_under_the_testbench_top() {
        let mut config = StrobeConfig::default();
        config.session.testbench_top = "tb".to_string();
        config.bench.pins = vec!["tck".to_string()];
        config.bench.nets = vec![strobe_config::NetDef {
            name: "tb.dut.status".to_string(),
            width: 8,
        }];

        let bench = bench_config(&config);
        assert_eq!(bench.top, "tb");
        assert_eq!(bench.pins, vec!["tck"]);
        assert_eq!(bench.nets, vec![NetDef { name: "tb.dut.status".to_string(), width: 8 }]);
    }
}
