//! `strobe serve` — expose a bench to a live pattern generator.
//!
//! Binds a Unix domain socket, accepts a single generator connection, and
//! serves one full session over it against the configured bench. The socket
//! file is removed again once the session ends.

use std::io::BufReader;
use std::os::unix::net::UnixListener;
use std::path::PathBuf;

use strobe_config::StrobeConfig;
use strobe_engine::{IoTransport, Session, SessionSummary};
use strobe_vtb::VirtualBench;

use crate::{GlobalArgs, ServeArgs};

/// Runs the `strobe serve` command.
///
/// Returns exit code 0 when the generator completed its pattern cleanly.
pub fn run(args: &ServeArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let config = crate::resolve_config(global)?;
    let socket = args
        .socket
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.server.socket));

    // A socket file left over from an earlier run would block the bind.
    let _ = std::fs::remove_file(&socket);
    let listener = UnixListener::bind(&socket)?;

    if !global.quiet {
        eprintln!("   Listening on {}", socket.display());
    }

    let outcome = serve_once(&listener, &config);
    let _ = std::fs::remove_file(&socket);

    let summary = outcome?;
    if !global.quiet {
        eprintln!(
            "   Finished after {} cycles with {} errors",
            summary.cycles, summary.errors
        );
    }
    Ok(if summary.clean { 0 } else { 1 })
}

/// Accepts one generator connection and serves a full session over it.
fn serve_once(
    listener: &UnixListener,
    config: &StrobeConfig,
) -> Result<SessionSummary, Box<dyn std::error::Error>> {
    let (stream, _) = listener.accept()?;
    tracing::info!("pattern generator connected");

    let reader = BufReader::new(stream.try_clone()?);
    let mut transport = IoTransport::new(reader, stream);
    let mut bench = VirtualBench::new(crate::bench_config(config));
    let mut session = Session::new(crate::session_config(config));

    Ok(session.run(&mut bench, &mut transport)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, Write};
    use std::os::unix::net::UnixStream;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    fn config_with_pin(pin: &str) -> StrobeConfig {
        let mut config = StrobeConfig::default();
        config.bench.pins.push(pin.to_string());
        config
    }

    #[test]
    fn serves_one_session_over_the_socket() {
        let tmp = TempDir::new().unwrap();
        let socket = tmp.path().join("strobe.sock");
        let listener = UnixListener::bind(&socket).unwrap();

        let path = socket.clone();
        let client = thread::spawn(move || {
            let mut stream = UnixStream::connect(&path).unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());

            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            assert_eq!(line.trim_end(), "READY!");

            stream
                .write_all(b"1^100\n0^tck^0^0^0\n2^0^1\n3^2\n7^\n8^\n")
                .unwrap();

            line.clear();
            reader.read_line(&mut line).unwrap();
            assert_eq!(line.trim_end(), "OK!");
        });

        let summary = serve_once(&listener, &config_with_pin("tck")).unwrap();
        client.join().unwrap();

        assert!(summary.clean);
        assert_eq!(summary.cycles, 3);
        assert_eq!(summary.errors, 0);
    }

    #[test]
    fn serve_fails_when_the_generator_disconnects() {
        let tmp = TempDir::new().unwrap();
        let socket = tmp.path().join("strobe.sock");
        let listener = UnixListener::bind(&socket).unwrap();

        let path = socket.clone();
        let client = thread::spawn(move || {
            let stream = UnixStream::connect(&path).unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            // Hang up without completing the pattern.
        });

        let result = serve_once(&listener, &config_with_pin("tck"));
        client.join().unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn run_cleans_up_the_socket_file() {
        let tmp = TempDir::new().unwrap();
        let socket = tmp.path().join("strobe.sock");

        let path = socket.clone();
        let client = thread::spawn(move || {
            let mut stream = loop {
                match UnixStream::connect(&path) {
                    Ok(stream) => break stream,
                    Err(_) => thread::sleep(Duration::from_millis(10)),
                }
            };
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            stream.write_all(b"8^\n").unwrap();
        });

        let args = ServeArgs { socket: Some(socket.clone()) };
        let global = GlobalArgs { quiet: true, config: None };
        let code = run(&args, &global).unwrap();
        client.join().unwrap();

        assert_eq!(code, 0);
        assert!(!socket.exists());
    }
}
