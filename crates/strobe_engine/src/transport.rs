//! Line-oriented message transport between the pattern generator and the
//! session.
//!
//! The wire format is one caret-delimited message per newline-terminated
//! line. [`Transport`] hides where those lines come from; [`IoTransport`]
//! adapts any buffered reader/writer pair, which covers both Unix domain
//! sockets and in-memory test streams.

use std::io::{self, BufRead, Write};

use thiserror::Error;

/// Failures raised by a message transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer closed the connection.
    #[error("connection closed by peer")]
    Closed,

    /// An underlying I/O operation failed.
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A bidirectional stream of newline-delimited messages.
pub trait Transport {
    /// Sends one message, appending the line terminator.
    fn send_line(&mut self, line: &str) -> Result<(), TransportError>;

    /// Receives the next message with the line terminator stripped.
    ///
    /// Blocks until a full line is available and returns
    /// [`TransportError::Closed`] at end of stream.
    fn receive_line(&mut self) -> Result<String, TransportError>;
}

/// [`Transport`] over a buffered reader and a writer.
///
/// Every sent line is flushed immediately. The peer blocks on our replies,
/// so buffering them would deadlock the session.
#[derive(Debug)]
pub struct IoTransport<R, W> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> IoTransport<R, W> {
    /// Wraps a reader/writer pair.
    pub fn new(reader: R, writer: W) -> Self {
        IoTransport { reader, writer }
    }

    /// Consumes the transport and returns the underlying pair.
    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }
}

impl<R: BufRead, W: Write> Transport for IoTransport<R, W> {
    fn send_line(&mut self, line: &str) -> Result<(), TransportError> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    fn receive_line(&mut self) -> Result<String, TransportError> {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line)?;
        if read == 0 {
            return Err(TransportError::Closed);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn receive_strips_line_endings() {
        let mut t = IoTransport::new(Cursor::new(b"3^4\r\n7^\n".to_vec()), Vec::new());
        assert_eq!(t.receive_line().unwrap(), "3^4");
        assert_eq!(t.receive_line().unwrap(), "7^");
    }

    #[test]
    fn receive_at_eof_reports_closed() {
        let mut t = IoTransport::new(Cursor::new(Vec::new()), Vec::new());
        assert!(matches!(t.receive_line(), Err(TransportError::Closed)));
    }

    #[test]
    fn send_appends_newline() {
        let mut t = IoTransport::new(Cursor::new(Vec::new()), Vec::new());
        t.send_line("READY!").unwrap();
        t.send_line("OK!").unwrap();
        let (_, written) = t.into_inner();
        assert_eq!(written, b"READY!\nOK!\n");
    }

    #[test]
    fn last_line_without_newline_is_delivered() {
        let mut t = IoTransport::new(Cursor::new(b"8^".to_vec()), Vec::new());
        assert_eq!(t.receive_line().unwrap(), "8^");
        assert!(matches!(t.receive_line(), Err(TransportError::Closed)));
    }

    #[test]
    fn error_display_is_stable() {
        assert_eq!(TransportError::Closed.to_string(), "connection closed by peer");
    }
}
