// transport.rs — Single request/response exchange over a serial link
//
// Opens the link, sends one terminated command line, and waits for one
// non-empty reply line until a deadline. The link is owned by the exchange
// and dropped on every exit path; nothing is held open between calls.
//
// Preconditions: `command` ends with '\n'.
// Postconditions: Ok carries the trimmed reply line; the link is closed.
// Failure modes: open failure, I/O failure, timeout (elapsed ≥ timeout).
// Side effects: serial I/O; blocks the calling thread for up to
//               settle + post-write delay + timeout.

use std::io::{self, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use serialport::{ClearBuffer, SerialPort};
use thiserror::Error;
use tracing::debug;

use crate::protocol::{BAUD_RATE, LINE_TERMINATOR};

// ── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub baud_rate: u32,
    /// Pause after opening before touching the buffers.
    pub settle_delay: Duration,
    /// Pause after writing before polling for the reply.
    pub post_write_delay: Duration,
    /// Read timeout of one poll, and back-off when the link reports no data.
    pub poll_interval: Duration,
    /// Default reply timeout used by the client.
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            baud_rate: BAUD_RATE,
            settle_delay: Duration::from_millis(100),
            post_write_delay: Duration::from_millis(50),
            poll_interval: Duration::from_millis(10),
            timeout: Duration::from_secs(2),
        }
    }
}

// ── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("command {0:?} does not end with a line terminator")]
    Unterminated(String),

    #[error("serial error on port {port}: {source}")]
    Open { port: String, source: io::Error },

    #[error("serial I/O error on port {port}: {source}")]
    Io { port: String, source: io::Error },

    #[error("timeout: no response from {port} after {:.1}s", .timeout.as_secs_f64())]
    Timeout {
        port: String,
        timeout: Duration,
        elapsed: Duration,
    },
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }
}

// ── Link seam ───────────────────────────────────────────────────────────────

/// An open, exclusively owned byte link to a device.
///
/// Reads should return `TimedOut` or `WouldBlock` when no byte is available.
pub trait Link: Read + Write + Send {
    /// Discard anything buffered in either direction.
    fn clear_buffers(&mut self) -> io::Result<()>;
}

/// Opens links by port name.
pub trait LinkOpener {
    fn open(&self, port: &str, config: &TransportConfig) -> Result<Box<dyn Link>, TransportError>;
}

/// Opens real serial devices through `serialport`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialOpener;

impl LinkOpener for SerialOpener {
    fn open(&self, port: &str, config: &TransportConfig) -> Result<Box<dyn Link>, TransportError> {
        // DTR must already be low when the device node opens; boards that
        // reset on DTR would otherwise reboot and lose their slot values.
        let handle = serialport::new(port, config.baud_rate)
            .timeout(config.poll_interval)
            .dtr_on_open(false)
            .open()
            .map_err(|e| TransportError::Open {
                port: port.to_string(),
                source: e.into(),
            })?;
        Ok(Box::new(SerialLink(handle)))
    }
}

struct SerialLink(Box<dyn SerialPort>);

impl Read for SerialLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl Write for SerialLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl Link for SerialLink {
    fn clear_buffers(&mut self) -> io::Result<()> {
        self.0.clear(ClearBuffer::All).map_err(io::Error::from)
    }
}

// ── Reply line assembly ─────────────────────────────────────────────────────

/// Accumulates received bytes and yields complete, non-empty lines.
#[derive(Debug, Default)]
pub struct LineAssembler {
    pending: Vec<u8>,
}

impl LineAssembler {
    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Next complete line with surrounding whitespace removed. Blank lines
    /// are consumed and skipped.
    pub fn next_line(&mut self) -> Option<String> {
        while let Some(end) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=end).collect();
            let line = String::from_utf8_lossy(&raw).trim().to_string();
            if !line.is_empty() {
                return Some(line);
            }
        }
        None
    }
}

// ── Transport ───────────────────────────────────────────────────────────────

pub struct Transport<O = SerialOpener> {
    opener: O,
    config: TransportConfig,
}

impl Transport<SerialOpener> {
    pub fn serial(config: TransportConfig) -> Self {
        Transport::new(SerialOpener, config)
    }
}

impl<O: LinkOpener> Transport<O> {
    pub fn new(opener: O, config: TransportConfig) -> Self {
        Transport { opener, config }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn opener(&self) -> &O {
        &self.opener
    }

    /// Send `command` to `port` and wait up to `timeout` for one reply line.
    pub fn send_and_receive(
        &self,
        port: &str,
        command: &str,
        timeout: Duration,
    ) -> Result<String, TransportError> {
        if !command.ends_with(LINE_TERMINATOR) {
            return Err(TransportError::Unterminated(command.to_string()));
        }

        let mut link = self.opener.open(port, &self.config)?;
        debug!(port, command = command.trim_end(), "link open");
        let result = self.exchange(link.as_mut(), port, command, timeout);
        drop(link);
        debug!(port, ok = result.is_ok(), "link released");
        result
    }

    fn exchange(
        &self,
        link: &mut dyn Link,
        port: &str,
        command: &str,
        timeout: Duration,
    ) -> Result<String, TransportError> {
        let io_err = |source: io::Error| TransportError::Io {
            port: port.to_string(),
            source,
        };

        thread::sleep(self.config.settle_delay);
        link.clear_buffers().map_err(io_err)?;
        link.write_all(command.as_bytes()).map_err(io_err)?;
        link.flush().map_err(io_err)?;
        thread::sleep(self.config.post_write_delay);

        let mut lines = LineAssembler::default();
        let mut buf = [0u8; 64];
        let start = Instant::now();
        while start.elapsed() < timeout {
            match link.read(&mut buf) {
                Ok(0) => thread::sleep(self.config.poll_interval),
                Ok(n) => {
                    lines.push(&buf[..n]);
                    if let Some(line) = lines.next_line() {
                        debug!(port, reply = %line, "reply received");
                        return Ok(line);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(self.config.poll_interval)
                }
                Err(e) => return Err(io_err(e)),
            }
        }

        Err(TransportError::Timeout {
            port: port.to_string(),
            timeout,
            elapsed: start.elapsed(),
        })
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
