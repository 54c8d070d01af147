//! Serial transport to the microcontroller.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::time::Duration;

use log::{debug, trace};
use serialport::SerialPort;

use crate::protocol::{take_line_capped, MAX_LINE_LEN};
use crate::QbitLinkError;

/// Port-name prefixes of USB-serial adapters, in priority order.
pub fn device_patterns() -> &'static [&'static str] {
    if cfg!(target_os = "macos") {
        &["/dev/cu.usbserial-", "/dev/cu.usbmodem"]
    } else {
        &["/dev/ttyUSB", "/dev/ttyACM"]
    }
}

/// Order candidate port names: by pattern class, then by name.
pub fn filter_candidates<I>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let patterns = device_patterns();
    let mut ranked: Vec<(usize, String)> = names
        .into_iter()
        .filter_map(|name| {
            let rank = patterns.iter().position(|p| name.starts_with(p))?;
            Some((rank, name))
        })
        .collect();
    ranked.sort();
    ranked.into_iter().map(|(_, name)| name).collect()
}

/// Candidate microcontroller ports currently attached.
pub fn find_devices() -> Vec<String> {
    let names = serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
        .map(|p| p.port_name);
    filter_candidates(names)
}

/// A line-oriented, bidirectional link to the microcontroller.
pub trait LineTransport {
    /// Return the next complete line if one is available. Never blocks for
    /// longer than the transport's read timeout.
    fn read_line(&mut self) -> Result<Option<String>, QbitLinkError>;

    /// Discard pending input, then write `data` and flush.
    fn send(&mut self, data: &[u8]) -> Result<(), QbitLinkError>;

    /// Whether more input may still arrive.
    fn is_open(&self) -> bool {
        true
    }
}

/// Serial connection opened at a fixed baud rate.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    pending: Vec<u8>,
    name: String,
}

const READ_TIMEOUT: Duration = Duration::from_millis(100);

impl SerialTransport {
    /// Open `port_name` and wait `settle` for the board to come out of reset.
    pub fn open(port_name: &str, baud_rate: u32, settle: Duration) -> Result<Self, QbitLinkError> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| QbitLinkError::Serial(format!("Failed to open {port_name}: {e}")))?;

        // Opening the port toggles DTR, which resets most boards.
        std::thread::sleep(settle);

        Ok(Self {
            port,
            pending: Vec::new(),
            name: port_name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bytes waiting in the OS input buffer.
    pub fn bytes_available(&self) -> Result<u32, QbitLinkError> {
        self.port
            .bytes_to_read()
            .map_err(|e| QbitLinkError::Serial(format!("Poll failed: {e}")))
    }

    fn fill(&mut self) -> Result<(), QbitLinkError> {
        let available = self.bytes_available()? as usize;
        let room = MAX_LINE_LEN.saturating_sub(self.pending.len());
        if available == 0 || room == 0 {
            return Ok(());
        }
        let mut buf = vec![0u8; available.min(room)];
        match self.port.read(&mut buf) {
            Ok(n) => {
                trace!("read {n} bytes from {}", self.name);
                self.pending.extend_from_slice(&buf[..n]);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(()),
            Err(e) => Err(QbitLinkError::Serial(format!("Read failed: {e}"))),
        }
    }
}

impl LineTransport for SerialTransport {
    fn read_line(&mut self) -> Result<Option<String>, QbitLinkError> {
        if let Some(line) = take_line_capped(&mut self.pending, MAX_LINE_LEN) {
            return Ok(Some(line));
        }
        self.fill()?;
        Ok(take_line_capped(&mut self.pending, MAX_LINE_LEN))
    }

    fn send(&mut self, data: &[u8]) -> Result<(), QbitLinkError> {
        self.pending.clear();
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(|e| QbitLinkError::Serial(format!("Clear buffer failed: {e}")))?;
        self.port
            .write_all(data)
            .map_err(|e| QbitLinkError::Serial(format!("Write failed: {e}")))?;
        self.port
            .flush()
            .map_err(|e| QbitLinkError::Serial(format!("Flush failed: {e}")))?;
        debug!("wrote {} bytes to {}", data.len(), self.name);
        Ok(())
    }
}

/// In-memory transport fed from a script of incoming lines.
///
/// Every `send` is recorded in `sent`. The transport reports itself closed
/// once the script is drained.
#[derive(Debug, Default)]
pub struct MockTransport {
    pub incoming: VecDeque<String>,
    pub sent: Vec<Vec<u8>>,
}

impl MockTransport {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            incoming: lines.into_iter().map(Into::into).collect(),
            sent: Vec::new(),
        }
    }

    /// Everything sent so far, as text lines.
    pub fn sent_lines(&self) -> Vec<String> {
        self.sent
            .iter()
            .map(|frame| String::from_utf8_lossy(frame).trim_end().to_string())
            .collect()
    }
}

impl LineTransport for MockTransport {
    fn read_line(&mut self) -> Result<Option<String>, QbitLinkError> {
        Ok(self.incoming.pop_front().map(|l| l.trim().to_string()))
    }

    fn send(&mut self, data: &[u8]) -> Result<(), QbitLinkError> {
        self.sent.push(data.to_vec());
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.incoming.is_empty()
    }
}
