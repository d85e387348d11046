//! Serial byte-stream transport
//!
//! The bridge reads through the [`Transport`] trait so the run loop can be
//! driven by scripted transports in tests.

use std::io::{self, Read};
use std::time::Duration;

use serialport::SerialPort;
use tracing::debug;

use crate::error::BridgeError;

/// Default serial line rate used by the pedalboard firmware
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Read timeout applied to the serial port. Reads only ever ask for bytes
/// already reported as available, so this only bounds a misbehaving driver;
/// the worker retries a timed-out read.
const READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Byte-stream source polled by the bridge worker
pub trait Transport: Send {
    /// Identifier the transport was opened with
    fn name(&self) -> &str;

    /// Number of bytes that can be read without waiting
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Read every currently available byte, appending to `buf`.
    /// Returns the number of bytes appended; `Ok(0)` means end of stream.
    /// Transient failures are reported as `TimedOut`, `WouldBlock` or
    /// `Interrupted` and leave `buf` unchanged.
    fn read_available(&mut self, buf: &mut Vec<u8>) -> io::Result<usize>;

    /// Release the underlying device. Further reads fail.
    fn close(&mut self);
}

/// [`Transport`] backed by a serial port
pub struct SerialTransport {
    name: String,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    /// Open `path` at `baud_rate` (8N1)
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, BridgeError> {
        let port = serialport::new(path, baud_rate)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| open_error(path, e))?;

        debug!("Serial port '{}' opened at {} baud", path, baud_rate);

        Ok(Self {
            name: path.to_string(),
            port: Some(port),
        })
    }

    fn port_mut(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "serial port closed"))
    }
}

impl Transport for SerialTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        let count = self.port_mut()?.bytes_to_read()?;
        Ok(count as usize)
    }

    fn read_available(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
        let available = self.bytes_available()?;
        if available == 0 {
            return Ok(0);
        }

        let start = buf.len();
        buf.resize(start + available, 0);
        match self.port_mut()?.read(&mut buf[start..]) {
            Ok(read) => {
                buf.truncate(start + read);
                Ok(read)
            }
            Err(e) => {
                buf.truncate(start);
                Err(e)
            }
        }
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!("Serial port '{}' closed", self.name);
        }
    }
}

/// Map a serialport open failure to a configuration error
fn open_error(path: &str, err: serialport::Error) -> BridgeError {
    match err.kind() {
        serialport::ErrorKind::NoDevice
        | serialport::ErrorKind::Io(io::ErrorKind::NotFound) => {
            BridgeError::TransportNotFound(path.to_string())
        }
        _ => BridgeError::TransportOpen {
            port: path.to_string(),
            reason: err.to_string(),
        },
    }
}
