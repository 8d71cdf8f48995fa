//! Core traits for serial port abstraction.
//!
//! `SerialPortAdapter` covers an open handle, `SerialBackend` covers device
//! enumeration and opening. Both have a real implementation on top of the
//! `serialport` crate and an in-memory mock for tests.

use super::error::PortError;
use std::time::Duration;

/// Fixed line rate for every session and every probe.
pub const BAUD_RATE: u32 = 115_200;

/// Parameters used when opening a device.
///
/// Framing is always 8N1 without flow control; only the timeout varies
/// between a session (short poll interval) and a discovery probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortConfiguration {
    /// Baud rate (bits per second).
    pub baud_rate: u32,

    /// Read/write timeout.
    pub timeout: Duration,
}

impl PortConfiguration {
    /// Configuration at the fixed baud rate with the given timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            baud_rate: BAUD_RATE,
            timeout,
        }
    }
}

impl Default for PortConfiguration {
    fn default() -> Self {
        Self::with_timeout(Duration::from_millis(100))
    }
}

/// Trait for serial port I/O operations.
///
/// This trait abstracts over synchronous serial port operations, allowing both
/// real hardware ports and mock implementations for testing.
pub trait SerialPortAdapter: Send + std::fmt::Debug {
    /// Write bytes to the serial port.
    ///
    /// Returns the number of bytes actually written.
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError>;

    /// Read bytes from the serial port into the provided buffer.
    ///
    /// Returns the number of bytes actually read. A read that sees no data
    /// within the configured timeout returns an error for which
    /// [`PortError::is_timeout`] is true.
    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError>;

    /// Get the name/path of this serial port.
    fn name(&self) -> &str;

    /// Set the read/write timeout for this port.
    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError>;

    /// Write the whole buffer, retrying short writes.
    fn write_all_bytes(&mut self, mut data: &[u8]) -> Result<(), PortError> {
        while !data.is_empty() {
            match self.write_bytes(data)? {
                0 => {
                    return Err(PortError::Io(std::io::Error::from(
                        std::io::ErrorKind::WriteZero,
                    )))
                }
                n => data = &data[n..],
            }
        }
        Ok(())
    }
}

/// An open handle behind a trait object.
pub type PortAdapter = Box<dyn SerialPortAdapter>;

/// Access to the devices the operating system exposes.
pub trait SerialBackend: Send + Sync + std::fmt::Debug {
    /// Identifiers of every serial device currently visible.
    fn available_ports(&self) -> Result<Vec<String>, PortError>;

    /// Open `device` with the given configuration.
    fn open(&self, device: &str, config: PortConfiguration) -> Result<PortAdapter, PortError>;
}
