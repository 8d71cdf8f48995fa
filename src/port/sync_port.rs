//! Synchronous serial port implementation.
//!
//! Wraps the `serialport` crate's `SerialPort` trait with our own `SerialPortAdapter`
//! trait, and exposes the operating system's device list as a `SerialBackend`.

use super::error::PortError;
use super::traits::{PortAdapter, PortConfiguration, SerialBackend, SerialPortAdapter};
use std::io::{Read, Write};
use std::time::Duration;

/// Synchronous serial port implementation wrapping `serialport::SerialPort`.
pub struct SyncSerialPort {
    /// The underlying serial port implementation.
    port: Box<dyn serialport::SerialPort>,
    /// The port name/path for identification.
    name: String,
}

impl SyncSerialPort {
    /// Open a serial port at 8N1 with the given configuration.
    ///
    /// # Example
    /// ```no_run
    /// use std::time::Duration;
    /// use uart_monitor::port::{PortConfiguration, SyncSerialPort};
    ///
    /// let config = PortConfiguration::with_timeout(Duration::from_millis(100));
    /// let port = SyncSerialPort::open("/dev/ttyUSB0", config)?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open(port_name: &str, config: PortConfiguration) -> Result<Self, PortError> {
        let port = serialport::new(port_name, config.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .flow_control(serialport::FlowControl::None)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(config.timeout)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => PortError::not_found(port_name),
                serialport::ErrorKind::InvalidInput => PortError::config(e.to_string()),
                serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
                    PortError::busy(port_name)
                }
                _ => PortError::Serial(e),
            })?;

        Ok(Self {
            port,
            name: port_name.to_string(),
        })
    }
}

impl SerialPortAdapter for SyncSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let n = self.port.write(data).map_err(PortError::Io)?;
        self.port.flush().map_err(PortError::Io)?;
        Ok(n)
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        self.port.read(buffer).map_err(PortError::Io)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        self.port.set_timeout(timeout).map_err(PortError::Serial)
    }
}

impl std::fmt::Debug for SyncSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSerialPort")
            .field("name", &self.name)
            .field("baud_rate", &self.port.baud_rate())
            .finish()
    }
}

/// Devices as reported by `serialport::available_ports`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBackend;

impl SerialBackend for SystemBackend {
    fn available_ports(&self) -> Result<Vec<String>, PortError> {
        let ports = serialport::available_ports()?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }

    fn open(&self, device: &str, config: PortConfiguration) -> Result<PortAdapter, PortError> {
        Ok(Box::new(SyncSerialPort::open(device, config)?))
    }
}
