//! Port-specific error types.
//!
//! Kept apart from the monitor-level errors so the port layer can be used
//! (and mocked) without pulling in connection semantics.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during serial port operations.
#[derive(Debug, Error)]
pub enum PortError {
    /// The specified serial port was not found on the system.
    #[error("Serial port not found: {0}")]
    NotFound(String),

    /// The port exists but is claimed by another process.
    #[error("Serial port is busy: {0}")]
    Busy(String),

    /// An I/O error occurred during port operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Port configuration failed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation timed out.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// A serialport-specific error occurred.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl PortError {
    /// Create a NotFound error from a port name.
    pub fn not_found(port_name: impl Into<String>) -> Self {
        Self::NotFound(port_name.into())
    }

    /// Create a Busy error from a port name.
    pub fn busy(port_name: impl Into<String>) -> Self {
        Self::Busy(port_name.into())
    }

    /// Create a Config error from a message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a Timeout error from a duration.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout(duration)
    }

    /// True when the error only means "no data arrived within the poll
    /// interval", which is not a failure of the handle.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PortError::not_found("/dev/ttyUSB0");
        assert_eq!(err.to_string(), "Serial port not found: /dev/ttyUSB0");

        let err = PortError::busy("COM5");
        assert_eq!(err.to_string(), "Serial port is busy: COM5");

        let err = PortError::config("Invalid baud rate");
        assert_eq!(err.to_string(), "Configuration error: Invalid baud rate");
    }

    #[test]
    fn test_timeout_classification() {
        assert!(PortError::timeout(Duration::from_millis(500)).is_timeout());
        assert!(PortError::Io(std::io::Error::from(std::io::ErrorKind::TimedOut)).is_timeout());
        assert!(PortError::Io(std::io::Error::from(std::io::ErrorKind::WouldBlock)).is_timeout());

        assert!(!PortError::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe)).is_timeout());
        assert!(!PortError::not_found("COM9").is_timeout());
    }

    #[test]
    fn test_timeout_display_mentions_duration() {
        let err = PortError::timeout(Duration::from_millis(500));
        assert!(err.to_string().contains("500ms"));
    }
}
