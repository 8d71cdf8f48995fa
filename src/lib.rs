//! UART Monitor Library
//!
//! Core of a serial line monitor: it discovers a serial device, keeps one
//! session open at 115200 baud, streams received lines to subscribers and to
//! a timestamped session log, and writes operator commands back to the
//! device.
//!
//! # Modules
//!
//! - `config`: Configuration management with TOML support
//! - `connection`: Session ownership and the connection state machine
//! - `error`: Unified error handling
//! - `events`: Publish/subscribe interface for the presentation layer
//! - `logsink`: Append-only, timestamped session log
//! - `port`: Port abstraction layer for serial communication
//! - `reader`: Background line reader bound to a session generation
//! - `scanner`: Serial device auto-discovery
//! - `sender`: Command write path

pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod logsink;
pub mod port;
pub mod reader;
pub mod scanner;
pub mod sender;

// Re-export commonly used types for convenience
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
pub use connection::{ConnectionManager, ConnectionState, ManagerOptions};
pub use error::{MonitorError, MonitorResult};
pub use events::{MonitorEvent, Subscribers};
pub use logsink::{LogError, LogLevel, LogRecord, LogSink};
pub use port::{
    MockBackend, MockSerialPort, PortConfiguration, PortError, SerialBackend, SerialPortAdapter,
    SystemBackend, BAUD_RATE,
};
pub use reader::LineDecoder;
pub use scanner::{is_blacklisted, PortCandidate, PortScanner, BLACKLIST};
pub use sender::CommandSender;
