//! Configuration module for the UART monitor.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `UART_MONITOR_CONFIG` environment variable (explicit path)
//! 2. `./config.toml` (current directory)
//! 3. The platform config directory, e.g. `~/.config/uart-monitor/config.toml`
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! The pattern is: `UART_MONITOR_<SECTION>_<KEY>`
//!
//! Examples:
//! - `UART_MONITOR_SERIAL_PORT=COM5`
//! - `UART_MONITOR_SERIAL_SCAN_INTERVAL_MS=500`
//! - `UART_MONITOR_LOGGING_LEVEL=debug`
//!
//! # Example
//!
//! ```rust,no_run
//! use uart_monitor::config::ConfigLoader;
//!
//! let loader = ConfigLoader::load()?;
//! let config = loader.config();
//!
//! println!("Scan every {:?}", config.serial.scan_interval());
//! println!("Session logs in {}", config.logging.directory.display());
//! # Ok::<(), uart_monitor::config::ConfigError>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{Config, LogFormat, LoggingConfig, SerialConfig};
