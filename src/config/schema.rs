//! Configuration schema definitions.
//!
//! This module defines the structure of the configuration file using serde.
//! All configuration sections are defined here with appropriate defaults.

use crate::connection::ManagerOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial port configuration
    pub serial: SerialConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Serial port configuration section.
///
/// The baud rate is fixed at 115200 and deliberately absent here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Preferred device; when unset the scanner proposes one
    pub port: Option<String>,
    /// Connect as soon as a candidate is found
    pub auto_connect: bool,
    /// Discovery interval in milliseconds
    pub scan_interval_ms: u64,
    /// Probe timeout in milliseconds
    pub probe_timeout_ms: u64,
    /// Read poll interval in milliseconds
    pub read_poll_ms: u64,
    /// Ports excluded from discovery in addition to COM1-COM4
    #[serde(default)]
    pub exclude_ports: Vec<String>,
    /// Port aliases for convenience
    #[serde(default)]
    pub port_aliases: HashMap<String, String>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            auto_connect: false,
            scan_interval_ms: 1000,
            probe_timeout_ms: 1000,
            read_poll_ms: 100,
            exclude_ports: Vec::new(),
            port_aliases: HashMap::new(),
        }
    }
}

impl SerialConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn read_poll(&self) -> Duration {
        Duration::from_millis(self.read_poll_ms)
    }

    /// Resolve a port name through aliases
    pub fn resolve_port(&self, name: &str) -> String {
        self.port_aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// Options for a `ConnectionManager` built from this section.
    pub fn manager_options(&self) -> ManagerOptions {
        ManagerOptions {
            read_poll: self.read_poll(),
            probe_timeout: self.probe_timeout(),
            exclude_ports: self
                .exclude_ports
                .iter()
                .map(|p| self.resolve_port(p))
                .collect(),
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory receiving the per-run session log
    pub directory: PathBuf,
    /// Diagnostic log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Diagnostic log format: "pretty" or "compact"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Diagnostic log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Pretty format with colors
    #[default]
    Pretty,
    /// Compact format
    Compact,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.serial.scan_interval(), Duration::from_secs(1));
        assert_eq!(config.serial.read_poll(), Duration::from_millis(100));
        assert_eq!(config.logging.directory, PathBuf::from("."));
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_port_alias_resolution() {
        let mut config = SerialConfig::default();
        config
            .port_aliases
            .insert("ps4".to_string(), "COM7".to_string());

        assert_eq!(config.resolve_port("ps4"), "COM7");
        assert_eq!(config.resolve_port("COM5"), "COM5");
    }

    #[test]
    fn test_manager_options_resolve_aliases() {
        let mut config = SerialConfig::default();
        config
            .port_aliases
            .insert("debugger".to_string(), "/dev/ttyACM0".to_string());
        config.exclude_ports = vec!["debugger".to_string(), "COM9".to_string()];

        let options = config.manager_options();
        assert_eq!(options.exclude_ports, vec!["/dev/ttyACM0", "COM9"]);
        assert_eq!(options.probe_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[serial]"));
        assert!(toml_str.contains("[logging]"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [serial]
            port = "COM5"
            auto_connect = true

            [logging]
            format = "compact"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.serial.port.as_deref(), Some("COM5"));
        assert!(config.serial.auto_connect);
        assert_eq!(config.logging.format, LogFormat::Compact);
        // Defaults should still work
        assert_eq!(config.serial.scan_interval_ms, 1000);
    }
}
