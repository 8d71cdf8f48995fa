//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::{Config, LogFormat};
use std::path::{Path, PathBuf};

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "UART_MONITOR";

/// Config file name
const CONFIG_FILE_NAME: &str = "config.toml";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "UART_MONITOR_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `UART_MONITOR_CONFIG` environment variable (explicit path)
    /// 2. `./config.toml` (current directory)
    /// 3. The platform config directory (`uart-monitor/config.toml`)
    /// 4. Built-in defaults (no file required)
    ///
    /// Environment variables can override any config file values.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = if let Some(ref path) = config_path {
            load_from_file(path)?
        } else {
            Config::default()
        };

        apply_env_overrides(&mut config)?;
        validate(&config)?;

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        validate(&config)?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    pub fn with_defaults() -> Self {
        let mut config = Config::default();
        // Still apply env overrides even with defaults
        if apply_env_overrides(&mut config).is_err() {
            config = Config::default();
        }

        Self {
            config_path: None,
            config,
        }
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save the current configuration to a specific file.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    // 1. Explicit environment variable
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. Current directory
    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    // 3. Platform config directory
    if let Some(app_config) = get_default_config_path() {
        if app_config.exists() {
            return Some(app_config);
        }
    }

    // 4. No config file found - will use defaults
    None
}

/// Get the default config directory for creating new config files.
pub fn get_default_config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "uart-monitor").map(|d| d.config_dir().to_path_buf())
}

/// Get the default config file path for creating new config files.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_default_config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}

/// Load configuration from a file.
fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(ConfigError::ParseError)
}

/// Save configuration to a file.
fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
        path: path.to_path_buf(),
        source: e,
    })
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(format!("{}_{}", ENV_PREFIX, key)).ok()
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str, what: &str) -> ConfigResult<T> {
    value
        .parse()
        .map_err(|_| ConfigError::env_parse(format!("{}_{}", ENV_PREFIX, key), what))
}

/// Apply environment variable overrides to the configuration.
///
/// Environment variables follow the pattern: `UART_MONITOR_<SECTION>_<KEY>`
/// For example:
/// - `UART_MONITOR_SERIAL_PORT=COM5`
/// - `UART_MONITOR_SERIAL_AUTO_CONNECT=true`
/// - `UART_MONITOR_LOGGING_DIRECTORY=/var/log/uart`
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    // Serial overrides
    if let Some(val) = env_var("SERIAL_PORT") {
        config.serial.port = Some(val);
    }
    if let Some(val) = env_var("SERIAL_AUTO_CONNECT") {
        config.serial.auto_connect = val.eq_ignore_ascii_case("true") || val == "1";
    }
    if let Some(val) = env_var("SERIAL_SCAN_INTERVAL_MS") {
        config.serial.scan_interval_ms = parse_env("SERIAL_SCAN_INTERVAL_MS", &val, "Invalid interval")?;
    }
    if let Some(val) = env_var("SERIAL_PROBE_TIMEOUT_MS") {
        config.serial.probe_timeout_ms = parse_env("SERIAL_PROBE_TIMEOUT_MS", &val, "Invalid timeout")?;
    }
    if let Some(val) = env_var("SERIAL_READ_POLL_MS") {
        config.serial.read_poll_ms = parse_env("SERIAL_READ_POLL_MS", &val, "Invalid interval")?;
    }

    // Logging overrides
    if let Some(val) = env_var("LOGGING_DIRECTORY") {
        config.logging.directory = PathBuf::from(val);
    }
    if let Some(val) = env_var("LOGGING_LEVEL") {
        config.logging.level = val;
    }
    if let Some(val) = env_var("LOGGING_FORMAT") {
        config.logging.format = match val.to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            "compact" => LogFormat::Compact,
            _ => {
                return Err(ConfigError::env_parse(
                    format!("{}_LOGGING_FORMAT", ENV_PREFIX),
                    "Expected 'pretty' or 'compact'",
                ))
            }
        };
    }

    Ok(())
}

/// Reject values that would make the monitor spin or never time out.
fn validate(config: &Config) -> ConfigResult<()> {
    let serial = &config.serial;
    for (key, value) in [
        ("serial.scan_interval_ms", serial.scan_interval_ms),
        ("serial.probe_timeout_ms", serial.probe_timeout_ms),
        ("serial.read_poll_ms", serial.read_poll_ms),
    ] {
        if value == 0 {
            return Err(ConfigError::validation(key, "must be greater than zero"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn test_default_loader() {
        let loader = ConfigLoader::with_defaults();
        assert_eq!(loader.config().serial.scan_interval_ms, 1000);
        assert!(loader.config_path.is_none());
    }

    #[test]
    #[serial]
    fn test_env_override() {
        env::set_var("UART_MONITOR_SERIAL_PORT", "COM42");
        env::set_var("UART_MONITOR_SERIAL_AUTO_CONNECT", "1");

        let loader = ConfigLoader::with_defaults();
        assert_eq!(loader.config().serial.port.as_deref(), Some("COM42"));
        assert!(loader.config().serial.auto_connect);

        env::remove_var("UART_MONITOR_SERIAL_PORT");
        env::remove_var("UART_MONITOR_SERIAL_AUTO_CONNECT");
    }

    #[test]
    #[serial]
    fn test_invalid_env_value_is_reported() {
        env::set_var("UART_MONITOR_SERIAL_READ_POLL_MS", "soon");

        let mut config = Config::default();
        let err = apply_env_overrides(&mut config).unwrap_err();
        assert!(err.to_string().contains("UART_MONITOR_SERIAL_READ_POLL_MS"));

        env::remove_var("UART_MONITOR_SERIAL_READ_POLL_MS");
    }

    #[test]
    #[serial]
    fn test_load_from_file_and_save_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut loader = ConfigLoader::with_defaults();
        loader.config.serial.port = Some("/dev/ttyUSB0".into());
        loader.save_to(&path).unwrap();

        let reloaded = ConfigLoader::load_from(&path).unwrap();
        assert_eq!(reloaded.config().serial.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(reloaded.config_path.as_deref(), Some(path.as_path()));
    }

    #[test]
    #[serial]
    fn test_zero_poll_interval_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[serial]\nread_poll_ms = 0\n").unwrap();

        let err = ConfigLoader::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { ref key, .. } if key == "serial.read_poll_ms"));
    }
}
