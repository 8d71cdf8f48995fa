//! Append-only session log.
//!
//! One plain-text file per process run, named from the process start time.
//! Every received line, every sent command and every connection transition
//! lands here as `<timestamp> - <LEVEL> - <message>`.

use chrono::{DateTime, Local, SecondsFormat};
use parking_lot::Mutex;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// File name pattern, formatted with the process start time.
pub const LOG_FILE_PATTERN: &str = "uart_log_%Y%m%d_%H%M%S.txt";

/// Errors raised by the log sink.
#[derive(Debug, Error)]
pub enum LogError {
    /// Nothing has been written yet, so there is nothing to show.
    #[error("Log has not been created yet: {}", .0.display())]
    Unavailable(PathBuf),

    #[error("Failed to access log file '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Severity of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => f.write_str("INFO"),
            Self::Error => f.write_str("ERROR"),
        }
    }
}

/// One immutable log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

impl LogRecord {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            level,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }

    /// Render as a single line, newline included.
    ///
    /// Line breaks inside the message are flattened so one record is always
    /// exactly one line of the file.
    pub fn to_line(&self) -> String {
        let message = self.message.replace(&['\r', '\n'][..], " ");
        format!(
            "{} - {} - {}\n",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, false),
            self.level,
            message
        )
    }
}

/// Timestamped, append-only log file shared by the read and send paths.
#[derive(Debug)]
pub struct LogSink {
    path: PathBuf,
    /// Opened lazily on the first append.
    file: Mutex<Option<File>>,
}

impl LogSink {
    /// Sink in `dir` named after the current time.
    pub fn create(dir: impl AsRef<Path>) -> Self {
        let name = Local::now().format(LOG_FILE_PATTERN).to_string();
        Self::at_path(dir.as_ref().join(name))
    }

    /// Sink writing to an explicit path.
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record.
    ///
    /// The timestamp is refreshed under the lock, so file order and
    /// timestamp order always agree with call order.
    pub fn append(&self, mut record: LogRecord) -> Result<(), LogError> {
        let mut guard = self.file.lock();
        if guard.is_none() {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
                }
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .map_err(|e| self.io_error(e))?;
            debug!(path = %self.path.display(), "created session log");
            *guard = Some(file);
        }

        record.timestamp = Local::now();
        let line = record.to_line();
        if let Some(file) = guard.as_mut() {
            file.write_all(line.as_bytes())
                .and_then(|_| file.flush())
                .map_err(|e| self.io_error(e))?;
        }
        Ok(())
    }

    pub fn info(&self, message: impl Into<String>) -> Result<(), LogError> {
        self.append(LogRecord::info(message))
    }

    pub fn error(&self, message: impl Into<String>) -> Result<(), LogError> {
        self.append(LogRecord::error(message))
    }

    /// Full contents of the log, for the viewer.
    pub fn read_log(&self) -> Result<String, LogError> {
        // Hold the writer lock so a half-written record is never returned.
        let _guard = self.file.lock();
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(LogError::Unavailable(self.path.clone()))
            }
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn io_error(&self, source: std::io::Error) -> LogError {
        LogError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
