//! Errors surfaced by monitor operations.

use crate::logsink::LogError;
use crate::port::PortError;
use thiserror::Error;

/// A specialized `Result` type for monitor operations.
pub type MonitorResult<T> = Result<T, MonitorError>;

/// Unified error type for connect, send and log read-back.
///
/// None of these are fatal: each is reported to the caller of the operation
/// that raised it and the monitor stays usable.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The device could not be opened (absent, busy, or refused).
    #[error("Connection error on {device}: {source}")]
    Connection {
        device: String,
        #[source]
        source: PortError,
    },

    /// A session is already established.
    #[error("Already connected to {0}. Disconnect before connecting again.")]
    AlreadyConnected(String),

    /// `disconnect` ran while the device was still being opened.
    #[error("Connection attempt to {0} was cancelled")]
    ConnectCancelled(String),

    /// The read path failed; the session has been torn down.
    #[error("Read error: {0}")]
    Read(#[source] PortError),

    /// Writing to a live session failed; the session is kept.
    #[error("Write error: {0}")]
    Write(#[source] PortError),

    /// The operation requires a connected session.
    #[error("Operation requires an active connection, but none is open.")]
    NotConnected,

    #[error(transparent)]
    Log(#[from] LogError),
}

impl MonitorError {
    pub fn connection(device: impl Into<String>, source: PortError) -> Self {
        Self::Connection {
            device: device.into(),
            source,
        }
    }

    /// True for the informational "log not yet created" condition.
    pub fn is_log_unavailable(&self) -> bool {
        matches!(self, Self::Log(LogError::Unavailable(_)))
    }
}
