//! Operator command path into the active session.

use crate::connection::Shared;
use crate::error::{MonitorError, MonitorResult};
use std::sync::Arc;
use tracing::{debug, warn};

/// Writes command lines to the Connected session.
///
/// Cheap to clone; every clone targets whatever session is live at the time
/// of the call.
#[derive(Clone)]
pub struct CommandSender {
    shared: Arc<Shared>,
}

impl CommandSender {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Write `text` followed by `\n`.
    ///
    /// Fails with `NotConnected` before any I/O when there is no Connected
    /// session. A failed write is reported but leaves the session up.
    pub fn send(&self, text: &str) -> MonitorResult<()> {
        let Some((generation, port)) = self.shared.connected_port() else {
            debug!("send rejected, not connected");
            return Err(MonitorError::NotConnected);
        };

        let mut payload = Vec::with_capacity(text.len() + 1);
        payload.extend_from_slice(text.as_bytes());
        payload.push(b'\n');

        let result = {
            let mut port = port.lock();
            // The session may have been closed while we waited for the handle.
            match port.as_mut() {
                Some(port) if self.shared.is_live(generation) => port.write_all_bytes(&payload),
                _ => return Err(MonitorError::NotConnected),
            }
        };

        match result {
            Ok(()) => {
                if let Err(e) = self.shared.sink.info(format!("Sent: {text}")) {
                    warn!(error = %e, "failed to record sent command");
                }
                Ok(())
            }
            Err(e) => {
                let err = MonitorError::Write(e);
                warn!(error = %err, "send failed");
                if let Err(e) = self.shared.sink.error(err.to_string()) {
                    warn!(error = %e, "failed to record write failure");
                }
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for CommandSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSender").finish_non_exhaustive()
    }
}
