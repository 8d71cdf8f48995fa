//! Background read loop for one session generation.
//!
//! The loop polls the shared handle with a short timeout, splits the byte
//! stream into lines, and hands each line to the log and the subscribers.
//! It stops silently as soon as its generation is no longer the live one or
//! its handle has been released, and reports any real I/O failure back to the
//! connection manager before exiting. It never retries.

use crate::connection::{ConnectionState, Shared, SharedPort};
use crate::events::MonitorEvent;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Bytes requested from the handle per poll.
const READ_CHUNK: usize = 1024;

/// A line longer than this without a terminator is flushed as-is.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Splits a byte stream into newline-terminated text lines.
///
/// A trailing `\r` is dropped, and invalid UTF-8 is replaced with U+FFFD
/// instead of failing the line.
#[derive(Debug, Default)]
pub struct LineDecoder {
    pending: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and collect every line they complete.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        let mut start = 0;
        for end in memchr::memchr_iter(b'\n', &self.pending) {
            lines.push(decode(&self.pending[start..end]));
            start = end + 1;
        }
        self.pending.drain(..start);

        if self.pending.len() > MAX_LINE_LEN {
            lines.push(decode(&self.pending));
            self.pending.clear();
        }
        lines
    }

    /// Bytes received after the last terminator.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }
}

fn decode(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// Start the read loop for `generation` on its own thread.
pub(crate) fn spawn(
    shared: Arc<Shared>,
    port: SharedPort,
    generation: u64,
    device: String,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("uart-read-{generation}"))
        .spawn(move || {
            ReadLoop {
                shared,
                port,
                generation,
                device,
                decoder: LineDecoder::new(),
            }
            .run()
        })
}

struct ReadLoop {
    shared: Arc<Shared>,
    port: SharedPort,
    generation: u64,
    device: String,
    decoder: LineDecoder,
}

impl ReadLoop {
    fn run(mut self) {
        if !self.is_live() {
            return;
        }
        debug!(device = %self.device, generation = self.generation, "read loop started");
        // Announced from this thread so it always precedes the first line.
        self.shared.subscribers.publish(&MonitorEvent::StateChanged {
            state: ConnectionState::Connected,
            device: Some(self.device.clone()),
        });

        let mut buffer = [0u8; READ_CHUNK];
        loop {
            if !self.is_live() {
                debug!(generation = self.generation, "read loop superseded, exiting");
                return;
            }

            let result = match self.port.lock().as_mut() {
                Some(port) => port.read_bytes(&mut buffer),
                None => {
                    debug!(generation = self.generation, "handle released, exiting");
                    return;
                }
            };
            match result {
                Ok(0) => continue,
                Ok(n) => {
                    for line in self.decoder.push(&buffer[..n]) {
                        if !self.deliver(line) {
                            return;
                        }
                    }
                }
                Err(e) if e.is_timeout() => continue,
                Err(e) => {
                    if self.is_live() {
                        self.shared.fail_session(self.generation, e);
                    }
                    return;
                }
            }
        }
    }

    fn deliver(&self, line: String) -> bool {
        if !self.is_live() {
            return false;
        }
        if let Err(e) = self.shared.sink.info(line.as_str()) {
            warn!(error = %e, "failed to record received line");
        }
        self.shared.subscribers.publish(&MonitorEvent::Line(line));
        true
    }

    fn is_live(&self) -> bool {
        self.shared.is_live(self.generation)
    }
}
