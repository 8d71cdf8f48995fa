//! Connection lifecycle for the single serial session.
//!
//! `ConnectionManager` owns the only `Session`, drives the
//! `Disconnected -> Connecting -> Connected` state machine and starts or stops
//! the read loop bound to each session generation.
//!
//! # Architecture
//!
//! ```text
//! control context ──> ConnectionManager ──> Session { port, generation, reader }
//!                          │                     │
//!                          │                     └──> ReadLoop thread ──> LogSink / Subscribers
//!                          └──> CommandSender ──> port (same handle)
//! ```
//!
//! The handle is shared as `Arc<Mutex<PortAdapter>>`. Every user of it checks
//! the live generation first, so work belonging to a torn-down session stops
//! instead of touching the next one.

use crate::error::{MonitorError, MonitorResult};
use crate::events::{MonitorEvent, Subscribers};
use crate::logsink::LogSink;
use crate::port::{PortAdapter, PortConfiguration, PortError, SerialBackend, BAUD_RATE};
use crate::reader;
use crate::scanner::{PortCandidate, PortScanner, DEFAULT_PROBE_TIMEOUT};
use crate::sender::CommandSender;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Handle shared between the read loop and the send path.
///
/// `None` once the session is closed; the adapter is dropped under this lock
/// so the device is released before the Disconnected transition is reported.
pub(crate) type SharedPort = Arc<Mutex<Option<PortAdapter>>>;

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
        }
    }
}

/// Tunables for a manager; the baud rate is not one of them.
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Upper bound on how long the read loop holds the handle per poll.
    pub read_poll: Duration,
    /// Timeout used by discovery probes.
    pub probe_timeout: Duration,
    /// Devices never proposed by `scan`, on top of the fixed blacklist.
    pub exclude_ports: Vec<String>,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            read_poll: Duration::from_millis(100),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            exclude_ports: Vec::new(),
        }
    }
}

/// The one live session.
pub(crate) struct Session {
    pub(crate) device: String,
    pub(crate) baud_rate: u32,
    pub(crate) generation: u64,
    port: SharedPort,
    reader: Option<JoinHandle<()>>,
}

impl Session {
    /// Release the handle, then wait for the read loop.
    ///
    /// The adapter is dropped here on whichever thread closes the session.
    /// When that is the read loop itself (a subscriber disconnecting from its
    /// callback) the join is skipped; the loop finds the handle gone and
    /// exits on its own.
    fn close(mut self) -> String {
        // Dropped under the lock: a concurrent send either finished or sees None.
        *self.port.lock() = None;
        debug!(
            device = %self.device,
            generation = self.generation,
            baud_rate = self.baud_rate,
            "serial handle released"
        );

        if let Some(reader) = self.reader.take() {
            if reader.thread().id() != std::thread::current().id() && reader.join().is_err() {
                warn!(device = %self.device, "read loop panicked");
            }
        }
        self.device
    }
}

enum Slot {
    Disconnected,
    Connecting { device: String, attempt: u64 },
    Connected(Session),
}

struct SlotState {
    slot: Slot,
    /// Last generation handed out; bumped on every successful connect.
    generation: u64,
    attempts: u64,
}

/// State shared with the read loop and the command sender.
pub(crate) struct Shared {
    pub(crate) sink: Arc<LogSink>,
    pub(crate) subscribers: Subscribers,
    state: Mutex<SlotState>,
    /// Generation of the Connected session, 0 when there is none.
    live_generation: AtomicU64,
}

impl Shared {
    pub(crate) fn is_live(&self, generation: u64) -> bool {
        generation != 0 && self.live_generation.load(Ordering::SeqCst) == generation
    }

    /// Handle and generation of the Connected session, if any.
    pub(crate) fn connected_port(&self) -> Option<(u64, SharedPort)> {
        match &self.state.lock().slot {
            Slot::Connected(session) => Some((session.generation, Arc::clone(&session.port))),
            _ => None,
        }
    }

    /// Terminal report from the read loop of `generation`.
    pub(crate) fn fail_session(&self, generation: u64, error: PortError) {
        let session = {
            let mut st = self.state.lock();
            match &st.slot {
                Slot::Connected(session) if session.generation == generation => {}
                _ => return,
            }
            self.live_generation.store(0, Ordering::SeqCst);
            match std::mem::replace(&mut st.slot, Slot::Disconnected) {
                Slot::Connected(session) => session,
                _ => return,
            }
        };

        let err = MonitorError::Read(error);
        warn!(device = %session.device, error = %err, "read loop failed, closing session");
        self.record_error(err.to_string());
        self.subscribers
            .publish(&MonitorEvent::ReadError(err.to_string()));

        let device = session.close();
        self.record_info("Connection closed.");
        self.publish_state(ConnectionState::Disconnected, Some(device));
    }

    fn publish_state(&self, state: ConnectionState, device: Option<String>) {
        self.subscribers
            .publish(&MonitorEvent::StateChanged { state, device });
    }

    fn record_info(&self, message: impl Into<String>) {
        if let Err(e) = self.sink.info(message) {
            warn!(error = %e, "failed to write session log");
        }
    }

    fn record_error(&self, message: impl Into<String>) {
        if let Err(e) = self.sink.error(message) {
            warn!(error = %e, "failed to write session log");
        }
    }
}

/// Owner of the single serial session.
///
/// All methods take `&self`; the manager can be shared behind an `Arc`
/// between the control context and anything that only sends or queries.
/// Dropping the manager disconnects.
pub struct ConnectionManager {
    shared: Arc<Shared>,
    backend: Arc<dyn SerialBackend>,
    scanner: PortScanner,
    options: ManagerOptions,
}

impl ConnectionManager {
    pub fn new(backend: Arc<dyn SerialBackend>, sink: Arc<LogSink>) -> Self {
        Self::with_options(backend, sink, ManagerOptions::default())
    }

    pub fn with_options(
        backend: Arc<dyn SerialBackend>,
        sink: Arc<LogSink>,
        options: ManagerOptions,
    ) -> Self {
        let scanner =
            PortScanner::new(Arc::clone(&backend)).with_probe_timeout(options.probe_timeout);
        Self {
            shared: Arc::new(Shared {
                sink,
                subscribers: Subscribers::new(),
                state: Mutex::new(SlotState {
                    slot: Slot::Disconnected,
                    generation: 0,
                    attempts: 0,
                }),
                live_generation: AtomicU64::new(0),
            }),
            backend,
            scanner,
            options,
        }
    }

    pub fn state(&self) -> ConnectionState {
        match self.shared.state.lock().slot {
            Slot::Disconnected => ConnectionState::Disconnected,
            Slot::Connecting { .. } => ConnectionState::Connecting,
            Slot::Connected(_) => ConnectionState::Connected,
        }
    }

    /// Device of the Connecting or Connected session.
    pub fn active_device(&self) -> Option<String> {
        match &self.shared.state.lock().slot {
            Slot::Disconnected => None,
            Slot::Connecting { device, .. } => Some(device.clone()),
            Slot::Connected(session) => Some(session.device.clone()),
        }
    }

    /// Generation of the Connected session, 0 when disconnected.
    pub fn generation(&self) -> u64 {
        self.shared.live_generation.load(Ordering::SeqCst)
    }

    /// Open `device` at the fixed baud rate and start reading from it.
    ///
    /// Returns `Ok(())` without doing anything while another attempt is in
    /// flight. On failure the state is back to Disconnected.
    pub fn connect(&self, device: &str) -> MonitorResult<()> {
        let attempt = {
            let mut st = self.shared.state.lock();
            match &st.slot {
                Slot::Connecting { device: pending, .. } => {
                    debug!(device, pending = %pending, "connect ignored, attempt in progress");
                    return Ok(());
                }
                Slot::Connected(session) => {
                    return Err(MonitorError::AlreadyConnected(session.device.clone()));
                }
                Slot::Disconnected => {}
            }
            st.attempts += 1;
            st.slot = Slot::Connecting {
                device: device.to_string(),
                attempt: st.attempts,
            };
            st.attempts
        };
        debug!(device, baud_rate = BAUD_RATE, "connecting");
        self.shared
            .publish_state(ConnectionState::Connecting, Some(device.to_string()));

        let opened = self.backend.open(
            device,
            PortConfiguration::with_timeout(self.options.read_poll),
        );

        let mut st = self.shared.state.lock();
        let ours = matches!(&st.slot, Slot::Connecting { attempt: a, .. } if *a == attempt);
        if !ours {
            drop(st);
            drop(opened);
            info!(device, "connect cancelled by disconnect");
            return Err(MonitorError::ConnectCancelled(device.to_string()));
        }

        let port = match opened {
            Ok(port) => port,
            Err(e) => {
                st.slot = Slot::Disconnected;
                drop(st);
                let err = MonitorError::connection(device, e);
                warn!(error = %err, "connect failed");
                self.shared.record_error(err.to_string());
                self.shared
                    .publish_state(ConnectionState::Disconnected, Some(device.to_string()));
                return Err(err);
            }
        };

        let generation = st.generation + 1;
        debug!(handle = port.name(), generation, "handle opened");
        let port: SharedPort = Arc::new(Mutex::new(Some(port)));
        self.shared
            .live_generation
            .store(generation, Ordering::SeqCst);
        // Logged before the reader exists so it precedes every received line.
        self.shared
            .record_info(format!("Connected to {device} at {BAUD_RATE} baud"));

        match reader::spawn(
            Arc::clone(&self.shared),
            Arc::clone(&port),
            generation,
            device.to_string(),
        ) {
            Ok(handle) => {
                st.generation = generation;
                st.slot = Slot::Connected(Session {
                    device: device.to_string(),
                    baud_rate: BAUD_RATE,
                    generation,
                    port,
                    reader: Some(handle),
                });
                info!(device, generation, "connected");
                Ok(())
            }
            Err(e) => {
                self.shared.live_generation.store(0, Ordering::SeqCst);
                st.slot = Slot::Disconnected;
                drop(st);
                let err = MonitorError::connection(device, PortError::Io(e));
                self.shared.record_error(err.to_string());
                self.shared
                    .publish_state(ConnectionState::Disconnected, Some(device.to_string()));
                Err(err)
            }
        }
    }

    /// Close the session, if any, and wait for its read loop to finish.
    ///
    /// Always succeeds; a no-op when already disconnected.
    pub fn disconnect(&self) -> MonitorResult<()> {
        let previous = {
            let mut st = self.shared.state.lock();
            self.shared.live_generation.store(0, Ordering::SeqCst);
            std::mem::replace(&mut st.slot, Slot::Disconnected)
        };

        match previous {
            Slot::Disconnected => {
                debug!("disconnect ignored, no active session");
            }
            Slot::Connecting { device, .. } => {
                info!(device = %device, "connection attempt abandoned");
                self.shared
                    .record_info(format!("Connection attempt to {device} cancelled."));
                self.shared
                    .publish_state(ConnectionState::Disconnected, Some(device));
            }
            Slot::Connected(session) => {
                let device = session.close();
                info!(device = %device, "disconnected");
                self.shared.record_info("Connection closed.");
                self.shared
                    .publish_state(ConnectionState::Disconnected, Some(device));
            }
        }
        Ok(())
    }

    /// Write `text` plus a newline to the session.
    pub fn send(&self, text: &str) -> MonitorResult<()> {
        self.sender().send(text)
    }

    /// A cloneable handle onto the send path.
    pub fn sender(&self) -> CommandSender {
        CommandSender::new(Arc::clone(&self.shared))
    }

    /// Propose a device to connect to.
    ///
    /// Returns `None` while a connect attempt is in flight, and never probes
    /// the device of the current session.
    pub fn scan(&self) -> Option<PortCandidate> {
        let mut excluded: HashSet<String> = self.options.exclude_ports.iter().cloned().collect();
        match &self.shared.state.lock().slot {
            Slot::Connecting { .. } => return None,
            Slot::Connected(session) => {
                excluded.insert(session.device.clone());
            }
            Slot::Disconnected => {}
        }
        self.scanner.scan(&excluded)
    }

    /// Every enumerated device, blacklisted ones flagged.
    pub fn candidates(&self) -> Vec<PortCandidate> {
        self.scanner.candidates()
    }

    /// Register a callback for each received line.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.shared.subscribers.subscribe(callback);
    }

    /// Register a callback for lines, state changes and read errors.
    pub fn subscribe_events<F>(&self, callback: F)
    where
        F: Fn(&MonitorEvent) + Send + Sync + 'static,
    {
        self.shared.subscribers.subscribe_events(callback);
    }

    /// Full content of the session log.
    pub fn read_log(&self) -> MonitorResult<String> {
        Ok(self.shared.sink.read_log()?)
    }

    pub fn log_sink(&self) -> &Arc<LogSink> {
        &self.shared.sink
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let _ = self.disconnect();
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .field("device", &self.active_device())
            .field("generation", &self.generation())
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::MockBackend;

    fn manager(backend: &MockBackend) -> (ConnectionManager, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(LogSink::create(dir.path()));
        let options = ManagerOptions {
            read_poll: Duration::from_millis(5),
            ..Default::default()
        };
        (
            ConnectionManager::with_options(Arc::new(backend.clone()), sink, options),
            dir,
        )
    }

    #[test]
    fn test_initial_state_is_disconnected() {
        let backend = MockBackend::new();
        let (manager, _dir) = manager(&backend);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.generation(), 0);
        assert_eq!(manager.active_device(), None);
    }

    #[test]
    fn test_generation_increments_per_successful_connect() {
        let backend = MockBackend::new();
        backend.add_device("COM5");
        let (manager, _dir) = manager(&backend);

        manager.connect("COM5").unwrap();
        let first = manager.generation();
        manager.disconnect().unwrap();
        assert!(manager.connect("COM9").is_err());
        manager.connect("COM5").unwrap();

        assert_eq!(first, 1);
        assert_eq!(manager.generation(), 2);
    }

    #[test]
    fn test_connect_while_connected_is_rejected() {
        let backend = MockBackend::new();
        let port = backend.add_device("COM5");
        let (manager, _dir) = manager(&backend);

        manager.connect("COM5").unwrap();
        let err = manager.connect("COM5").unwrap_err();

        assert!(matches!(err, MonitorError::AlreadyConnected(d) if d == "COM5"));
        assert_eq!(port.open_handles(), 1);
    }

    #[test]
    fn test_drop_releases_handle() {
        let backend = MockBackend::new();
        let port = backend.add_device("COM5");
        let (manager, _dir) = manager(&backend);

        manager.connect("COM5").unwrap();
        drop(manager);
        assert_eq!(port.open_handles(), 0);
    }

    #[test]
    fn test_scan_excludes_active_device() {
        let backend = MockBackend::new();
        backend.add_device("COM5");
        backend.add_device("COM6");
        let (manager, _dir) = manager(&backend);

        manager.connect("COM5").unwrap();
        assert_eq!(manager.scan().map(|c| c.device), Some("COM6".to_string()));
        assert_eq!(
            backend.open_attempts(),
            vec!["COM5", "COM6"],
            "the connected device is never probed"
        );
    }

    #[test]
    fn test_configured_exclusions_apply_to_scan() {
        let backend = MockBackend::new();
        backend.add_device("COM5");
        let dir = tempfile::tempdir().unwrap();
        let options = ManagerOptions {
            exclude_ports: vec!["com5".into()],
            ..Default::default()
        };
        let manager = ConnectionManager::with_options(
            Arc::new(backend.clone()),
            Arc::new(LogSink::create(dir.path())),
            options,
        );

        assert_eq!(manager.scan(), None);
    }
}
