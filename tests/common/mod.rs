//! Shared test utilities for the UART monitor tests.
//!
//! This module provides common test infrastructure including:
//! - A harness wiring a `ConnectionManager` to a `MockBackend` and a temp log
//! - Event capture for subscriber assertions
//! - Polling helpers for the asynchronous read path

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use uart_monitor::{
    ConnectionManager, LogSink, ManagerOptions, MockBackend, MonitorEvent,
};

/// Generous upper bound for anything the read loop has to do.
pub const WAIT: Duration = Duration::from_secs(3);

/// Poll interval used by the harness; the mock sleeps this long per empty read.
pub const POLL: Duration = Duration::from_millis(5);

/// Test harness with a mock device registry and captured events.
pub struct TestHarness {
    pub backend: MockBackend,
    pub manager: Arc<ConnectionManager>,
    pub events: Arc<Mutex<Vec<MonitorEvent>>>,
    /// Keeps the log directory alive for the harness lifetime.
    pub dir: TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        let backend = MockBackend::new();
        let dir = tempfile::tempdir().expect("create temp dir");
        let sink = Arc::new(LogSink::create(dir.path()));
        let options = ManagerOptions {
            read_poll: POLL,
            probe_timeout: POLL,
            ..Default::default()
        };
        let manager = Arc::new(ConnectionManager::with_options(
            Arc::new(backend.clone()),
            sink,
            options,
        ));

        let events = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&events);
        manager.subscribe_events(move |event| captured.lock().push(event.clone()));

        Self {
            backend,
            manager,
            events,
            dir,
        }
    }

    pub fn events(&self) -> Vec<MonitorEvent> {
        self.events.lock().clone()
    }

    /// Received lines, in delivery order.
    pub fn lines(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                MonitorEvent::Line(line) => Some(line.clone()),
                _ => None,
            })
            .collect()
    }

    /// Session log split into lines; empty when the log does not exist yet.
    pub fn log_lines(&self) -> Vec<String> {
        match self.manager.read_log() {
            Ok(content) => content.lines().map(str::to_string).collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// Poll `condition` until it holds or `timeout` expires.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Split a log line into `(timestamp, level, message)`.
pub fn parse_log_line(line: &str) -> Option<(&str, &str, &str)> {
    let mut parts = line.splitn(3, " - ");
    Some((parts.next()?, parts.next()?, parts.next()?))
}
