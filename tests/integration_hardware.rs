//! Hardware smoke tests against the serial devices of the host.
//!
//! Ignored unless built with `--features hardware-tests`. Set `TEST_PORT` to
//! pick the device explicitly; otherwise the first discovered one is used.

use std::sync::Arc;
use std::time::Duration;
use uart_monitor::{ConnectionManager, ConnectionState, LogSink, SystemBackend};

fn manager(dir: &tempfile::TempDir) -> ConnectionManager {
    ConnectionManager::new(
        Arc::new(SystemBackend),
        Arc::new(LogSink::create(dir.path())),
    )
}

#[test]
#[cfg_attr(not(feature = "hardware-tests"), ignore)]
fn test_discovery_lists_devices() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir);

    let ports = manager.candidates();
    println!("Found {} port(s)", ports.len());
    for port in &ports {
        println!("  - {} (blacklisted: {})", port.device, port.blacklisted);
    }
    if let Some(candidate) = manager.scan() {
        assert!(!candidate.blacklisted);
    }
}

#[test]
#[cfg_attr(not(feature = "hardware-tests"), ignore)]
fn test_connect_send_disconnect() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir);

    let device = match std::env::var("TEST_PORT").ok().or_else(|| manager.scan().map(|c| c.device)) {
        Some(device) => device,
        None => {
            println!("No serial device available - skipping test");
            return;
        }
    };

    manager.connect(&device).unwrap();
    assert_eq!(manager.state(), ConnectionState::Connected);
    manager.send("").unwrap();
    std::thread::sleep(Duration::from_millis(200));
    manager.disconnect().unwrap();

    assert_eq!(manager.state(), ConnectionState::Disconnected);
    let log = manager.read_log().unwrap();
    assert!(log.contains(&format!("Connected to {device} at 115200 baud")));
    assert!(log.contains("Connection closed."));
}
