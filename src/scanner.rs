//! Serial device auto-discovery.
//!
//! Enumerates the devices the backend reports, skips the reserved aliases,
//! and probes the rest by opening and immediately closing them. The first
//! device that opens cleanly is proposed as a connection candidate.

use crate::port::{PortConfiguration, SerialBackend};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Device aliases never proposed by discovery, compared case-insensitively.
pub const BLACKLIST: [&str; 4] = ["COM1", "COM2", "COM3", "COM4"];

/// Timeout used when probing a device.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// A device seen during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortCandidate {
    pub device: String,
    pub blacklisted: bool,
}

impl PortCandidate {
    pub fn new(device: impl Into<String>) -> Self {
        let device = device.into();
        let blacklisted = is_blacklisted(&device);
        Self {
            device,
            blacklisted,
        }
    }
}

/// Whether `device` is one of the reserved aliases.
pub fn is_blacklisted(device: &str) -> bool {
    BLACKLIST
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(device))
}

/// Stateless prober over a serial backend.
#[derive(Debug, Clone)]
pub struct PortScanner {
    backend: Arc<dyn SerialBackend>,
    probe_timeout: Duration,
}

impl PortScanner {
    pub fn new(backend: Arc<dyn SerialBackend>) -> Self {
        Self {
            backend,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Every enumerated device with its blacklist flag, in backend order.
    pub fn candidates(&self) -> Vec<PortCandidate> {
        match self.backend.available_ports() {
            Ok(ports) => ports.into_iter().map(PortCandidate::new).collect(),
            Err(e) => {
                warn!(error = %e, "failed to enumerate serial ports");
                Vec::new()
            }
        }
    }

    /// First non-blacklisted, non-excluded device that opens cleanly.
    ///
    /// `excluded` is matched case-insensitively. The probe handle is dropped
    /// (closed) before the next device is tried.
    pub fn scan(&self, excluded: &HashSet<String>) -> Option<PortCandidate> {
        let config = PortConfiguration::with_timeout(self.probe_timeout);
        self.candidates()
            .into_iter()
            .filter(|candidate| !candidate.blacklisted)
            .filter(|candidate| {
                !excluded
                    .iter()
                    .any(|ex| ex.eq_ignore_ascii_case(&candidate.device))
            })
            .find(|candidate| match self.backend.open(&candidate.device, config) {
                Ok(probe) => {
                    drop(probe);
                    debug!(device = %candidate.device, "probe succeeded");
                    true
                }
                Err(e) => {
                    debug!(device = %candidate.device, error = %e, "probe failed");
                    false
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::MockBackend;
    use proptest::prelude::*;

    fn scanner(backend: &MockBackend) -> PortScanner {
        PortScanner::new(Arc::new(backend.clone()))
    }

    #[test]
    fn test_scan_returns_openable_device() {
        let backend = MockBackend::new();
        let port = backend.add_device("COM5");

        let found = scanner(&backend).scan(&HashSet::new());
        assert_eq!(found, Some(PortCandidate::new("COM5")));
        assert_eq!(port.open_handles(), 0, "probe handle must be released");
    }

    #[test]
    fn test_scan_skips_blacklisted_aliases() {
        let backend = MockBackend::new();
        backend.add_device("COM1");
        backend.add_device("com3");
        backend.add_device("COM4");

        assert_eq!(scanner(&backend).scan(&HashSet::new()), None);
        assert!(backend.open_attempts().is_empty(), "blacklisted devices are never probed");
    }

    #[test]
    fn test_scan_skips_busy_and_excluded_devices() {
        let backend = MockBackend::new();
        backend.add_busy_device("/dev/ttyACM0");
        backend.add_device("/dev/ttyUSB0");
        backend.add_device("/dev/ttyUSB1");

        let excluded: HashSet<String> = ["/dev/ttyUSB0".to_string()].into();
        let found = scanner(&backend).scan(&excluded);

        assert_eq!(found.map(|c| c.device), Some("/dev/ttyUSB1".to_string()));
        assert_eq!(backend.open_attempts(), vec!["/dev/ttyACM0", "/dev/ttyUSB1"]);
    }

    #[test]
    fn test_scan_without_devices() {
        let backend = MockBackend::new();
        assert_eq!(scanner(&backend).scan(&HashSet::new()), None);
    }

    #[test]
    fn test_candidates_flag_blacklist() {
        let backend = MockBackend::new();
        backend.add_device("COM2");
        backend.add_device("COM7");

        let candidates = scanner(&backend).candidates();
        assert_eq!(
            candidates,
            vec![
                PortCandidate {
                    device: "COM2".into(),
                    blacklisted: true
                },
                PortCandidate {
                    device: "COM7".into(),
                    blacklisted: false
                },
            ]
        );
    }

    proptest! {
        #[test]
        fn prop_scan_never_returns_reserved_alias(
            index in 0usize..4,
            mask in proptest::collection::vec(any::<bool>(), 4),
        ) {
            let backend = MockBackend::new();
            let alias: String = BLACKLIST[index]
                .chars()
                .zip(mask.iter().cycle())
                .map(|(c, upper)| if *upper { c.to_ascii_uppercase() } else { c.to_ascii_lowercase() })
                .collect();
            backend.add_device(&alias);

            let found = scanner(&backend).scan(&HashSet::new());
            prop_assert!(found.is_none());
            prop_assert!(is_blacklisted(&alias));
        }
    }
}
