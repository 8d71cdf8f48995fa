//! Mock serial port implementation for testing.
//!
//! Provides a `MockSerialPort` that simulates a device without hardware, and a
//! `MockBackend` that exposes a set of such devices for discovery and
//! connection tests.

use super::error::PortError;
use super::traits::{PortAdapter, PortConfiguration, SerialBackend, SerialPortAdapter};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::io::ErrorKind;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Inner state of the mock port, shared by every clone.
#[derive(Debug, Default)]
struct MockPortState {
    /// Queue of bytes to be returned by read operations.
    read_queue: VecDeque<u8>,
    /// Reads that return `Ok(0)` before anything else is served.
    empty_reads: usize,
    /// Error returned by the read after the queue drains.
    read_error: Option<ErrorKind>,
    /// Log of all bytes written to the port.
    write_log: Vec<Vec<u8>>,
    /// When set, every write fails with this kind.
    write_error: Option<ErrorKind>,
    /// Configured timeout duration.
    timeout: Duration,
}

/// Mock serial port implementation for testing.
///
/// Clones share the same queues, so a test can keep one clone to feed data
/// and inspect writes while the monitor owns another.
///
/// # Example
/// ```
/// use uart_monitor::port::{MockSerialPort, SerialPortAdapter};
///
/// let mut port = MockSerialPort::new("MOCK0");
/// port.enqueue_read(b"Hello\n");
///
/// let mut buffer = [0u8; 16];
/// let n = port.read_bytes(&mut buffer).unwrap();
/// assert_eq!(&buffer[..n], b"Hello\n");
///
/// port.write_bytes(b"PING\n").unwrap();
/// assert_eq!(port.get_write_log(), vec![b"PING\n".to_vec()]);
/// ```
pub struct MockSerialPort {
    name: String,
    state: Arc<Mutex<MockPortState>>,
    /// Live handles handed out by `MockBackend::open`.
    open_handles: Arc<AtomicUsize>,
    /// Whether this instance is one of those handles.
    counted: bool,
}

impl MockSerialPort {
    /// Create a new mock serial port with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockPortState {
                timeout: Duration::from_millis(10),
                ..Default::default()
            })),
            open_handles: Arc::new(AtomicUsize::new(0)),
            counted: false,
        }
    }

    /// Enqueue bytes to be returned by subsequent read operations.
    pub fn enqueue_read(&self, data: &[u8]) {
        self.state.lock().read_queue.extend(data);
    }

    /// Make the next `count` reads return zero bytes, as some drivers do
    /// when a poll wakes up with nothing to deliver.
    pub fn queue_empty_reads(&self, count: usize) {
        self.state.lock().empty_reads += count;
    }

    /// Make the first read after the queue drains fail with `kind`.
    pub fn fail_next_read(&self, kind: ErrorKind) {
        self.state.lock().read_error = Some(kind);
    }

    /// Make every write fail with `kind` (or succeed again with `None`).
    pub fn fail_writes(&self, kind: Option<ErrorKind>) {
        self.state.lock().write_error = kind;
    }

    /// Get a copy of all data written to the port.
    pub fn get_write_log(&self) -> Vec<Vec<u8>> {
        self.state.lock().write_log.clone()
    }

    /// Get the number of bytes still waiting to be read.
    pub fn available_bytes(&self) -> usize {
        self.state.lock().read_queue.len()
    }

    /// Number of handles opened through a backend and not yet dropped.
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }

    fn counted_handle(&self) -> Self {
        self.open_handles.fetch_add(1, Ordering::SeqCst);
        Self {
            name: self.name.clone(),
            state: Arc::clone(&self.state),
            open_handles: Arc::clone(&self.open_handles),
            counted: true,
        }
    }
}

impl Clone for MockSerialPort {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            state: Arc::clone(&self.state),
            open_handles: Arc::clone(&self.open_handles),
            counted: false,
        }
    }
}

impl Drop for MockSerialPort {
    fn drop(&mut self) {
        if self.counted {
            self.open_handles.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl SerialPortAdapter for MockSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let mut state = self.state.lock();
        if let Some(kind) = state.write_error {
            return Err(PortError::Io(std::io::Error::new(kind, "simulated write failure")));
        }
        state.write_log.push(data.to_vec());
        Ok(data.len())
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let timeout = {
            let mut state = self.state.lock();
            if state.empty_reads > 0 {
                state.empty_reads -= 1;
                return Ok(0);
            }

            let mut bytes_read = 0;
            for byte in buffer.iter_mut() {
                match state.read_queue.pop_front() {
                    Some(queued) => {
                        *byte = queued;
                        bytes_read += 1;
                    }
                    None => break,
                }
            }
            if bytes_read > 0 {
                return Ok(bytes_read);
            }
            if let Some(kind) = state.read_error.take() {
                return Err(PortError::Io(std::io::Error::new(kind, "simulated read failure")));
            }
            state.timeout
        };

        // Behave like a real port waiting out its timeout, without holding
        // the state lock so tests can keep feeding data.
        std::thread::sleep(timeout);
        Err(PortError::timeout(timeout))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        self.state.lock().timeout = timeout;
        Ok(())
    }
}

impl std::fmt::Debug for MockSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSerialPort")
            .field("name", &self.name)
            .field("available_bytes", &self.available_bytes())
            .finish()
    }
}

#[derive(Debug, Clone)]
struct MockDevice {
    port: MockSerialPort,
    busy: bool,
}

#[derive(Debug, Default)]
struct MockBackendState {
    devices: BTreeMap<String, MockDevice>,
    open_delay: Duration,
    open_attempts: Vec<String>,
}

/// In-memory device registry implementing `SerialBackend`.
///
/// Devices are enumerated in name order. Opening a busy device fails with
/// [`PortError::Busy`], opening an unknown one with [`PortError::NotFound`].
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockBackendState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an openable device and return a clone of its port.
    pub fn add_device(&self, name: &str) -> MockSerialPort {
        let port = MockSerialPort::new(name);
        self.state.lock().devices.insert(
            name.to_string(),
            MockDevice {
                port: port.clone(),
                busy: false,
            },
        );
        port
    }

    /// Register a device that is visible but claimed elsewhere.
    pub fn add_busy_device(&self, name: &str) -> MockSerialPort {
        let port = self.add_device(name);
        self.set_busy(name, true);
        port
    }

    pub fn set_busy(&self, name: &str, busy: bool) {
        if let Some(device) = self.state.lock().devices.get_mut(name) {
            device.busy = busy;
        }
    }

    pub fn remove_device(&self, name: &str) {
        self.state.lock().devices.remove(name);
    }

    /// Delay every `open` call, to observe the Connecting state.
    pub fn set_open_delay(&self, delay: Duration) {
        self.state.lock().open_delay = delay;
    }

    /// Device names passed to `open`, in call order.
    pub fn open_attempts(&self) -> Vec<String> {
        self.state.lock().open_attempts.clone()
    }
}

impl SerialBackend for MockBackend {
    fn available_ports(&self) -> Result<Vec<String>, PortError> {
        Ok(self.state.lock().devices.keys().cloned().collect())
    }

    fn open(&self, device: &str, config: PortConfiguration) -> Result<PortAdapter, PortError> {
        let delay = {
            let mut state = self.state.lock();
            state.open_attempts.push(device.to_string());
            state.open_delay
        };
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let state = self.state.lock();
        let entry = state
            .devices
            .get(device)
            .ok_or_else(|| PortError::not_found(device))?;
        if entry.busy {
            return Err(PortError::busy(device));
        }
        let mut handle = entry.port.counted_handle();
        handle.set_timeout(config.timeout)?;
        Ok(Box::new(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_and_read() {
        let mut port = MockSerialPort::new("MOCK0");
        port.enqueue_read(b"Hello");

        let mut buffer = [0u8; 10];
        let n = port.read_bytes(&mut buffer).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buffer[..n], b"Hello");
    }

    #[test]
    fn test_partial_read() {
        let mut port = MockSerialPort::new("MOCK0");
        port.enqueue_read(b"Hello, World!");

        let mut buffer = [0u8; 5];
        let n = port.read_bytes(&mut buffer).unwrap();
        assert_eq!(&buffer[..n], b"Hello");
        assert_eq!(port.available_bytes(), 8);
    }

    #[test]
    fn test_empty_read_times_out() {
        let mut port = MockSerialPort::new("MOCK0");
        port.set_timeout(Duration::from_millis(1)).unwrap();

        let mut buffer = [0u8; 10];
        let err = port.read_bytes(&mut buffer).unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_read_failure_after_queue_drains() {
        let mut port = MockSerialPort::new("MOCK0");
        port.enqueue_read(b"ok\n");
        port.fail_next_read(ErrorKind::BrokenPipe);

        let mut buffer = [0u8; 16];
        assert_eq!(port.read_bytes(&mut buffer).unwrap(), 3);
        let err = port.read_bytes(&mut buffer).unwrap_err();
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_empty_reads_precede_queued_data() {
        let mut port = MockSerialPort::new("MOCK0");
        port.queue_empty_reads(2);
        port.enqueue_read(b"x");

        let mut buffer = [0u8; 4];
        assert_eq!(port.read_bytes(&mut buffer).unwrap(), 0);
        assert_eq!(port.read_bytes(&mut buffer).unwrap(), 0);
        assert_eq!(port.read_bytes(&mut buffer).unwrap(), 1);
    }

    #[test]
    fn test_write_logging_and_failure() {
        let mut port = MockSerialPort::new("MOCK0");
        port.write_bytes(b"Test1").unwrap();
        port.fail_writes(Some(ErrorKind::BrokenPipe));
        assert!(port.write_bytes(b"Test2").is_err());

        assert_eq!(port.get_write_log(), vec![b"Test1".to_vec()]);
    }

    #[test]
    fn test_backend_open_counts_handles() {
        let backend = MockBackend::new();
        let port = backend.add_device("COM5");

        let handle = backend.open("COM5", PortConfiguration::default()).unwrap();
        assert_eq!(port.open_handles(), 1);
        drop(handle);
        assert_eq!(port.open_handles(), 0);
    }

    #[test]
    fn test_backend_busy_and_missing() {
        let backend = MockBackend::new();
        backend.add_busy_device("COM6");

        assert!(matches!(
            backend.open("COM6", PortConfiguration::default()),
            Err(PortError::Busy(_))
        ));
        assert!(matches!(
            backend.open("COM7", PortConfiguration::default()),
            Err(PortError::NotFound(_))
        ));
        assert_eq!(backend.open_attempts(), vec!["COM6", "COM7"]);
    }

    #[test]
    fn test_backend_handle_name_and_removal() {
        let backend = MockBackend::new();
        backend.add_device("COM5");

        let handle = backend.open("COM5", PortConfiguration::default()).unwrap();
        assert_eq!(handle.name(), "COM5");

        backend.remove_device("COM5");
        assert!(backend.available_ports().unwrap().is_empty());
        assert!(matches!(
            backend.open("COM5", PortConfiguration::default()),
            Err(PortError::NotFound(_))
        ));
    }
}
