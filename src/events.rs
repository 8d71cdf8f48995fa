//! Publish/subscribe point between the core and its presentation layer.

use crate::connection::ConnectionState;
use parking_lot::RwLock;
use std::sync::Arc;

/// Something the monitor reports to its subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// One decoded line from the device, without its terminator.
    Line(String),
    /// The connection moved to a new state.
    StateChanged {
        state: ConnectionState,
        device: Option<String>,
    },
    /// The read path failed and the session was torn down.
    ReadError(String),
}

type Callback = Arc<dyn Fn(&MonitorEvent) + Send + Sync>;

/// Registered callbacks, invoked in registration order.
#[derive(Clone, Default)]
pub struct Subscribers {
    callbacks: Arc<RwLock<Vec<Callback>>>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for every event.
    pub fn subscribe_events<F>(&self, callback: F)
    where
        F: Fn(&MonitorEvent) + Send + Sync + 'static,
    {
        self.callbacks.write().push(Arc::new(callback));
    }

    /// Register a callback for received lines only.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.subscribe_events(move |event| {
            if let MonitorEvent::Line(line) = event {
                callback(line);
            }
        });
    }

    /// Deliver `event` to every subscriber.
    ///
    /// The list is snapshotted first, so a callback may subscribe further
    /// callbacks without deadlocking.
    pub fn publish(&self, event: &MonitorEvent) {
        let callbacks: Vec<Callback> = self.callbacks.read().clone();
        for callback in callbacks {
            callback(event);
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers")
            .field("count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_line_subscribers_see_lines_in_order() {
        let subscribers = Subscribers::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        subscribers.subscribe(move |line| sink.lock().push(line.to_string()));

        subscribers.publish(&MonitorEvent::Line("a".into()));
        subscribers.publish(&MonitorEvent::ReadError("boom".into()));
        subscribers.publish(&MonitorEvent::Line("b".into()));

        assert_eq!(*seen.lock(), vec!["a", "b"]);
    }

    #[test]
    fn test_every_subscriber_is_called() {
        let subscribers = Subscribers::new();
        let count = Arc::new(Mutex::new(0));
        for _ in 0..3 {
            let count = Arc::clone(&count);
            subscribers.subscribe_events(move |_| *count.lock() += 1);
        }

        subscribers.publish(&MonitorEvent::Line("x".into()));
        assert_eq!(*count.lock(), 3);
        assert_eq!(subscribers.len(), 3);
    }

    #[test]
    fn test_subscribe_from_inside_callback() {
        let subscribers = Subscribers::new();
        let inner = subscribers.clone();
        subscribers.subscribe_events(move |_| inner.subscribe(|_| {}));

        subscribers.publish(&MonitorEvent::Line("x".into()));
        assert_eq!(subscribers.len(), 2);
    }
}
