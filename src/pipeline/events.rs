//! Events published by a pipeline.
//!
//! Two delivery paths carry the same information:
//! - [`PipelineListener`] callbacks, invoked synchronously on the task that
//!   produced the event;
//! - channel subscriptions ([`Pipeline::subscribe`](super::Pipeline::subscribe)),
//!   which receive serializable [`PipelineEvent`]s.
//!
//! Datasets complete in worker order, not extraction order. Consumers that
//! need ordered data sort by `sequence`.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::ConnectionId;
use crate::pool::Dataset;
use crate::transform::{TransformFailure, Value};

/// Serializable event for channel subscribers and remote consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PipelineEvent {
    Dataset {
        connection: ConnectionId,
        sequence: u64,
        values: Vec<Value>,
        /// Extraction time, milliseconds since the Unix epoch.
        timestamp_ms: u64,
        checksum_valid: bool,
    },
    ChecksumWarning {
        connection: ConnectionId,
        sequence: u64,
    },
    TransformFailed {
        connection: ConnectionId,
        sequence: u64,
        error: String,
    },
    /// A frame never reached a worker (queue full or pipeline closing).
    FrameDropped {
        connection: ConnectionId,
        sequence: u64,
    },
}

impl PipelineEvent {
    pub fn connection(&self) -> ConnectionId {
        match self {
            PipelineEvent::Dataset { connection, .. }
            | PipelineEvent::ChecksumWarning { connection, .. }
            | PipelineEvent::TransformFailed { connection, .. }
            | PipelineEvent::FrameDropped { connection, .. } => *connection,
        }
    }

    pub fn sequence(&self) -> u64 {
        match self {
            PipelineEvent::Dataset { sequence, .. }
            | PipelineEvent::ChecksumWarning { sequence, .. }
            | PipelineEvent::TransformFailed { sequence, .. }
            | PipelineEvent::FrameDropped { sequence, .. } => *sequence,
        }
    }
}

/// Observer for pipeline output. Every method defaults to a no-op.
///
/// Callbacks run with no pipeline lock held and may call back into the
/// pipeline (`feed`, `add_listener`, stats). Checksum warnings and
/// queue-full drops are delivered on the thread that called `feed`,
/// before that call returns; datasets and transform failures on the
/// runtime's worker threads. Slow callbacks delay those threads.
pub trait PipelineListener: Send + Sync + 'static {
    fn on_dataset(
        &self,
        _connection: ConnectionId,
        _sequence: u64,
        _values: &[Value],
        _timestamp: SystemTime,
    ) {
    }

    fn on_checksum_warning(&self, _connection: ConnectionId, _sequence: u64) {}

    fn on_transform_failed(&self, _connection: ConnectionId, _failure: &TransformFailure) {}

    fn on_frame_dropped(&self, _connection: ConnectionId, _sequence: u64) {}
}

fn epoch_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Fan-out to listeners and channel subscribers.
pub(crate) struct EventBus {
    listeners: RwLock<Vec<Arc<dyn PipelineListener>>>,
    subscribers: Mutex<Vec<mpsc::Sender<PipelineEvent>>>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize, listeners: Vec<Arc<dyn PipelineListener>>) -> Self {
        Self {
            listeners: RwLock::new(listeners),
            subscribers: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn PipelineListener>) {
        self.listeners.write().push(listener);
    }

    /// Snapshot, so callbacks run without the registry lock.
    fn listeners(&self) -> Vec<Arc<dyn PipelineListener>> {
        self.listeners.read().clone()
    }

    pub fn subscribe(&self) -> mpsc::Receiver<PipelineEvent> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.subscribers.lock().push(tx);
        rx
    }

    /// Drop every subscriber sender so receivers observe end-of-stream.
    pub fn close_subscribers(&self) {
        self.subscribers.lock().clear();
    }

    pub fn dataset(&self, connection: ConnectionId, dataset: &Dataset) {
        for l in self.listeners() {
            l.on_dataset(connection, dataset.sequence, &dataset.values, dataset.timestamp);
        }
        self.send(|| PipelineEvent::Dataset {
            connection,
            sequence: dataset.sequence,
            values: dataset.values.clone(),
            timestamp_ms: epoch_millis(dataset.timestamp),
            checksum_valid: dataset.checksum_valid,
        });
    }

    pub fn checksum_warning(&self, connection: ConnectionId, sequence: u64) {
        for l in self.listeners() {
            l.on_checksum_warning(connection, sequence);
        }
        self.send(|| PipelineEvent::ChecksumWarning {
            connection,
            sequence,
        });
    }

    pub fn transform_failed(&self, connection: ConnectionId, failure: &TransformFailure) {
        for l in self.listeners() {
            l.on_transform_failed(connection, failure);
        }
        self.send(|| PipelineEvent::TransformFailed {
            connection,
            sequence: failure.sequence,
            error: failure.error.to_string(),
        });
    }

    pub fn frame_dropped(&self, connection: ConnectionId, sequence: u64) {
        for l in self.listeners() {
            l.on_frame_dropped(connection, sequence);
        }
        self.send(|| PipelineEvent::FrameDropped {
            connection,
            sequence,
        });
    }

    /// Deliver to every live subscriber without waiting. A full channel
    /// loses the event; a closed one is removed.
    fn send(&self, build: impl FnOnce() -> PipelineEvent) {
        let mut subscribers = self.subscribers.lock();
        if subscribers.is_empty() {
            return;
        }

        let event = build();
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    connection = %event.connection(),
                    sequence = event.sequence(),
                    "event subscriber lagging; event lost"
                );
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        warnings: AtomicUsize,
        drops: AtomicUsize,
    }

    impl PipelineListener for Counting {
        fn on_checksum_warning(&self, _connection: ConnectionId, _sequence: u64) {
            self.warnings.fetch_add(1, Ordering::SeqCst);
        }

        fn on_frame_dropped(&self, _connection: ConnectionId, _sequence: u64) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_listener_receives_callbacks() {
        let listener = Arc::new(Counting::default());
        let bus = EventBus::new(4, vec![listener.clone()]);

        bus.checksum_warning(ConnectionId(1), 0);
        bus.frame_dropped(ConnectionId(1), 1);
        bus.checksum_warning(ConnectionId(1), 2);

        assert_eq!(listener.warnings.load(Ordering::SeqCst), 2);
        assert_eq!(listener.drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::new(4, Vec::new());
        let mut rx = bus.subscribe();

        let dataset = Dataset {
            sequence: 3,
            timestamp: UNIX_EPOCH + std::time::Duration::from_millis(1500),
            values: vec![Value::Number(2.0)],
            checksum_valid: true,
        };
        bus.dataset(ConnectionId(9), &dataset);

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            PipelineEvent::Dataset {
                connection: ConnectionId(9),
                sequence: 3,
                values: vec![Value::Number(2.0)],
                timestamp_ms: 1500,
                checksum_valid: true,
            }
        );
    }

    #[tokio::test]
    async fn test_full_and_closed_subscribers() {
        let bus = EventBus::new(1, Vec::new());
        let mut lagging = bus.subscribe();
        let closed = bus.subscribe();
        drop(closed);

        bus.frame_dropped(ConnectionId(1), 0);
        bus.frame_dropped(ConnectionId(1), 1);

        assert_eq!(bus.subscribers.lock().len(), 1);
        assert_eq!(lagging.recv().await.unwrap().sequence(), 0);

        bus.close_subscribers();
        assert!(lagging.recv().await.is_none());
    }
}
