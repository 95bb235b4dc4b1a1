//! Pipeline coordinator: connections in, datasets out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use super::builder::PipelineBuilder;
use super::connection::{Connection, ConnectionStats};
use super::events::{EventBus, PipelineEvent, PipelineListener};
use super::ConnectionId;
use crate::backpressure::{BackpressureController, BackpressureGuard};
use crate::error::{FramewireError, Result};
use crate::frame::{Frame, FrameDetectionConfig};
use crate::pool::{PoolStats, WorkerPool};
use crate::transform::Transform;

/// Snapshot of the whole pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineStats {
    pub connections: Vec<ConnectionStats>,
    pub pool: PoolStats,
    /// Frames extracted but not yet admitted to a worker.
    pub pending_frames: usize,
}

/// Synchronous event decided while routing a frame.
enum Notice {
    ChecksumWarning(u64),
    FrameDropped(u64),
}

/// Outcome of routing one batch of extracted frames.
struct Routed {
    extracted: usize,
    notices: Vec<Notice>,
    jobs: Vec<(Frame, BackpressureGuard)>,
}

struct PipelineInner {
    connections: RwLock<HashMap<ConnectionId, Arc<Mutex<Connection>>>>,
    pool: WorkerPool,
    backpressure: BackpressureController,
    events: EventBus,
    detection: FrameDetectionConfig,
    buffer_capacity: usize,
    discard_corrupt_frames: bool,
    close_timeout: Duration,
    runtime: Handle,
    shut_down: AtomicBool,
}

/// Owns one ring buffer and extractor per connection and feeds extracted
/// frames to a shared worker pool.
///
/// `feed` is synchronous and never waits on workers: frames are handed to
/// dispatch tasks on the pipeline's runtime. It may be called from any
/// thread, including a blocking transport reader.
///
/// # Example
///
/// ```
/// use framewire::pipeline::{ConnectionId, Pipeline, PipelineEvent};
/// use framewire::frame::FrameDetectionConfig;
///
/// # #[tokio::main]
/// # async fn main() -> framewire::Result<()> {
/// let pipeline = Pipeline::builder()
///     .detection(FrameDetectionConfig::end_delimited("\n"))
///     .build()?;
/// let mut events = pipeline.subscribe();
///
/// let port = ConnectionId(1);
/// pipeline.open(port)?;
/// pipeline.feed(port, b"1,2,3\n")?;
///
/// match events.recv().await {
///     Some(PipelineEvent::Dataset { values, .. }) => assert_eq!(values.len(), 3),
///     other => panic!("unexpected event: {other:?}"),
/// }
///
/// pipeline.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<PipelineInner>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub(super) fn from_parts(
        builder: PipelineBuilder,
        transform: Arc<dyn Transform>,
        runtime: Handle,
    ) -> Self {
        let pool = WorkerPool::from_arc(transform, builder.pool);

        Self {
            inner: Arc::new(PipelineInner {
                connections: RwLock::new(HashMap::new()),
                pool,
                backpressure: BackpressureController::new(builder.max_pending_frames),
                events: EventBus::new(builder.event_capacity, builder.listeners),
                detection: builder.detection,
                buffer_capacity: builder.buffer_capacity,
                discard_corrupt_frames: builder.discard_corrupt_frames,
                close_timeout: builder.close_timeout,
                runtime,
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Open a connection with the pipeline's default detection config.
    pub fn open(&self, id: ConnectionId) -> Result<()> {
        self.open_with(id, self.inner.detection.clone())
    }

    /// Open a connection with its own detection config.
    pub fn open_with(&self, id: ConnectionId, config: FrameDetectionConfig) -> Result<()> {
        if self.inner.shut_down.load(Ordering::Acquire) {
            return Err(FramewireError::PoolDestroyed);
        }

        let connection = Connection::new(id, self.inner.buffer_capacity, config)?;

        let mut connections = self.inner.connections.write();
        if connections.contains_key(&id) {
            return Err(FramewireError::ConnectionExists(id));
        }
        connections.insert(id, Arc::new(Mutex::new(connection)));
        drop(connections);

        tracing::debug!(connection = %id, capacity = self.inner.buffer_capacity, "connection opened");
        Ok(())
    }

    /// Append bytes to a connection and dispatch every complete frame.
    ///
    /// Returns the number of frames extracted by this call.
    pub fn feed(&self, id: ConnectionId, bytes: &[u8]) -> Result<usize> {
        let routed = self.with_open(id, |conn| {
            let frames = conn.ingest(bytes);
            Ok(self.route(conn, frames))
        })?;
        Ok(self.deliver(id, routed))
    }

    /// Emit any trailing frame that does not need more input.
    pub fn flush(&self, id: ConnectionId) -> Result<usize> {
        let routed = self.with_open(id, |conn| {
            let frames = conn.flush();
            Ok(self.route(conn, frames))
        })?;
        Ok(self.deliver(id, routed))
    }

    /// Replace a connection's detection config. Invalid configs are
    /// rejected and the current one kept.
    pub fn configure(&self, id: ConnectionId, config: FrameDetectionConfig) -> Result<()> {
        self.with_open(id, |conn| {
            config.validate_for_capacity(conn.ring.capacity())?;
            conn.extractor.set_config(config)?;
            tracing::debug!(connection = %id, mode = ?conn.extractor.config().mode, "detection reconfigured");
            Ok(())
        })
    }

    /// Discard buffered bytes and scan state, keeping in-flight frames.
    pub fn reset(&self, id: ConnectionId) -> Result<()> {
        self.with_open(id, |conn| {
            conn.clear();
            Ok(())
        })
    }

    /// Close a connection: stop accepting bytes, drop buffered data and
    /// wait (bounded by the close timeout) for its in-flight frames.
    pub async fn close(&self, id: ConnectionId) -> Result<()> {
        let connection = self
            .inner
            .connections
            .write()
            .remove(&id)
            .ok_or(FramewireError::UnknownConnection(id))?;

        let tasks = {
            let mut conn = connection.lock();
            conn.closed = true;
            conn.ring.clear();
            std::mem::take(&mut conn.tasks)
        };

        self.drain_tasks(id, tasks).await;
        tracing::debug!(connection = %id, "connection closed");
        Ok(())
    }

    /// Close every connection and destroy the worker pool.
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        let ids: Vec<_> = self.inner.connections.read().keys().copied().collect();
        for id in ids {
            // Already removed by a concurrent close.
            let _ = self.close(id).await;
        }

        self.inner.pool.destroy().await;
        self.inner.events.close_subscribers();
        tracing::debug!("pipeline shut down");
    }

    /// Receive events on a bounded channel. Events are lost, with a
    /// warning, while the receiver lags.
    pub fn subscribe(&self) -> mpsc::Receiver<PipelineEvent> {
        self.inner.events.subscribe()
    }

    pub fn add_listener(&self, listener: Arc<dyn PipelineListener>) {
        self.inner.events.add_listener(listener);
    }

    /// Change the worker ceiling of the shared pool.
    pub fn set_max_workers(&self, max_workers: usize) {
        self.inner.pool.resize(max_workers);
    }

    pub fn connection_stats(&self, id: ConnectionId) -> Result<ConnectionStats> {
        let conn = self.connection(id)?;
        let stats = conn.lock().stats();
        Ok(stats)
    }

    pub fn stats(&self) -> PipelineStats {
        let connections: Vec<_> = self.inner.connections.read().values().cloned().collect();
        let mut connections: Vec<_> = connections.iter().map(|c| c.lock().stats()).collect();
        connections.sort_by_key(|s| s.id);

        PipelineStats {
            connections,
            pool: self.inner.pool.stats(),
            pending_frames: self.inner.backpressure.pending_count(),
        }
    }

    pub fn connections(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self.inner.connections.read().keys().copied().collect();
        ids.sort();
        ids
    }

    fn connection(&self, id: ConnectionId) -> Result<Arc<Mutex<Connection>>> {
        self.inner
            .connections
            .read()
            .get(&id)
            .cloned()
            .ok_or(FramewireError::UnknownConnection(id))
    }

    /// Run `f` under the connection lock, rejecting closed connections.
    fn with_open<T>(
        &self,
        id: ConnectionId,
        f: impl FnOnce(&mut Connection) -> Result<T>,
    ) -> Result<T> {
        let connection = self.connection(id)?;
        let mut conn = connection.lock();
        if conn.closed {
            return Err(FramewireError::UnknownConnection(id));
        }
        conn.reap();
        f(&mut *conn)
    }

    /// Decide each frame's fate under the connection lock. Nothing is
    /// published or spawned here.
    fn route(&self, conn: &mut Connection, frames: Vec<Frame>) -> Routed {
        let inner = &self.inner;
        let mut routed = Routed {
            extracted: frames.len(),
            notices: Vec::new(),
            jobs: Vec::new(),
        };

        for frame in frames {
            let sequence = frame.sequence;

            if !frame.checksum_valid {
                routed.notices.push(Notice::ChecksumWarning(sequence));
                if inner.discard_corrupt_frames {
                    conn.corrupt_discarded += 1;
                    continue;
                }
            }

            let Some(slot) = inner.backpressure.try_acquire() else {
                conn.frames_dropped += 1;
                inner.pool.record_dropped();
                tracing::warn!(
                    connection = %conn.id,
                    sequence,
                    pending = inner.backpressure.pending_count(),
                    "pending frame queue full; frame dropped"
                );
                routed.notices.push(Notice::FrameDropped(sequence));
                continue;
            };

            routed.jobs.push((frame, slot));
        }

        routed
    }

    /// Publish notices with no lock held, then start the dispatch tasks.
    /// Returns how many frames were extracted.
    fn deliver(&self, id: ConnectionId, routed: Routed) -> usize {
        let Routed {
            extracted,
            notices,
            jobs,
        } = routed;

        for notice in notices {
            match notice {
                Notice::ChecksumWarning(sequence) => {
                    self.inner.events.checksum_warning(id, sequence)
                }
                Notice::FrameDropped(sequence) => self.inner.events.frame_dropped(id, sequence),
            }
        }
        if jobs.is_empty() {
            return extracted;
        }

        let unstarted = match self.connection(id) {
            Ok(connection) => {
                let mut conn = connection.lock();
                if conn.closed {
                    jobs
                } else {
                    for (frame, slot) in jobs {
                        self.spawn_dispatch(&mut conn.tasks, id, frame, slot);
                    }
                    Vec::new()
                }
            }
            Err(_) => jobs,
        };

        // Closed between routing and spawning.
        for (frame, _slot) in unstarted {
            self.inner.pool.record_dropped();
            self.inner.events.frame_dropped(id, frame.sequence);
        }

        extracted
    }

    fn spawn_dispatch(
        &self,
        tasks: &mut JoinSet<()>,
        id: ConnectionId,
        frame: Frame,
        slot: BackpressureGuard,
    ) {
        let inner = self.inner.clone();
        let sequence = frame.sequence;

        tasks.spawn_on(
            async move {
                let handle = match inner.pool.submit(frame).await {
                    Ok(handle) => handle,
                    Err(e) => {
                        tracing::debug!(connection = %id, sequence, error = %e, "frame not admitted");
                        inner.events.frame_dropped(id, sequence);
                        return;
                    }
                };
                // Admitted: no longer pending.
                drop(slot);

                match handle.await {
                    Ok(dataset) => inner.events.dataset(id, &dataset),
                    Err(failure) => inner.events.transform_failed(id, &failure),
                }
            },
            &self.inner.runtime,
        );
    }

    async fn drain_tasks(&self, id: ConnectionId, mut tasks: JoinSet<()>) {
        if tasks.is_empty() {
            return;
        }

        let pending = tasks.len();
        let drained = tokio::time::timeout(self.inner.close_timeout, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                connection = %id,
                pending,
                remaining = tasks.len(),
                "close timeout reached; cancelling in-flight frames"
            );
            tasks.shutdown().await;
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("connections", &self.connections())
            .field("pool", &self.inner.pool)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::{self, ChecksumAlgorithm};
    use crate::pool::PoolConfig;
    use crate::transform::{from_fn, TransformError, Value};

    fn fast_pool() -> PoolConfig {
        PoolConfig::default()
            .with_max_workers(2)
            .with_backoff(Duration::from_millis(1), Duration::from_millis(1))
    }

    async fn next_event(rx: &mut mpsc::Receiver<PipelineEvent>) -> PipelineEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn test_feed_produces_datasets() {
        let pipeline = Pipeline::builder()
            .detection(FrameDetectionConfig::end_delimited(";"))
            .pool_config(fast_pool())
            .build()
            .unwrap();
        let mut rx = pipeline.subscribe();

        pipeline.open(ConnectionId(1)).unwrap();
        assert_eq!(pipeline.feed(ConnectionId(1), b"1,2;3,4;5").unwrap(), 2);

        let mut sequences = Vec::new();
        for _ in 0..2 {
            match next_event(&mut rx).await {
                PipelineEvent::Dataset { sequence, values, .. } => {
                    assert_eq!(values.len(), 2);
                    sequences.push(sequence);
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        sequences.sort();
        assert_eq!(sequences, vec![0, 1]);

        let stats = pipeline.connection_stats(ConnectionId(1)).unwrap();
        assert_eq!(stats.bytes_received, 9);
        assert_eq!(stats.buffer.size, 1);

        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn test_open_close_errors() {
        let pipeline = Pipeline::builder().pool_config(fast_pool()).build().unwrap();
        let id = ConnectionId(7);

        assert!(matches!(
            pipeline.feed(id, b"x"),
            Err(FramewireError::UnknownConnection(_))
        ));

        pipeline.open(id).unwrap();
        assert!(matches!(pipeline.open(id), Err(FramewireError::ConnectionExists(_))));
        assert_eq!(pipeline.connections(), vec![id]);

        pipeline.close(id).await.unwrap();
        assert!(pipeline.close(id).await.is_err());
        assert!(pipeline.feed(id, b"x").is_err());

        pipeline.shutdown().await;
        assert!(matches!(pipeline.open(id), Err(FramewireError::PoolDestroyed)));
    }

    #[tokio::test]
    async fn test_checksum_warning_and_discard() {
        let pipeline = Pipeline::builder()
            .detection(FrameDetectionConfig::end_delimited("\n").with_checksum(ChecksumAlgorithm::Sum))
            .discard_corrupt_frames(true)
            .pool_config(fast_pool())
            .build()
            .unwrap();
        let mut rx = pipeline.subscribe();
        let id = ConnectionId(1);
        pipeline.open(id).unwrap();

        let mut corrupt = b"5".to_vec();
        corrupt.push(checksum::sum8(b"5").wrapping_add(1));
        corrupt.push(b'\n');
        let mut good = b"6".to_vec();
        good.push(checksum::sum8(b"6"));
        good.push(b'\n');

        pipeline.feed(id, &corrupt).unwrap();
        pipeline.feed(id, &good).unwrap();

        assert_eq!(
            next_event(&mut rx).await,
            PipelineEvent::ChecksumWarning { connection: id, sequence: 0 }
        );
        match next_event(&mut rx).await {
            PipelineEvent::Dataset { sequence, values, .. } => {
                assert_eq!(sequence, 1);
                assert_eq!(values, vec![Value::Number(6.0)]);
            }
            other => panic!("unexpected {other:?}"),
        }

        assert_eq!(pipeline.connection_stats(id).unwrap().corrupt_discarded, 1);
        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn test_transform_failure_event() {
        let transform = from_fn(|_: &[u8]| Err(TransformError::failed("no parser")));
        let pipeline = Pipeline::builder()
            .transform(transform)
            .detection(FrameDetectionConfig::end_delimited(";"))
            .pool_config(fast_pool())
            .build()
            .unwrap();
        let mut rx = pipeline.subscribe();
        pipeline.open(ConnectionId(2)).unwrap();

        pipeline.feed(ConnectionId(2), b"x;").unwrap();

        assert_eq!(
            next_event(&mut rx).await,
            PipelineEvent::TransformFailed {
                connection: ConnectionId(2),
                sequence: 0,
                error: "no parser".into(),
            }
        );
        assert_eq!(pipeline.stats().pool.dropped_or_failed_frames, 1);
        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn test_pending_queue_overflow_drops_frames() {
        let transform = from_fn(|_: &[u8]| {
            std::thread::sleep(Duration::from_millis(50));
            Ok(vec![])
        });
        let pipeline = Pipeline::builder()
            .transform(transform)
            .detection(FrameDetectionConfig::end_delimited(";"))
            .pool_config(fast_pool().with_max_workers(1))
            .max_pending_frames(2)
            .build()
            .unwrap();
        let id = ConnectionId(1);
        pipeline.open(id).unwrap();

        assert_eq!(pipeline.feed(id, b"a;b;c;d;e;").unwrap(), 5);

        let stats = pipeline.connection_stats(id).unwrap();
        assert_eq!(stats.frames_dropped, 3);
        assert_eq!(pipeline.stats().pool.dropped_or_failed_frames, 3);

        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn test_configure_and_flush() {
        let pipeline = Pipeline::builder()
            .detection(FrameDetectionConfig::end_delimited(";"))
            .pool_config(fast_pool())
            .build()
            .unwrap();
        let mut rx = pipeline.subscribe();
        let id = ConnectionId(3);
        pipeline.open(id).unwrap();

        assert!(pipeline
            .configure(id, FrameDetectionConfig::end_delimited(""))
            .is_err());
        assert!(matches!(
            pipeline.configure(id, FrameDetectionConfig::no_delimiters().with_flush_size(1 << 20)),
            Err(FramewireError::InvalidDetectionConfig(_))
        ));
        pipeline
            .configure(id, FrameDetectionConfig::no_delimiters().with_flush_size(64))
            .unwrap();

        assert_eq!(pipeline.feed(id, b"7,8").unwrap(), 0);
        assert_eq!(pipeline.flush(id).unwrap(), 1);

        match next_event(&mut rx).await {
            PipelineEvent::Dataset { values, .. } => {
                assert_eq!(values, vec![Value::Number(7.0), Value::Number(8.0)]);
            }
            other => panic!("unexpected {other:?}"),
        }
        pipeline.shutdown().await;
    }

    /// Calls back into the pipeline from a synchronous callback.
    #[derive(Default)]
    struct Reentrant {
        pipeline: std::sync::OnceLock<Pipeline>,
        extracted: Mutex<Vec<usize>>,
    }

    struct Noop;
    impl PipelineListener for Noop {}

    impl PipelineListener for Reentrant {
        fn on_checksum_warning(&self, connection: ConnectionId, _sequence: u64) {
            let Some(pipeline) = self.pipeline.get() else {
                return;
            };
            let stats = pipeline.connection_stats(connection).unwrap();
            pipeline.add_listener(Arc::new(Noop));
            let n = pipeline.feed(ConnectionId(2), b"7;").unwrap();
            self.extracted.lock().push(stats.extractor.frames as usize + n);
        }
    }

    #[tokio::test]
    async fn test_listener_may_call_back_into_pipeline() {
        let listener = Arc::new(Reentrant::default());
        let pipeline = Pipeline::builder()
            .detection(FrameDetectionConfig::end_delimited(";"))
            .listener_arc(listener.clone())
            .pool_config(fast_pool())
            .build()
            .unwrap();
        let _ = listener.pipeline.set(pipeline.clone());
        let mut rx = pipeline.subscribe();

        pipeline
            .open_with(
                ConnectionId(1),
                FrameDetectionConfig::end_delimited(";").with_checksum(ChecksumAlgorithm::Sum),
            )
            .unwrap();
        pipeline.open(ConnectionId(2)).unwrap();

        let mut corrupt = b"5".to_vec();
        corrupt.push(checksum::sum8(b"5").wrapping_add(1));
        corrupt.push(b';');
        assert_eq!(pipeline.feed(ConnectionId(1), &corrupt).unwrap(), 1);

        // One frame seen on connection 1, one extracted on connection 2.
        assert_eq!(*listener.extracted.lock(), vec![2]);
        assert_eq!(
            next_event(&mut rx).await,
            PipelineEvent::ChecksumWarning { connection: ConnectionId(1), sequence: 0 }
        );

        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_closes_subscriptions() {
        let pipeline = Pipeline::builder().pool_config(fast_pool()).build().unwrap();
        let mut rx = pipeline.subscribe();
        pipeline.open(ConnectionId(1)).unwrap();
        pipeline.open(ConnectionId(2)).unwrap();

        pipeline.shutdown().await;

        assert!(pipeline.connections().is_empty());
        assert!(rx.recv().await.is_none());
        // Idempotent.
        pipeline.shutdown().await;
    }
}
