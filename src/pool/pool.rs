//! Bounded worker pool with polling admission.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::{AbortHandle, JoinError, JoinHandle};

use super::slot::{Admission, SlotState, SlotTable};
use super::stats::{BatchOutcome, Dataset, PoolStats};
use crate::error::{FramewireError, Result};
use crate::frame::Frame;
use crate::transform::{Transform, TransformError, TransformFailure};

/// Backoff after creating a slot, giving it time to warm up.
pub const DEFAULT_INIT_BACKOFF: Duration = Duration::from_millis(15);

/// Backoff while the pool is full.
pub const DEFAULT_BUSY_BACKOFF: Duration = Duration::from_millis(5);

/// How long [`WorkerPool::destroy`] waits for in-flight work.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// How long one transform invocation may run before its slot is replaced.
pub const DEFAULT_TRANSFORM_TIMEOUT: Duration = Duration::from_secs(5);

/// Pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Ceiling on worker slots (default: available parallelism, 2..=8).
    pub max_workers: usize,
    pub init_backoff: Duration,
    pub busy_backoff: Duration,
    pub drain_timeout: Duration,
    pub transform_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2);

        Self {
            max_workers: parallelism.clamp(2, 8),
            init_backoff: DEFAULT_INIT_BACKOFF,
            busy_backoff: DEFAULT_BUSY_BACKOFF,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            transform_timeout: DEFAULT_TRANSFORM_TIMEOUT,
        }
    }
}

impl PoolConfig {
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_backoff(mut self, init: Duration, busy: Duration) -> Self {
        self.init_backoff = init;
        self.busy_backoff = busy;
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn with_transform_timeout(mut self, timeout: Duration) -> Self {
        self.transform_timeout = timeout;
        self
    }
}

struct PoolInner {
    transform: Arc<dyn Transform>,
    slots: Mutex<SlotTable>,
    /// Abort handles of running transforms, keyed by slot.
    running: Mutex<HashMap<usize, AbortHandle>>,
    max_workers: AtomicUsize,
    config: PoolConfig,
    destroyed: AtomicBool,
    processed: AtomicU64,
    failed: AtomicU64,
    queue_depth: AtomicUsize,
    latency_total_ns: AtomicU64,
    latency_samples: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl PoolInner {
    fn record_latency(&self, elapsed: Duration) {
        self.latency_total_ns
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
    }

    fn record_error(&self, message: String) {
        *self.last_error.lock() = Some(message);
    }

    /// Return a slot after its work finished.
    fn release_slot(&self, id: usize) {
        self.running.lock().remove(&id);

        let max = self.max_workers.load(Ordering::Acquire);
        let retire = {
            let mut slots = self.slots.lock();
            if !self.destroyed.load(Ordering::Acquire) && slots.len() > max {
                slots.remove(id)
            } else {
                slots.set_state(id, SlotState::Idle);
                false
            }
        };

        if retire {
            tracing::debug!(slot = id, max_workers = max, "retiring worker above ceiling");
            self.shut_down_detached(id);
        }
    }

    /// Take a slot whose transform overran its timeout out of rotation.
    ///
    /// A blocking thread cannot be interrupted, so the slot is shut down
    /// only once `blocking` returns. Admission may create a replacement
    /// immediately.
    fn retire_stuck<T: Send + 'static>(self: &Arc<Self>, slot: usize, blocking: JoinHandle<T>) {
        let removed = self.slots.lock().remove(slot);
        tracing::warn!(
            slot,
            timeout = ?self.config.transform_timeout,
            "transform timed out; replacing worker"
        );

        let inner = self.clone();
        tokio::spawn(async move {
            let _ = blocking.await;
            if removed {
                inner.shut_down_detached(slot);
            }
        });
    }

    /// Run `shut_down` for a slot without waiting on it.
    fn shut_down_detached(&self, id: usize) {
        let transform = self.transform.clone();
        let run = move || {
            if let Err(e) = transform.shut_down(id) {
                tracing::error!(slot = id, error = %e, "worker shut down failed");
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(run);
            }
            Err(_) => run(),
        }
    }
}

/// Decrements the admission queue depth when the waiting submit ends,
/// including when its future is dropped.
struct QueuedSubmit<'a>(&'a AtomicUsize);

impl<'a> QueuedSubmit<'a> {
    fn enter(depth: &'a AtomicUsize) -> Self {
        depth.fetch_add(1, Ordering::AcqRel);
        Self(depth)
    }
}

impl Drop for QueuedSubmit<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Marks the slot idle again once the transform task finishes or is aborted.
struct SlotLease {
    inner: Arc<PoolInner>,
    slot: usize,
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        self.inner.release_slot(self.slot);
    }
}

/// Completion of one submitted frame.
///
/// Await it for the dataset or the isolated per-frame failure.
#[derive(Debug)]
pub struct SubmitHandle {
    sequence: u64,
    handle: JoinHandle<std::result::Result<Dataset, TransformFailure>>,
}

impl SubmitHandle {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Future for SubmitHandle {
    type Output = std::result::Result<Dataset, TransformFailure>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let sequence = self.sequence;
        Pin::new(&mut self.handle).poll(cx).map(|joined| match joined {
            Ok(result) => result,
            Err(e) => Err(TransformFailure {
                sequence,
                error: join_error(e),
            }),
        })
    }
}

fn join_error(err: JoinError) -> TransformError {
    if err.is_cancelled() {
        return TransformError::Cancelled;
    }

    match err.try_into_panic() {
        Ok(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            TransformError::Panicked(message)
        }
        Err(e) => TransformError::Panicked(e.to_string()),
    }
}

/// Bounded set of workers running a [`Transform`] over frames.
///
/// Cheap to clone; clones share the same slots and counters.
///
/// # Example
///
/// ```
/// use framewire::frame::Frame;
/// use framewire::pool::{PoolConfig, WorkerPool};
/// use framewire::transform::{SplitTransform, Value};
/// use bytes::Bytes;
///
/// # #[tokio::main]
/// # async fn main() -> framewire::Result<()> {
/// let pool = WorkerPool::new(SplitTransform::csv(), PoolConfig::default().with_max_workers(2));
///
/// let handle = pool.submit(Frame::new(Bytes::from_static(b"1,2"), 0, true)).await?;
/// let dataset = handle.await?;
/// assert_eq!(dataset.values, vec![Value::Number(1.0), Value::Number(2.0)]);
///
/// pool.destroy().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    pub fn new<T: Transform>(transform: T, config: PoolConfig) -> Self {
        Self::from_arc(Arc::new(transform), config)
    }

    /// Build from a shared transform.
    pub fn from_arc(transform: Arc<dyn Transform>, config: PoolConfig) -> Self {
        let max_workers = config.max_workers.max(1);

        Self {
            inner: Arc::new(PoolInner {
                transform,
                slots: Mutex::new(SlotTable::default()),
                running: Mutex::new(HashMap::new()),
                max_workers: AtomicUsize::new(max_workers),
                config,
                destroyed: AtomicBool::new(false),
                processed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                queue_depth: AtomicUsize::new(0),
                latency_total_ns: AtomicU64::new(0),
                latency_samples: AtomicU64::new(0),
                last_error: Mutex::new(None),
            }),
        }
    }

    /// Admit `frame` to a worker slot and start its transform.
    ///
    /// Waits (with a fixed polling backoff) while the pool is full. The
    /// returned handle resolves when the transform finishes. Fails only
    /// with [`FramewireError::PoolDestroyed`].
    pub async fn submit(&self, frame: Frame) -> Result<SubmitHandle> {
        let slot = {
            let _queued = QueuedSubmit::enter(&self.inner.queue_depth);
            self.admit().await?
        };

        Ok(self.dispatch(slot, frame))
    }

    /// Submit frames one after another, then collect every result.
    ///
    /// A failing frame is recorded and the batch continues; nothing
    /// escapes as an error.
    pub async fn submit_batch(&self, frames: Vec<Frame>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let mut handles = Vec::with_capacity(frames.len());

        for frame in frames {
            let sequence = frame.sequence;
            match self.submit(frame).await {
                Ok(handle) => handles.push(handle),
                Err(_) => outcome.failures.push(TransformFailure {
                    sequence,
                    error: TransformError::Cancelled,
                }),
            }
        }

        for handle in handles {
            match handle.await {
                Ok(dataset) => outcome.results.push(dataset),
                Err(failure) => outcome.failures.push(failure),
            }
        }

        outcome
    }

    pub fn stats(&self) -> PoolStats {
        let inner = &self.inner;
        let (active, idle, busy, initializing, peak) = {
            let slots = inner.slots.lock();
            (
                slots.len(),
                slots.count(SlotState::Idle),
                slots.count(SlotState::Busy),
                slots.count(SlotState::Initializing),
                slots.peak(),
            )
        };

        let samples = inner.latency_samples.load(Ordering::Relaxed);
        let average_latency = if samples == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(inner.latency_total_ns.load(Ordering::Relaxed) / samples)
        };

        PoolStats {
            processed_frames: inner.processed.load(Ordering::Relaxed),
            dropped_or_failed_frames: inner.failed.load(Ordering::Relaxed),
            active_workers: active,
            queue_depth: inner.queue_depth.load(Ordering::Acquire),
            idle_workers: idle,
            busy_workers: busy,
            initializing_workers: initializing,
            max_workers: inner.max_workers.load(Ordering::Acquire),
            peak_workers: peak,
            last_error: inner.last_error.lock().clone(),
            average_latency,
        }
    }

    /// Change the worker ceiling.
    ///
    /// Shrinking never interrupts running work: idle slots above the new
    /// ceiling retire now, busy ones when they finish.
    pub fn resize(&self, max_workers: usize) {
        let max_workers = max_workers.max(1);
        self.inner.max_workers.store(max_workers, Ordering::Release);

        let retired = self.inner.slots.lock().trim_idle(max_workers);
        for id in &retired {
            self.inner.shut_down_detached(*id);
        }

        tracing::debug!(max_workers, retired = retired.len(), "worker pool resized");
    }

    pub fn max_workers(&self) -> usize {
        self.inner.max_workers.load(Ordering::Acquire)
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    /// Drain in-flight work (bounded by the drain timeout), then shut down
    /// every slot. Teardown failures are logged, never returned.
    ///
    /// Aborting after the timeout cancels the waiting submit handles, but a
    /// transform already running on a blocking thread keeps running to
    /// completion. Slots still busy or initializing at that point are
    /// dropped without `shut_down`, so it never races a running transform.
    pub async fn destroy(&self) {
        let inner = &self.inner;
        if inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }

        let deadline = Instant::now() + inner.config.drain_timeout;
        let mut abandoned = Vec::new();
        loop {
            let in_flight = {
                let slots = inner.slots.lock();
                slots.count(SlotState::Busy) + slots.count(SlotState::Initializing)
            };
            if in_flight == 0 {
                break;
            }
            if Instant::now() >= deadline {
                // Out of the table before the aborted leases can mark them idle.
                abandoned = inner.slots.lock().take_unfinished();
                let aborted: Vec<_> = inner.running.lock().drain().collect();
                tracing::warn!(
                    in_flight,
                    aborted = aborted.len(),
                    "drain timeout reached; cancelling remaining work"
                );
                for (_, handle) in aborted {
                    handle.abort();
                }
                break;
            }
            tokio::time::sleep(inner.config.busy_backoff).await;
        }

        if !abandoned.is_empty() {
            tracing::warn!(
                slots = ?abandoned,
                "workers still running after drain timeout; skipping their shut down"
            );
        }

        let ids = inner.slots.lock().drain_ids();
        let count = ids.len();
        for id in ids {
            let transform = inner.transform.clone();
            match tokio::task::spawn_blocking(move || transform.shut_down(id)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(slot = id, error = %e, "worker shut down failed"),
                Err(e) => tracing::error!(slot = id, error = %e, "worker shut down panicked"),
            }
        }

        tracing::debug!(workers = count, "worker pool destroyed");
    }

    /// Count a frame that never reached a worker.
    pub(crate) fn record_dropped(&self) {
        self.inner.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Run the admission algorithm until a slot is assigned.
    async fn admit(&self) -> Result<usize> {
        let inner = &self.inner;

        loop {
            if inner.destroyed.load(Ordering::Acquire) {
                return Err(FramewireError::PoolDestroyed);
            }

            let max = inner.max_workers.load(Ordering::Acquire);
            let admission = inner.slots.lock().admit(max);

            match admission {
                Admission::Assigned(slot) => return Ok(slot),
                Admission::Spawned(slot) => {
                    tracing::debug!(slot, max_workers = max, "starting worker");
                    self.warm_up(slot);
                    tokio::time::sleep(inner.config.init_backoff).await;
                }
                Admission::Full => tokio::time::sleep(inner.config.busy_backoff).await,
            }
        }
    }

    /// Initialize a new slot in the background. A slot whose warm-up fails
    /// is removed.
    fn warm_up(&self, slot: usize) {
        let inner = self.inner.clone();

        tokio::spawn(async move {
            let transform = inner.transform.clone();
            let outcome = tokio::task::spawn_blocking(move || transform.warm_up(slot))
                .await
                .map_err(join_error)
                .and_then(|r| r);

            match outcome {
                Ok(()) => {
                    let max = inner.max_workers.load(Ordering::Acquire);
                    let retire = {
                        let mut slots = inner.slots.lock();
                        if slots.len() > max && !inner.destroyed.load(Ordering::Acquire) {
                            slots.remove(slot)
                        } else {
                            slots.set_state(slot, SlotState::Idle);
                            false
                        }
                    };
                    if retire {
                        inner.shut_down_detached(slot);
                    }
                }
                Err(e) => {
                    tracing::warn!(slot, error = %e, "worker warm-up failed; removing slot");
                    inner.slots.lock().remove(slot);
                    inner.record_error(format!("worker {slot} warm-up failed: {e}"));
                }
            }
        });
    }

    /// Run the transform for `frame` on the already-busy `slot`.
    fn dispatch(&self, slot: usize, frame: Frame) -> SubmitHandle {
        let sequence = frame.sequence;
        let lease = SlotLease {
            inner: self.inner.clone(),
            slot,
        };
        let inner = self.inner.clone();

        // Hold the running-map lock across spawn so the lease cannot remove
        // the entry before it is inserted.
        let mut running = self.inner.running.lock();
        let handle = tokio::spawn(async move {
            let _lease = lease;
            let started = Instant::now();
            let transform = inner.transform.clone();
            let payload = frame.payload.clone();

            let timeout = inner.config.transform_timeout;
            let mut blocking = tokio::task::spawn_blocking(move || transform.run(&payload));
            let result = match tokio::time::timeout(timeout, &mut blocking).await {
                Ok(joined) => joined.map_err(join_error).and_then(|r| r),
                Err(_) => {
                    inner.retire_stuck(slot, blocking);
                    Err(TransformError::TimedOut(timeout))
                }
            };
            inner.record_latency(started.elapsed());

            match result {
                Ok(values) => {
                    inner.processed.fetch_add(1, Ordering::Relaxed);
                    Ok(Dataset {
                        sequence,
                        timestamp: frame.timestamp,
                        values,
                        checksum_valid: frame.checksum_valid,
                    })
                }
                Err(error) => {
                    inner.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(sequence, slot, error = %error, "transform failed");
                    let failure = TransformFailure { sequence, error };
                    inner.record_error(failure.to_string());
                    Err(failure)
                }
            }
        });
        running.insert(slot, handle.abort_handle());
        drop(running);

        SubmitHandle { sequence, handle }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("max_workers", &self.max_workers())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
