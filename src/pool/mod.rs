//! Worker pool for the CPU-bound frame transform.
//!
//! Admission runs per submit:
//! 1. an idle slot is claimed and marked busy;
//! 2. otherwise, below the ceiling, a new slot is created and warms up
//!    while the submitter backs off for `init_backoff` (15 ms);
//! 3. otherwise the submitter backs off for `busy_backoff` (5 ms) and retries.
//!
//! Transforms run on Tokio's blocking threads. Each frame's failure,
//! panic included, is isolated to that frame. A transform that overruns
//! `transform_timeout` (5 s) fails its frame and its slot is replaced.

#[allow(clippy::module_inception)]
mod pool;
mod slot;
mod stats;

pub use pool::{
    PoolConfig, SubmitHandle, WorkerPool, DEFAULT_BUSY_BACKOFF, DEFAULT_DRAIN_TIMEOUT,
    DEFAULT_INIT_BACKOFF, DEFAULT_TRANSFORM_TIMEOUT,
};
pub use stats::{BatchOutcome, Dataset, PoolStats};
