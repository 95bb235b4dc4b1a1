//! Pool statistics and batch results.

use std::time::{Duration, SystemTime};

use serde::Serialize;

use crate::transform::{TransformFailure, Value};

/// Values produced for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    pub sequence: u64,
    pub timestamp: SystemTime,
    pub values: Vec<Value>,
    pub checksum_valid: bool,
}

/// Read-only snapshot of pool counters, rebuilt on every call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PoolStats {
    pub processed_frames: u64,
    /// Transform failures plus frames dropped before reaching a worker.
    pub dropped_or_failed_frames: u64,
    /// Worker slots in any state.
    pub active_workers: usize,
    /// Submissions currently waiting in the admission loop.
    pub queue_depth: usize,
    pub idle_workers: usize,
    pub busy_workers: usize,
    pub initializing_workers: usize,
    pub max_workers: usize,
    pub peak_workers: usize,
    pub last_error: Option<String>,
    /// Mean transform time over completed frames.
    pub average_latency: Duration,
}

/// Outcome of [`WorkerPool::submit_batch`](super::WorkerPool::submit_batch).
///
/// Successful datasets are in submission order.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub results: Vec<Dataset>,
    pub failures: Vec<TransformFailure>,
}

impl BatchOutcome {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn last_error(&self) -> Option<&TransformFailure> {
        self.failures.last()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failures.is_empty()
    }
}
