//! Bound on frames queued between extraction and the worker pool.
//!
//! Extraction never waits on the pool: each extracted frame is handed to
//! a dispatch task that sits in the pool's admission loop. Without a
//! bound, a producer that permanently outpaces the workers would grow
//! that set of tasks without limit. The [`BackpressureController`] caps
//! it; a frame that finds the queue full is dropped and counted.
//!
//! # Configuration
//!
//! - `max_pending`: maximum frames awaiting a worker (default: 1024)

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Default maximum pending frames per pipeline.
pub const DEFAULT_MAX_PENDING: usize = 1024;

/// Lock-free counter of frames awaiting a worker slot.
///
/// Clones share the same counter.
#[derive(Debug, Clone)]
pub struct BackpressureController {
    pending: Arc<AtomicUsize>,
    max_pending: usize,
}

impl BackpressureController {
    pub fn new(max_pending: usize) -> Self {
        Self {
            pending: Arc::new(AtomicUsize::new(0)),
            max_pending,
        }
    }

    /// Reserve one slot, or `None` when `max_pending` frames are queued.
    ///
    /// The slot is released when the returned guard drops.
    pub fn try_acquire(&self) -> Option<BackpressureGuard> {
        self.pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < self.max_pending).then_some(current + 1)
            })
            .ok()
            .map(|_| BackpressureGuard {
                controller: self.clone(),
            })
    }

    /// True while the queue is full.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.pending.load(Ordering::Acquire) >= self.max_pending
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    #[inline]
    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    #[inline]
    pub fn available_capacity(&self) -> usize {
        self.max_pending.saturating_sub(self.pending_count())
    }

    fn release(&self) {
        self.pending.fetch_sub(1, Ordering::Release);
    }
}

impl Default for BackpressureController {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PENDING)
    }
}

/// Releases its queue slot on drop.
#[derive(Debug)]
pub struct BackpressureGuard {
    controller: BackpressureController,
}

impl Drop for BackpressureGuard {
    fn drop(&mut self) {
        self.controller.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_creation() {
        let ctrl = BackpressureController::new(100);
        assert_eq!(ctrl.max_pending(), 100);
        assert_eq!(ctrl.pending_count(), 0);
        assert!(!ctrl.is_active());
    }

    #[test]
    fn test_controller_default() {
        let ctrl = BackpressureController::default();
        assert_eq!(ctrl.max_pending(), DEFAULT_MAX_PENDING);
    }

    #[test]
    fn test_acquire_until_full() {
        let ctrl = BackpressureController::new(3);
        let guards: Vec<_> = (0..3).map(|_| ctrl.try_acquire().unwrap()).collect();

        assert!(ctrl.is_active());
        assert_eq!(ctrl.available_capacity(), 0);
        assert!(ctrl.try_acquire().is_none());

        drop(guards);
        assert_eq!(ctrl.pending_count(), 0);
    }

    #[test]
    fn test_guard_release_on_drop() {
        let ctrl = BackpressureController::new(1);

        {
            let _guard = ctrl.try_acquire().unwrap();
            assert_eq!(ctrl.pending_count(), 1);
        }

        assert_eq!(ctrl.pending_count(), 0);
        assert!(ctrl.try_acquire().is_some());
    }

    #[test]
    fn test_clone_shares_state() {
        let ctrl1 = BackpressureController::new(10);
        let ctrl2 = ctrl1.clone();

        let _g = ctrl1.try_acquire().unwrap();
        assert_eq!(ctrl2.pending_count(), 1);
    }

    #[test]
    fn test_zero_capacity_rejects_everything() {
        let ctrl = BackpressureController::new(0);
        assert!(ctrl.try_acquire().is_none());
        assert!(ctrl.is_active());
    }

    #[test]
    fn test_concurrent_acquire_never_exceeds_limit() {
        let ctrl = BackpressureController::new(8);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let ctrl = ctrl.clone();
                std::thread::spawn(move || {
                    let mut held = Vec::new();
                    for _ in 0..100 {
                        if let Some(g) = ctrl.try_acquire() {
                            assert!(ctrl.pending_count() <= 8);
                            held.push(g);
                        }
                        if held.len() > 2 {
                            held.clear();
                        }
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(ctrl.pending_count(), 0);
    }
}
