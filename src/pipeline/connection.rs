//! Per-connection ingestion state.

use serde::Serialize;
use tokio::task::JoinSet;

use super::ConnectionId;
use crate::buffer::{RingBuffer, RingStats};
use crate::frame::{ExtractorStats, Frame, FrameDetectionConfig, FrameExtractor};
use crate::error::Result;

/// Snapshot of one connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionStats {
    pub id: ConnectionId,
    pub bytes_received: u64,
    pub buffer: RingStats,
    pub extractor: ExtractorStats,
    /// Frames with a failed checksum that were discarded instead of dispatched.
    pub corrupt_discarded: u64,
    /// Frames dropped because the pending queue was full.
    pub frames_dropped: u64,
    /// Dispatch tasks not yet finished.
    pub in_flight: usize,
}

/// Ring buffer, extractor and outstanding dispatch tasks for one stream.
///
/// Always accessed under the pipeline's per-connection lock, which
/// serializes append and drain.
pub(crate) struct Connection {
    pub id: ConnectionId,
    pub ring: RingBuffer,
    pub extractor: FrameExtractor,
    pub tasks: JoinSet<()>,
    pub closed: bool,
    pub bytes_received: u64,
    pub corrupt_discarded: u64,
    pub frames_dropped: u64,
}

impl Connection {
    pub fn new(id: ConnectionId, capacity: usize, config: FrameDetectionConfig) -> Result<Self> {
        config.validate_for_capacity(capacity)?;

        Ok(Self {
            id,
            ring: RingBuffer::new(capacity),
            extractor: FrameExtractor::new(config)?,
            tasks: JoinSet::new(),
            closed: false,
            bytes_received: 0,
            corrupt_discarded: 0,
            frames_dropped: 0,
        })
    }

    /// Append and extract.
    pub fn ingest(&mut self, bytes: &[u8]) -> Vec<Frame> {
        self.bytes_received += bytes.len() as u64;

        let lost = self.ring.append(bytes);
        if lost > 0 {
            tracing::debug!(
                connection = %self.id,
                lost,
                total = self.ring.overwritten_bytes(),
                "buffer overflow; oldest bytes overwritten"
            );
        }

        self.extractor.drain(&mut self.ring)
    }

    pub fn flush(&mut self) -> Vec<Frame> {
        self.extractor.flush(&mut self.ring)
    }

    /// Drop buffered bytes and scan state, e.g. after the transport reconnects.
    pub fn clear(&mut self) {
        self.ring.clear();
        self.extractor.reset();
    }

    /// Collect finished dispatch tasks without waiting.
    pub fn reap(&mut self) {
        while let Some(joined) = self.tasks.try_join_next() {
            if let Err(e) = joined {
                if e.is_panic() {
                    tracing::error!(connection = %self.id, error = %e, "dispatch task panicked");
                }
            }
        }
    }

    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            id: self.id,
            bytes_received: self.bytes_received,
            buffer: self.ring.stats(),
            extractor: self.extractor.stats(),
            corrupt_discarded: self.corrupt_discarded,
            frames_dropped: self.frames_dropped,
            in_flight: self.tasks.len(),
        }
    }
}
