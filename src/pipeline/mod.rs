//! Multi-connection ingestion pipeline.
//!
//! Each open connection owns a ring buffer and a frame extractor. Bytes
//! fed to a connection are appended, complete frames are extracted in
//! order, and every frame is dispatched to a worker pool shared by all
//! connections. Results are published as [`PipelineEvent`]s.
//!
//! Frames waiting for a worker are bounded by `max_pending_frames`; once
//! the bound is reached new frames are dropped and reported, so a slow
//! transform can never make `feed` block or memory grow without limit.

mod builder;
mod connection;
mod coordinator;
mod events;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use builder::{PipelineBuilder, DEFAULT_CLOSE_TIMEOUT, DEFAULT_EVENT_CAPACITY};
pub use connection::ConnectionStats;
pub use coordinator::{Pipeline, PipelineStats};
pub use events::{PipelineEvent, PipelineListener};

/// Caller-chosen identifier of one byte stream (a serial port, socket...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u32);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u32> for ConnectionId {
    fn from(id: u32) -> Self {
        ConnectionId(id)
    }
}
