//! Byte buffering for incoming streams.
//!
//! - [`RingBuffer`] - fixed-capacity circular store with lossy overflow
//! - [`KmpMatcher`] - delimiter search used by the ring and the extractor

mod ring;
mod search;

pub use ring::{RingBuffer, RingStats, DEFAULT_CAPACITY};
pub use search::{failure_table, KmpMatcher};
