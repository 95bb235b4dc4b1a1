//! Frame detection and extraction.
//!
//! - [`FrameDetectionConfig`] - delimiter policy, checksum and presets
//! - [`FrameExtractor`] - drains complete frames out of a [`RingBuffer`](crate::buffer::RingBuffer)
//! - [`Frame`] - one extracted payload with its sequence number
//! - [`parse_escaped`] - delimiter text such as `"\r\n"` to bytes

mod config;
mod extractor;
#[allow(clippy::module_inception)]
mod frame;
mod sequence;

pub use config::{FrameDetection, FrameDetectionConfig};
pub use extractor::{ExtractorStats, FrameExtractor};
pub use frame::Frame;
pub use sequence::parse_escaped;
