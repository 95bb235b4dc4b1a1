//! Extracted frame.
//!
//! Uses `bytes::Bytes` so a payload can be handed to a worker without
//! copying.
//!
//! # Example
//!
//! ```
//! use framewire::frame::Frame;
//! use bytes::Bytes;
//!
//! let frame = Frame::new(Bytes::from_static(b"1,2,3"), 7, true);
//!
//! assert_eq!(frame.sequence, 7);
//! assert_eq!(frame.payload(), b"1,2,3");
//! assert_eq!(frame.as_text(), Some("1,2,3"));
//! ```

use std::time::SystemTime;

use bytes::Bytes;

/// One complete unit of payload extracted from a stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Payload without delimiters or checksum trailer.
    pub payload: Bytes,
    /// Monotonic per-connection extraction counter.
    pub sequence: u64,
    /// Extraction time.
    pub timestamp: SystemTime,
    /// False when the checksum trailer did not match (or was missing).
    pub checksum_valid: bool,
}

impl Frame {
    /// Create a frame stamped with the current time.
    pub fn new(payload: Bytes, sequence: u64, checksum_valid: bool) -> Self {
        Self {
            payload,
            sequence,
            timestamp: SystemTime::now(),
            checksum_valid,
        }
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Cheap clone of the payload.
    #[inline]
    pub fn payload_bytes(&self) -> Bytes {
        self.payload.clone()
    }

    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Payload as UTF-8, if it is valid UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}
