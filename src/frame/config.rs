//! Frame detection configuration.
//!
//! A config is immutable for the lifetime of a parsing session. Replacing
//! it on a [`FrameExtractor`](super::FrameExtractor) resets the scan state.
//!
//! # Example
//!
//! ```
//! use framewire::checksum::ChecksumAlgorithm;
//! use framewire::frame::{FrameDetection, FrameDetectionConfig};
//!
//! let config = FrameDetectionConfig::start_end_delimited("$", ";")
//!     .with_checksum(ChecksumAlgorithm::Crc16);
//!
//! assert_eq!(config.mode, FrameDetection::StartAndEndDelimiter);
//! assert!(config.validate().is_ok());
//! ```

use bytes::Bytes;

use crate::checksum::ChecksumAlgorithm;
use crate::error::{FramewireError, Result};

/// Policy used to locate frame boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrameDetection {
    /// Whole buffered content (or `flush_size` chunks) is one frame.
    NoDelimiters,
    /// Frames end at `end_sequence`.
    #[default]
    EndDelimiterOnly,
    /// Frames begin at `start_sequence`.
    StartDelimiterOnly,
    /// Frames sit between `start_sequence` and `end_sequence`.
    StartAndEndDelimiter,
}

/// Frame detection settings for one parsing session.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameDetectionConfig {
    pub mode: FrameDetection,
    pub start_sequence: Option<Bytes>,
    pub end_sequence: Option<Bytes>,
    /// Extra end markers accepted in `EndDelimiterOnly` mode.
    /// The earliest match wins; on a tie the longer marker wins.
    pub alternate_end_sequences: Vec<Bytes>,
    /// Payload length for `StartDelimiterOnly` frames of known size.
    pub fixed_frame_length: Option<usize>,
    /// Chunk size for `NoDelimiters` mode.
    pub flush_size: Option<usize>,
    pub checksum: ChecksumAlgorithm,
}

impl FrameDetectionConfig {
    fn with_mode(mode: FrameDetection) -> Self {
        Self {
            mode,
            start_sequence: None,
            end_sequence: None,
            alternate_end_sequences: Vec::new(),
            fixed_frame_length: None,
            flush_size: None,
            checksum: ChecksumAlgorithm::None,
        }
    }

    /// Frames terminated by `end`.
    pub fn end_delimited(end: impl Into<Bytes>) -> Self {
        Self {
            end_sequence: Some(end.into()),
            ..Self::with_mode(FrameDetection::EndDelimiterOnly)
        }
    }

    /// Frames introduced by `start`.
    pub fn start_delimited(start: impl Into<Bytes>) -> Self {
        Self {
            start_sequence: Some(start.into()),
            ..Self::with_mode(FrameDetection::StartDelimiterOnly)
        }
    }

    /// Frames enclosed by `start` and `end`.
    pub fn start_end_delimited(start: impl Into<Bytes>, end: impl Into<Bytes>) -> Self {
        Self {
            start_sequence: Some(start.into()),
            end_sequence: Some(end.into()),
            ..Self::with_mode(FrameDetection::StartAndEndDelimiter)
        }
    }

    /// Producer already segments; every drain yields the buffered bytes.
    pub fn no_delimiters() -> Self {
        Self::with_mode(FrameDetection::NoDelimiters)
    }

    /// Line-oriented CSV: `\n`, `\r\n` or `\r` end a frame.
    pub fn quick_plot() -> Self {
        Self::end_delimited(Bytes::from_static(b"\n"))
            .with_alternate_end_sequence(Bytes::from_static(b"\r\n"))
            .with_alternate_end_sequence(Bytes::from_static(b"\r"))
    }

    /// Devices that wrap JSON frames in `/*` ... `*/`.
    pub fn device_json() -> Self {
        Self::start_end_delimited(Bytes::from_static(b"/*"), Bytes::from_static(b"*/"))
    }

    pub fn with_checksum(mut self, checksum: ChecksumAlgorithm) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn with_fixed_frame_length(mut self, len: usize) -> Self {
        self.fixed_frame_length = Some(len);
        self
    }

    pub fn with_flush_size(mut self, size: usize) -> Self {
        self.flush_size = Some(size);
        self
    }

    pub fn with_alternate_end_sequence(mut self, end: impl Into<Bytes>) -> Self {
        self.alternate_end_sequences.push(end.into());
        self
    }

    /// Reject configs the extractor cannot run.
    pub fn validate(&self) -> Result<()> {
        let require = |seq: &Option<Bytes>, name: &str| match seq {
            Some(s) if !s.is_empty() => Ok(()),
            _ => Err(FramewireError::InvalidDetectionConfig(format!(
                "{:?} requires a non-empty {name}",
                self.mode
            ))),
        };

        match self.mode {
            FrameDetection::NoDelimiters => {
                if self.flush_size == Some(0) {
                    return Err(FramewireError::InvalidDetectionConfig(
                        "flush size must be greater than zero".into(),
                    ));
                }
            }
            FrameDetection::EndDelimiterOnly => {
                require(&self.end_sequence, "end sequence")?;
                if self.alternate_end_sequences.iter().any(Bytes::is_empty) {
                    return Err(FramewireError::InvalidDetectionConfig(
                        "alternate end sequences must be non-empty".into(),
                    ));
                }
            }
            FrameDetection::StartDelimiterOnly => {
                require(&self.start_sequence, "start sequence")?;
                if self.fixed_frame_length == Some(0) {
                    return Err(FramewireError::InvalidDetectionConfig(
                        "fixed frame length must be greater than zero".into(),
                    ));
                }
            }
            FrameDetection::StartAndEndDelimiter => {
                require(&self.start_sequence, "start sequence")?;
                require(&self.end_sequence, "end sequence")?;
            }
        }

        Ok(())
    }

    /// Smallest number of buffered bytes that can complete a frame.
    pub fn min_frame_footprint(&self) -> usize {
        let len = |seq: &Option<Bytes>| seq.as_ref().map_or(0, Bytes::len);
        let trailer = self.checksum.length();

        match self.mode {
            FrameDetection::NoDelimiters => self.flush_size.unwrap_or(1),
            FrameDetection::EndDelimiterOnly => {
                let shortest_end = self
                    .alternate_end_sequences
                    .iter()
                    .map(Bytes::len)
                    .chain(std::iter::once(len(&self.end_sequence)))
                    .min()
                    .unwrap_or(0);
                trailer + shortest_end
            }
            FrameDetection::StartDelimiterOnly => {
                len(&self.start_sequence) + self.fixed_frame_length.unwrap_or(0) + trailer
            }
            FrameDetection::StartAndEndDelimiter => {
                len(&self.start_sequence) + trailer + len(&self.end_sequence)
            }
        }
    }

    /// [`validate`](Self::validate), then reject frames a ring buffer of
    /// `capacity` bytes could never hold.
    pub fn validate_for_capacity(&self, capacity: usize) -> Result<()> {
        self.validate()?;

        let needed = self.min_frame_footprint();
        if needed > capacity {
            return Err(FramewireError::InvalidDetectionConfig(format!(
                "{:?} frames need at least {needed} buffered bytes but the buffer holds {capacity}",
                self.mode
            )));
        }
        Ok(())
    }
}

impl Default for FrameDetectionConfig {
    fn default() -> Self {
        Self::quick_plot()
    }
}
