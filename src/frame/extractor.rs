//! Frame extraction state machine.
//!
//! [`FrameExtractor::drain`] is called after every append. It loops
//! search, slice, checksum-check and emit until no further frame can be
//! taken, then returns. Nothing is consumed until a frame is complete, and
//! a complete frame is always consumed, even when its checksum fails, so
//! a corrupt frame can never pin the scan in place.
//!
//! Failed delimiter searches remember (as absolute stream positions) where
//! the next search may resume, so a slow trickle of bytes is not rescanned
//! from the head on every drain.
//!
//! # Example
//!
//! ```
//! use framewire::buffer::RingBuffer;
//! use framewire::frame::{FrameDetectionConfig, FrameExtractor};
//!
//! let mut ring = RingBuffer::new(64);
//! let mut extractor = FrameExtractor::new(FrameDetectionConfig::end_delimited(";")).unwrap();
//!
//! ring.append(b"1,2;3,");
//! let frames = extractor.drain(&mut ring);
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0].payload(), b"1,2");
//!
//! ring.append(b"4;");
//! let frames = extractor.drain(&mut ring);
//! assert_eq!(frames[0].payload(), b"3,4");
//! assert_eq!(frames[0].sequence, 1);
//! ```

use bytes::Bytes;
use serde::Serialize;

use super::config::{FrameDetection, FrameDetectionConfig};
use super::frame::Frame;
use crate::buffer::RingBuffer;
use crate::checksum;
use crate::error::Result;

/// Extraction counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtractorStats {
    /// Frames emitted (valid or not).
    pub frames: u64,
    /// Emitted frames whose checksum did not verify.
    pub checksum_failures: u64,
    /// Empty candidates consumed without emitting.
    pub discarded_empty: u64,
}

/// Absolute stream positions where failed searches may resume.
#[derive(Debug, Clone, Copy, Default)]
struct ScanState {
    /// Start-marker search.
    start_resume: u64,
    /// Search for whatever closes the current frame (end marker or next start).
    boundary_resume: u64,
}

enum Step {
    Extracted(Frame),
    Discarded,
    NeedMore,
}

/// Per-connection frame extractor.
#[derive(Debug)]
pub struct FrameExtractor {
    config: FrameDetectionConfig,
    start: Bytes,
    /// Primary end marker followed by alternates.
    ends: Vec<Bytes>,
    longest_end: usize,
    checksum_len: usize,
    scan: ScanState,
    next_sequence: u64,
    stats: ExtractorStats,
}

impl FrameExtractor {
    /// Create an extractor. Fails fast on an invalid config.
    pub fn new(config: FrameDetectionConfig) -> Result<Self> {
        config.validate()?;

        let mut extractor = Self {
            config: FrameDetectionConfig::no_delimiters(),
            start: Bytes::new(),
            ends: Vec::new(),
            longest_end: 0,
            checksum_len: 0,
            scan: ScanState::default(),
            next_sequence: 0,
            stats: ExtractorStats::default(),
        };
        extractor.apply(config);
        Ok(extractor)
    }

    pub fn config(&self) -> &FrameDetectionConfig {
        &self.config
    }

    /// Replace the detection config and reset the scan position to the
    /// buffer head. The sequence counter keeps running.
    pub fn set_config(&mut self, config: FrameDetectionConfig) -> Result<()> {
        config.validate()?;
        self.apply(config);
        self.reset();
        Ok(())
    }

    /// Forget resume positions. The ring buffer is not touched.
    pub fn reset(&mut self) {
        self.scan = ScanState::default();
    }

    pub fn stats(&self) -> ExtractorStats {
        self.stats
    }

    /// Sequence number the next emitted frame will carry.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Extract every complete frame currently in `buffer`.
    pub fn drain(&mut self, buffer: &mut RingBuffer) -> Vec<Frame> {
        let mut frames = Vec::new();

        loop {
            let step = match self.config.mode {
                FrameDetection::NoDelimiters => self.next_undelimited(buffer),
                FrameDetection::EndDelimiterOnly => self.next_end_delimited(buffer),
                FrameDetection::StartDelimiterOnly => self.next_start_delimited(buffer),
                FrameDetection::StartAndEndDelimiter => self.next_start_end_delimited(buffer),
            };

            match step {
                Step::Extracted(frame) => frames.push(frame),
                Step::Discarded => continue,
                Step::NeedMore => break,
            }
        }

        frames
    }

    /// Drain, then emit whatever trailing data can form a frame without
    /// waiting for more input.
    ///
    /// Only `NoDelimiters` and `StartDelimiterOnly` without a fixed length
    /// have such a tail; other modes behave like [`drain`](Self::drain).
    pub fn flush(&mut self, buffer: &mut RingBuffer) -> Vec<Frame> {
        let mut frames = self.drain(buffer);

        let tail = match self.config.mode {
            FrameDetection::NoDelimiters if !buffer.is_empty() => {
                let payload = buffer.read(buffer.len());
                Some(self.emit(payload, true))
            }
            FrameDetection::StartDelimiterOnly if self.config.fixed_frame_length.is_none() => {
                let start = self.start.clone();
                buffer.find_pattern(&start, 0).map(|i| {
                    let body = i + start.len();
                    let (payload, valid) = self.checked_payload(buffer, body, buffer.len());
                    buffer.discard(buffer.len());
                    self.emit(payload, valid)
                })
            }
            _ => None,
        };

        if let Some(Step::Extracted(frame)) = tail {
            frames.push(frame);
        }
        self.reset();
        frames
    }

    fn apply(&mut self, config: FrameDetectionConfig) {
        self.start = config.start_sequence.clone().unwrap_or_default();
        self.ends = config
            .end_sequence
            .iter()
            .chain(config.alternate_end_sequences.iter())
            .cloned()
            .collect();
        self.longest_end = self.ends.iter().map(Bytes::len).max().unwrap_or(0);
        self.checksum_len = match config.mode {
            FrameDetection::NoDelimiters => 0,
            _ => config.checksum.length(),
        };
        self.config = config;
    }

    fn next_undelimited(&mut self, buffer: &mut RingBuffer) -> Step {
        if buffer.is_empty() {
            return Step::NeedMore;
        }

        let n = match self.config.flush_size {
            Some(size) if buffer.len() >= size => size,
            Some(_) => return Step::NeedMore,
            None => buffer.len(),
        };

        let payload = buffer.read(n);
        self.emit(payload, true)
    }

    fn next_end_delimited(&mut self, buffer: &mut RingBuffer) -> Step {
        let from = resume_offset(buffer, self.scan.boundary_resume);

        let Some((end, delimiter_len)) = self.find_end(buffer, from) else {
            self.scan.boundary_resume = resume_after_miss(buffer, from, self.longest_end);
            return Step::NeedMore;
        };

        let (payload, valid) = self.checked_payload(buffer, 0, end);
        buffer.discard(end + delimiter_len);
        self.emit(payload, valid)
    }

    fn next_start_delimited(&mut self, buffer: &mut RingBuffer) -> Step {
        let Some(start) = self.find_start(buffer) else {
            return Step::NeedMore;
        };
        let body = start + self.start.len();

        match self.config.fixed_frame_length {
            Some(len) => {
                let frame_end = body + len + self.checksum_len;
                if buffer.len() < frame_end {
                    return Step::NeedMore;
                }

                let (payload, valid) = self.checked_payload(buffer, body, frame_end);
                buffer.discard(frame_end);
                self.emit(payload, valid)
            }
            None => {
                let from = resume_offset(buffer, self.scan.boundary_resume).max(body);
                let Some(next) = buffer.find_pattern(&self.start, from) else {
                    self.scan.boundary_resume = resume_after_miss(buffer, from, self.start.len());
                    return Step::NeedMore;
                };

                let (payload, valid) = self.checked_payload(buffer, body, next);
                // The next start marker stays at the head.
                buffer.discard(next);
                self.emit(payload, valid)
            }
        }
    }

    fn next_start_end_delimited(&mut self, buffer: &mut RingBuffer) -> Step {
        let Some(start) = self.find_start(buffer) else {
            return Step::NeedMore;
        };
        let body = start + self.start.len();
        let from = resume_offset(buffer, self.scan.boundary_resume).max(body);

        let end_marker = &self.ends[0];
        let Some(end) = buffer.find_pattern(end_marker, from) else {
            // Partial frame: keep everything until the terminator arrives.
            self.scan.boundary_resume = resume_after_miss(buffer, from, end_marker.len());
            return Step::NeedMore;
        };
        let consumed = end + end_marker.len();

        let (payload, valid) = self.checked_payload(buffer, body, end);
        buffer.discard(consumed);
        self.emit(payload, valid)
    }

    fn find_start(&mut self, buffer: &RingBuffer) -> Option<usize> {
        let from = resume_offset(buffer, self.scan.start_resume);
        let found = buffer.find_pattern(&self.start, from);
        if found.is_none() {
            self.scan.start_resume = resume_after_miss(buffer, from, self.start.len());
        }
        found
    }

    /// Earliest end marker at or after `from`; ties go to the longer marker.
    fn find_end(&self, buffer: &RingBuffer, from: usize) -> Option<(usize, usize)> {
        let mut best: Option<(usize, usize)> = None;

        for marker in &self.ends {
            if let Some(pos) = buffer.find_pattern(marker, from) {
                best = match best {
                    Some((p, len)) if p < pos || (p == pos && len >= marker.len()) => Some((p, len)),
                    _ => Some((pos, marker.len())),
                };
            }
        }

        best
    }

    /// Split logical range `[from, to)` into payload and checksum trailer
    /// and verify it. A range too short to hold the trailer is returned
    /// whole and marked invalid.
    fn checked_payload(&self, buffer: &RingBuffer, from: usize, to: usize) -> (Bytes, bool) {
        let region = buffer.peek_range(from, to.saturating_sub(from));
        let trailer_len = self.checksum_len;

        if trailer_len == 0 {
            return (region, true);
        }
        if region.len() < trailer_len {
            tracing::warn!(
                sequence = self.next_sequence,
                len = region.len(),
                algorithm = %self.config.checksum,
                "frame too short for checksum trailer"
            );
            return (region, false);
        }

        let split = region.len() - trailer_len;
        let payload = region.slice(..split);
        let received = region.slice(split..);
        let valid = checksum::verify(self.config.checksum, &payload, &received);

        if !valid && !payload.is_empty() {
            tracing::warn!(
                sequence = self.next_sequence,
                algorithm = %self.config.checksum,
                received = %hex::encode(&received),
                calculated = %hex::encode(checksum::compute(self.config.checksum, &payload)),
                "checksum mismatch"
            );
        }

        (payload, valid)
    }

    fn emit(&mut self, payload: Bytes, checksum_valid: bool) -> Step {
        if payload.is_empty() {
            self.stats.discarded_empty += 1;
            return Step::Discarded;
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.stats.frames += 1;
        if !checksum_valid {
            self.stats.checksum_failures += 1;
        }

        tracing::trace!(sequence, len = payload.len(), checksum_valid, "frame extracted");
        Step::Extracted(Frame::new(payload, sequence, checksum_valid))
    }
}

/// Logical offset corresponding to an absolute resume position.
#[inline]
fn resume_offset(buffer: &RingBuffer, resume: u64) -> usize {
    resume.saturating_sub(buffer.stream_position()) as usize
}

/// Absolute position from which a search for a marker of `longest` bytes
/// can resume after failing over `[from, len)`.
#[inline]
fn resume_after_miss(buffer: &RingBuffer, from: usize, longest: usize) -> u64 {
    let safe = buffer.len().saturating_sub(longest.saturating_sub(1));
    buffer.stream_position() + from.max(safe) as u64
}
