//! Fixed-capacity circular byte store.
//!
//! Appending past capacity silently overwrites the oldest bytes; this is
//! the lossy overflow policy of the ingestion path, not an error. The
//! number of bytes lost that way is kept in [`RingStats::overwritten_bytes`].
//!
//! # Example
//!
//! ```
//! use framewire::buffer::RingBuffer;
//!
//! let mut ring = RingBuffer::new(16);
//! ring.append(b"AAAAAAAAAAAAAAAA");
//! ring.append(b"BBBB");
//!
//! assert!(ring.is_full());
//! assert_eq!(&ring.peek(16)[..], b"AAAAAAAAAAAABBBB");
//! assert_eq!(ring.utilization(), 100.0);
//! ```

use bytes::{Bytes, BytesMut};
use serde::Serialize;

use super::search::KmpMatcher;

/// Default ring capacity (8 KiB).
pub const DEFAULT_CAPACITY: usize = 8 * 1024;

/// Point-in-time view of a ring buffer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RingStats {
    pub size: usize,
    pub capacity: usize,
    pub free_space: usize,
    pub head: usize,
    pub tail: usize,
    /// Percentage of capacity in use (0.0 - 100.0).
    pub utilization: f64,
    /// Bytes discarded by overwrite since creation.
    pub overwritten_bytes: u64,
}

/// Circular byte buffer with wraparound-aware pattern search.
///
/// `size` bytes starting at `head` (modulo capacity) are valid. Logical
/// offsets used by every method are relative to `head`.
pub struct RingBuffer {
    data: Box<[u8]>,
    head: usize,
    tail: usize,
    size: usize,
    /// Total bytes ever appended, including bytes that never fit.
    appended: u64,
    overwritten: u64,
}

impl RingBuffer {
    /// Create a ring with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        Self {
            data: vec![0; capacity].into_boxed_slice(),
            head: 0,
            tail: 0,
            size: 0,
            appended: 0,
            overwritten: 0,
        }
    }

    /// Append bytes at the tail, overwriting the oldest bytes when full.
    ///
    /// Input longer than the capacity is truncated to its most recent
    /// `capacity` bytes. Returns how many bytes were lost to overwrite.
    pub fn append(&mut self, data: &[u8]) -> usize {
        if data.is_empty() {
            return 0;
        }

        let capacity = self.capacity();
        let mut lost = 0;

        let src = if data.len() > capacity {
            lost += data.len() - capacity;
            &data[data.len() - capacity..]
        } else {
            data
        };

        let free = capacity - self.size;
        if src.len() > free {
            let evict = src.len() - free;
            self.head = (self.head + evict) % capacity;
            self.size -= evict;
            lost += evict;
        }

        let first = src.len().min(capacity - self.tail);
        self.data[self.tail..self.tail + first].copy_from_slice(&src[..first]);
        if src.len() > first {
            self.data[..src.len() - first].copy_from_slice(&src[first..]);
        }

        self.tail = (self.tail + src.len()) % capacity;
        self.size += src.len();
        self.appended += data.len() as u64;
        self.overwritten += lost as u64;

        if lost > 0 {
            tracing::trace!(lost, capacity, "ring buffer overwrote oldest bytes");
        }

        lost
    }

    /// Remove and return the oldest `min(n, len)` bytes.
    pub fn read(&mut self, n: usize) -> Bytes {
        let out = self.peek(n);
        self.advance(out.len());
        out
    }

    /// Return the oldest `min(n, len)` bytes without removing them.
    pub fn peek(&self, n: usize) -> Bytes {
        self.peek_range(0, n)
    }

    /// Copy `len` bytes starting at logical `offset`, clamped to the valid window.
    pub fn peek_range(&self, offset: usize, len: usize) -> Bytes {
        let (a, b) = self.segments(offset, len);
        if b.is_empty() {
            return Bytes::copy_from_slice(a);
        }

        let mut out = BytesMut::with_capacity(a.len() + b.len());
        out.extend_from_slice(a);
        out.extend_from_slice(b);
        out.freeze()
    }

    /// Drop the oldest `min(n, len)` bytes without copying them out.
    pub fn discard(&mut self, n: usize) -> usize {
        let n = n.min(self.size);
        self.advance(n);
        n
    }

    /// Byte at logical `offset`, if within the valid window.
    #[inline]
    pub fn byte_at(&self, offset: usize) -> Option<u8> {
        if offset >= self.size {
            return None;
        }
        Some(self.data[(self.head + offset) % self.capacity()])
    }

    /// Find the first occurrence of `pattern` at or after logical `start`.
    ///
    /// The KMP table is built once per call and the scan walks the logical
    /// window in place, so matches straddling the physical end of the
    /// backing store are found without copying.
    pub fn find_pattern(&self, pattern: &[u8], start: usize) -> Option<usize> {
        if pattern.is_empty() || start >= self.size || self.size - start < pattern.len() {
            return None;
        }

        let matcher = KmpMatcher::new(pattern);
        matcher
            .find(self.iter_from(start))
            .map(|relative| start + relative)
    }

    /// Every (possibly overlapping) match offset of `pattern`.
    pub fn find_all(&self, pattern: &[u8]) -> Vec<usize> {
        let mut positions = Vec::new();
        let mut pos = 0;

        while let Some(found) = self.find_pattern(pattern, pos) {
            positions.push(found);
            pos = found + 1;
        }

        positions
    }

    /// Empty the buffer. Capacity and counters are kept.
    pub fn clear(&mut self) {
        // Cleared bytes leave the window like consumed ones.
        self.head = 0;
        self.tail = 0;
        self.size = 0;
    }

    /// Replace the backing store with a new capacity. Contents are dropped.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn set_capacity(&mut self, capacity: usize) {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        self.clear();
        self.data = vec![0; capacity].into_boxed_slice();
    }

    /// Number of valid bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    /// Fixed capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Remaining room before appends start overwriting.
    #[inline]
    pub fn free_space(&self) -> usize {
        self.capacity() - self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.size == self.capacity()
    }

    /// Percentage of capacity in use.
    #[inline]
    pub fn utilization(&self) -> f64 {
        self.size as f64 / self.capacity() as f64 * 100.0
    }

    /// Absolute stream offset of the oldest valid byte.
    ///
    /// Grows monotonically as bytes are read, discarded, cleared or
    /// overwritten; lets callers keep positions that survive consumption.
    #[inline]
    pub fn stream_position(&self) -> u64 {
        self.appended - self.size as u64
    }

    /// Bytes lost to overwrite since creation.
    #[inline]
    pub fn overwritten_bytes(&self) -> u64 {
        self.overwritten
    }

    pub fn stats(&self) -> RingStats {
        RingStats {
            size: self.size,
            capacity: self.capacity(),
            free_space: self.free_space(),
            head: self.head,
            tail: self.tail,
            utilization: self.utilization(),
            overwritten_bytes: self.overwritten,
        }
    }

    fn advance(&mut self, n: usize) {
        debug_assert!(n <= self.size);
        self.head = (self.head + n) % self.capacity();
        self.size -= n;
        if self.size == 0 {
            self.head = 0;
            self.tail = 0;
        }
    }

    /// The (at most two) physical slices backing logical `[offset, offset+len)`.
    fn segments(&self, offset: usize, len: usize) -> (&[u8], &[u8]) {
        if offset >= self.size {
            return (&[], &[]);
        }

        let len = len.min(self.size - offset);
        let capacity = self.capacity();
        let start = (self.head + offset) % capacity;
        let first = len.min(capacity - start);

        (
            &self.data[start..start + first],
            &self.data[..len - first],
        )
    }

    fn iter_from(&self, offset: usize) -> impl Iterator<Item = u8> + '_ {
        let (a, b) = self.segments(offset, self.size);
        a.iter().chain(b.iter()).copied()
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("size", &self.size)
            .field("head", &self.head)
            .field("tail", &self.tail)
            .finish()
    }
}
