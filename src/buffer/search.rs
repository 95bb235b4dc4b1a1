//! Knuth-Morris-Pratt substring search over byte iterators.
//!
//! The matcher works on any `Iterator<Item = u8>` so the ring buffer can
//! feed it the two physical segments of its storage back to back without
//! copying them into a contiguous slice first.

/// Build the longest-proper-prefix-suffix table for `pattern`.
///
/// `table[i]` is the length of the longest proper prefix of
/// `pattern[..=i]` that is also a suffix of it.
pub fn failure_table(pattern: &[u8]) -> Vec<usize> {
    let mut table = vec![0; pattern.len()];
    let mut len = 0;
    let mut i = 1;

    while i < pattern.len() {
        if pattern[i] == pattern[len] {
            len += 1;
            table[i] = len;
            i += 1;
        } else if len != 0 {
            len = table[len - 1];
        } else {
            table[i] = 0;
            i += 1;
        }
    }

    table
}

/// A compiled KMP pattern.
#[derive(Debug, Clone)]
pub struct KmpMatcher<'p> {
    pattern: &'p [u8],
    table: Vec<usize>,
}

impl<'p> KmpMatcher<'p> {
    /// Compile `pattern`. The failure table is built once here.
    pub fn new(pattern: &'p [u8]) -> Self {
        Self {
            pattern,
            table: failure_table(pattern),
        }
    }

    /// Pattern length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.pattern.len()
    }

    /// Whether the pattern is empty (an empty pattern never matches).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pattern.is_empty()
    }

    /// Index (relative to the iterator start) of the first full match.
    pub fn find<I>(&self, haystack: I) -> Option<usize>
    where
        I: IntoIterator<Item = u8>,
    {
        if self.pattern.is_empty() {
            return None;
        }

        let mut j = 0;
        for (i, byte) in haystack.into_iter().enumerate() {
            while j > 0 && byte != self.pattern[j] {
                j = self.table[j - 1];
            }
            if byte == self.pattern[j] {
                j += 1;
                if j == self.pattern.len() {
                    return Some(i + 1 - j);
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_table() {
        assert_eq!(failure_table(b"ABABCABAB"), vec![0, 0, 1, 2, 0, 1, 2, 3, 4]);
        assert_eq!(failure_table(b"AAAA"), vec![0, 1, 2, 3]);
        assert_eq!(failure_table(b"ABC"), vec![0, 0, 0]);
        assert!(failure_table(b"").is_empty());
    }

    #[test]
    fn test_find_simple() {
        let m = KmpMatcher::new(b"\r\n");
        assert_eq!(m.find(b"hello\r\nworld".iter().copied()), Some(5));
        assert_eq!(m.find(b"hello\rworld\n".iter().copied()), None);
    }

    #[test]
    fn test_find_with_partial_overlap() {
        // Mismatch after a partial match must fall back through the table,
        // not restart past the partial match.
        let m = KmpMatcher::new(b"AAB");
        assert_eq!(m.find(b"AAAAB".iter().copied()), Some(2));

        let m = KmpMatcher::new(b"ABABC");
        assert_eq!(m.find(b"ABABABC".iter().copied()), Some(2));
    }

    #[test]
    fn test_empty_pattern_never_matches() {
        let m = KmpMatcher::new(b"");
        assert!(m.is_empty());
        assert_eq!(m.find(b"anything".iter().copied()), None);
    }

    #[test]
    fn test_find_across_chained_segments() {
        let m = KmpMatcher::new(b"END");
        let first: &[u8] = b"xxxxE";
        let second: &[u8] = b"NDyy";
        let hay = first.iter().chain(second.iter()).copied();
        assert_eq!(m.find(hay), Some(4));
    }
}
