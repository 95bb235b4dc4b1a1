//! Checksum engine.
//!
//! Pure functions computing a fixed-length digest for a closed set of
//! algorithms. Digests are used for payload integrity only; the hash
//! family delegates to RustCrypto so results match the reference
//! algorithms byte for byte.
//!
//! # Example
//!
//! ```
//! use framewire::checksum::{self, ChecksumAlgorithm};
//!
//! let digest = checksum::compute(ChecksumAlgorithm::Crc16, b"123456789");
//! assert_eq!(digest, vec![0x31, 0xC3]);
//! assert!(checksum::verify(ChecksumAlgorithm::Crc16, b"123456789", &digest));
//!
//! let algo: ChecksumAlgorithm = "CRC-16".parse().unwrap();
//! assert_eq!(algo, ChecksumAlgorithm::Crc16);
//! ```

mod crc;
mod sums;

use std::fmt;
use std::str::FromStr;

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::error::{FramewireError, Result};

pub use crc::{crc16, crc32, crc8};
pub use sums::{fletcher16, fletcher32, sum8, xor8};

/// Supported checksum algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChecksumAlgorithm {
    #[default]
    None,
    Crc8,
    Crc16,
    Crc32,
    Xor,
    Sum,
    Fletcher16,
    Fletcher32,
    Md5,
    Sha1,
    Sha256,
}

impl ChecksumAlgorithm {
    /// Every algorithm, in declaration order.
    pub const ALL: [ChecksumAlgorithm; 11] = [
        Self::None,
        Self::Crc8,
        Self::Crc16,
        Self::Crc32,
        Self::Xor,
        Self::Sum,
        Self::Fletcher16,
        Self::Fletcher32,
        Self::Md5,
        Self::Sha1,
        Self::Sha256,
    ];

    /// Digest length in bytes.
    #[inline]
    pub const fn length(self) -> usize {
        match self {
            Self::None => 0,
            Self::Crc8 | Self::Xor | Self::Sum => 1,
            Self::Crc16 | Self::Fletcher16 => 2,
            Self::Crc32 | Self::Fletcher32 => 4,
            Self::Md5 => 16,
            Self::Sha1 => 20,
            Self::Sha256 => 32,
        }
    }

    /// Canonical display name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Crc8 => "CRC-8",
            Self::Crc16 => "CRC-16",
            Self::Crc32 => "CRC-32",
            Self::Xor => "XOR",
            Self::Sum => "Sum",
            Self::Fletcher16 => "Fletcher-16",
            Self::Fletcher32 => "Fletcher-32",
            Self::Md5 => "MD5",
            Self::Sha1 => "SHA-1",
            Self::Sha256 => "SHA-256",
        }
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = FramewireError;

    /// Case-insensitive; `-` and `_` are ignored. Empty means `None`.
    fn from_str(s: &str) -> Result<Self> {
        let key: String = s
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();

        let algo = match key.as_str() {
            "" | "none" => Self::None,
            "crc8" => Self::Crc8,
            "crc16" => Self::Crc16,
            "crc32" => Self::Crc32,
            "xor" => Self::Xor,
            "sum" => Self::Sum,
            "fletcher16" => Self::Fletcher16,
            "fletcher32" => Self::Fletcher32,
            "md5" => Self::Md5,
            "sha1" => Self::Sha1,
            "sha256" => Self::Sha256,
            _ => return Err(FramewireError::UnsupportedAlgorithm(s.to_string())),
        };

        Ok(algo)
    }
}

/// Compute the digest of `data`. `None` yields an empty digest.
pub fn compute(algorithm: ChecksumAlgorithm, data: &[u8]) -> Vec<u8> {
    match algorithm {
        ChecksumAlgorithm::None => Vec::new(),
        ChecksumAlgorithm::Crc8 => vec![crc8(data)],
        ChecksumAlgorithm::Crc16 => crc16(data).to_be_bytes().to_vec(),
        ChecksumAlgorithm::Crc32 => crc32(data).to_be_bytes().to_vec(),
        ChecksumAlgorithm::Xor => vec![xor8(data)],
        ChecksumAlgorithm::Sum => vec![sum8(data)],
        ChecksumAlgorithm::Fletcher16 => fletcher16(data).to_vec(),
        ChecksumAlgorithm::Fletcher32 => fletcher32(data).to_vec(),
        ChecksumAlgorithm::Md5 => Md5::digest(data).to_vec(),
        ChecksumAlgorithm::Sha1 => Sha1::digest(data).to_vec(),
        ChecksumAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
    }
}

/// Check `data` against `expected`. `None` always verifies.
pub fn verify(algorithm: ChecksumAlgorithm, data: &[u8], expected: &[u8]) -> bool {
    if algorithm.is_none() {
        return true;
    }
    expected.len() == algorithm.length() && compute(algorithm, data) == expected
}

/// Digest length of `algorithm` in bytes.
#[inline]
pub fn length(algorithm: ChecksumAlgorithm) -> usize {
    algorithm.length()
}

/// Compute by algorithm name, failing with `UnsupportedAlgorithm` on unknown names.
pub fn compute_named(name: &str, data: &[u8]) -> Result<Vec<u8>> {
    let algorithm: ChecksumAlgorithm = name.parse()?;
    Ok(compute(algorithm, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lengths_match_digests() {
        for algo in ChecksumAlgorithm::ALL {
            assert_eq!(compute(algo, b"payload").len(), algo.length(), "{algo}");
            assert_eq!(length(algo), algo.length());
        }
    }

    #[test]
    fn test_crc_outputs_big_endian() {
        assert_eq!(compute(ChecksumAlgorithm::Crc8, b"123456789"), vec![0xF4]);
        assert_eq!(compute(ChecksumAlgorithm::Crc16, b"123456789"), vec![0x31, 0xC3]);
        assert_eq!(
            compute(ChecksumAlgorithm::Crc32, b"123456789"),
            vec![0xCB, 0xF4, 0x39, 0x26]
        );
    }

    #[test]
    fn test_hash_reference_vectors() {
        assert_eq!(
            hex::encode(compute(ChecksumAlgorithm::Md5, b"")),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
        assert_eq!(
            hex::encode(compute(ChecksumAlgorithm::Sha1, b"abc")),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_eq!(
            hex::encode(compute(ChecksumAlgorithm::Sha256, b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_none_always_verifies() {
        assert!(compute(ChecksumAlgorithm::None, b"abc").is_empty());
        assert!(verify(ChecksumAlgorithm::None, b"abc", b""));
        assert!(verify(ChecksumAlgorithm::None, b"abc", b"junk"));
    }

    #[test]
    fn test_verify_detects_corruption() {
        let digest = compute(ChecksumAlgorithm::Crc32, b"hello");
        assert!(verify(ChecksumAlgorithm::Crc32, b"hello", &digest));
        assert!(!verify(ChecksumAlgorithm::Crc32, b"hellp", &digest));
        assert!(!verify(ChecksumAlgorithm::Crc32, b"hello", &digest[..3]));
    }

    #[test]
    fn test_parse_names() {
        let cases = [
            ("", ChecksumAlgorithm::None),
            ("none", ChecksumAlgorithm::None),
            ("CRC-8", ChecksumAlgorithm::Crc8),
            ("crc16", ChecksumAlgorithm::Crc16),
            ("Crc_32", ChecksumAlgorithm::Crc32),
            ("XOR", ChecksumAlgorithm::Xor),
            ("sum", ChecksumAlgorithm::Sum),
            ("Fletcher_16", ChecksumAlgorithm::Fletcher16),
            ("fletcher-32", ChecksumAlgorithm::Fletcher32),
            ("md5", ChecksumAlgorithm::Md5),
            ("SHA-1", ChecksumAlgorithm::Sha1),
            ("sha256", ChecksumAlgorithm::Sha256),
        ];
        for (name, expected) in cases {
            assert_eq!(name.parse::<ChecksumAlgorithm>().unwrap(), expected, "{name}");
        }
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for algo in ChecksumAlgorithm::ALL {
            assert_eq!(algo.to_string().parse::<ChecksumAlgorithm>().unwrap(), algo);
        }
    }

    #[test]
    fn test_unsupported_algorithm() {
        let err = compute_named("adler32", b"x").unwrap_err();
        assert!(matches!(err, FramewireError::UnsupportedAlgorithm(ref n) if n == "adler32"));
    }
}
