//! JSON codec using `serde_json`.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// JSON codec for events and datasets.
pub struct JsonCodec;

impl JsonCodec {
    #[inline]
    pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    /// Encode as a single newline-terminated line (JSON Lines).
    pub fn encode_line<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut out = serde_json::to_vec(value)?;
        out.push(b'\n');
        Ok(out)
    }

    #[inline]
    pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
