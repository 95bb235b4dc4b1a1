//! Delimiter-separated text transform.

use super::{payload_text, Transform, TransformError, Value};

/// Splits a text payload on a separator and parses each trimmed field.
///
/// Numeric fields become [`Value::Number`], the rest [`Value::Text`].
#[derive(Debug, Clone)]
pub struct SplitTransform {
    separator: char,
}

impl SplitTransform {
    pub fn new(separator: char) -> Self {
        Self { separator }
    }

    /// Comma-separated values.
    pub fn csv() -> Self {
        Self::new(',')
    }
}

impl Default for SplitTransform {
    fn default() -> Self {
        Self::csv()
    }
}

impl Transform for SplitTransform {
    fn run(&self, payload: &[u8]) -> Result<Vec<Value>, TransformError> {
        let text = payload_text(payload)?;
        if text.is_empty() {
            return Ok(Vec::new());
        }

        Ok(text
            .split(self.separator)
            .map(|field| Value::parse(field.trim()))
            .collect())
    }
}
