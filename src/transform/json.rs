//! JSON payload transform.

use serde_json::Value as Json;

use super::{payload_text, Transform, TransformError, Value};

/// Emits the values of a JSON object (in document order) or array.
///
/// Numbers stay numbers, numeric strings are parsed, anything else is
/// rendered as text. A scalar document yields a single value.
#[derive(Debug, Clone, Default)]
pub struct JsonTransform;

impl JsonTransform {
    pub fn new() -> Self {
        Self
    }
}

fn convert(value: &Json) -> Value {
    match value {
        Json::Number(n) => n
            .as_f64()
            .map(Value::Number)
            .unwrap_or_else(|| Value::Text(n.to_string())),
        Json::String(s) => Value::parse(s.trim()),
        other => Value::Text(other.to_string()),
    }
}

impl Transform for JsonTransform {
    fn run(&self, payload: &[u8]) -> Result<Vec<Value>, TransformError> {
        let text = payload_text(payload)?;
        let doc: Json = serde_json::from_str(text)
            .map_err(|e| TransformError::failed(format!("invalid JSON: {e}")))?;

        let values = match &doc {
            Json::Object(map) => map.values().map(convert).collect(),
            Json::Array(items) => items.iter().map(convert).collect(),
            scalar => vec![convert(scalar)],
        };

        Ok(values)
    }
}
