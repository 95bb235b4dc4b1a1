//! Frame-to-dataset transforms.
//!
//! A [`Transform`] turns one frame payload into an ordered list of
//! [`Value`]s. The worker pool runs it on a blocking thread, so
//! implementations may be CPU-bound or call into an embedded interpreter.
//!
//! Provides:
//! - [`SplitTransform`] - delimiter-separated text (CSV lines)
//! - [`JsonTransform`] - values of a JSON object or array
//! - [`FnTransform`] / [`from_fn`] - any closure
//!
//! # Example
//!
//! ```
//! use framewire::transform::{from_fn, Transform, Value};
//!
//! let double = from_fn(|payload: &[u8]| Ok(vec![Value::Number(payload.len() as f64 * 2.0)]));
//! assert_eq!(double.run(b"abc").unwrap(), vec![Value::Number(6.0)]);
//! ```

mod json;
mod split;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use json::JsonTransform;
pub use split::SplitTransform;

/// One scalar produced by a transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
}

impl Value {
    /// Parse a field: numeric text becomes `Number`, anything else `Text`.
    pub fn parse(field: &str) -> Self {
        match field.parse::<f64>() {
            Ok(n) if !field.is_empty() => Value::Number(n),
            _ => Value::Text(field.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            Value::Number(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

/// Error raised by a single transform invocation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransformError {
    /// Payload was expected to be UTF-8 text.
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,

    /// Transform-specific failure.
    #[error("{0}")]
    Failed(String),

    /// The transform panicked on its worker thread.
    #[error("transform panicked: {0}")]
    Panicked(String),

    /// The transform overran the pool's per-frame timeout.
    #[error("transform timed out after {0:?}")]
    TimedOut(Duration),

    /// The pool was torn down before the frame finished.
    #[error("transform cancelled by pool teardown")]
    Cancelled,
}

impl TransformError {
    pub fn failed(msg: impl Into<String>) -> Self {
        TransformError::Failed(msg.into())
    }
}

/// A transform error tied to the frame that caused it.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("transform failed for frame {sequence}: {error}")]
pub struct TransformFailure {
    pub sequence: u64,
    #[source]
    pub error: TransformError,
}

/// Frame payload to dataset values.
///
/// `warm_up` runs once per worker slot before it accepts work and
/// `shut_down` once per slot when the pool is destroyed. Both default to
/// no-ops.
pub trait Transform: Send + Sync + 'static {
    fn run(&self, payload: &[u8]) -> Result<Vec<Value>, TransformError>;

    fn warm_up(&self, _slot: usize) -> Result<(), TransformError> {
        Ok(())
    }

    fn shut_down(&self, _slot: usize) -> Result<(), TransformError> {
        Ok(())
    }
}

/// Closure adapter for [`Transform`].
pub struct FnTransform<F> {
    f: F,
}

impl<F> Transform for FnTransform<F>
where
    F: Fn(&[u8]) -> Result<Vec<Value>, TransformError> + Send + Sync + 'static,
{
    fn run(&self, payload: &[u8]) -> Result<Vec<Value>, TransformError> {
        (self.f)(payload)
    }
}

/// Wrap a closure as a [`Transform`].
pub fn from_fn<F>(f: F) -> FnTransform<F>
where
    F: Fn(&[u8]) -> Result<Vec<Value>, TransformError> + Send + Sync + 'static,
{
    FnTransform { f }
}

/// Decode a payload as trimmed UTF-8 text.
pub(crate) fn payload_text(payload: &[u8]) -> Result<&str, TransformError> {
    std::str::from_utf8(payload)
        .map(str::trim)
        .map_err(|_| TransformError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_parse() {
        assert_eq!(Value::parse("1.5"), Value::Number(1.5));
        assert_eq!(Value::parse("-3"), Value::Number(-3.0));
        assert_eq!(Value::parse("abc"), Value::Text("abc".into()));
        assert_eq!(Value::parse(""), Value::Text(String::new()));
    }

    #[test]
    fn test_value_serializes_untagged() {
        let values = vec![Value::Number(1.0), Value::from("on")];
        assert_eq!(serde_json::to_string(&values).unwrap(), r#"[1.0,"on"]"#);
    }

    #[test]
    fn test_failure_display() {
        let failure = TransformFailure {
            sequence: 9,
            error: TransformError::failed("bad field"),
        };
        assert_eq!(failure.to_string(), "transform failed for frame 9: bad field");
    }

    #[test]
    fn test_fn_transform_default_hooks() {
        let t = from_fn(|_: &[u8]| Err(TransformError::failed("nope")));
        assert!(t.warm_up(0).is_ok());
        assert!(t.shut_down(0).is_ok());
        assert!(t.run(b"").is_err());
    }

    #[test]
    fn test_payload_text() {
        assert_eq!(payload_text(b"  1,2 \r").unwrap(), "1,2");
        assert_eq!(payload_text(&[0xFF]), Err(TransformError::InvalidUtf8));
    }
}
