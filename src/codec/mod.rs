//! Encoding of pipeline events for an out-of-process consumer.
//!
//! - [`MsgPackCodec`] - MessagePack via `rmp-serde`, structs as maps
//! - [`JsonCodec`] - JSON via `serde_json`, one event per line
//!
//! Codecs are marker structs with static methods, so the choice is made
//! at compile time.
//!
//! # Example
//!
//! ```
//! use framewire::codec::{JsonCodec, MsgPackCodec};
//! use framewire::pipeline::{ConnectionId, PipelineEvent};
//!
//! let event = PipelineEvent::ChecksumWarning { connection: ConnectionId(1), sequence: 7 };
//!
//! let packed = MsgPackCodec::encode(&event).unwrap();
//! let back: serde_json::Value = MsgPackCodec::decode(&packed).unwrap();
//! assert_eq!(back["type"], "checksumWarning");
//!
//! let line = JsonCodec::encode_line(&event).unwrap();
//! assert!(line.ends_with(b"\n"));
//! ```

mod json;
mod msgpack;

pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;
