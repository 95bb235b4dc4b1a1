//! Error types for framewire.

use thiserror::Error;

use crate::pipeline::ConnectionId;
use crate::transform::TransformFailure;

/// Main error type for all framewire operations.
///
/// Only configuration-time problems and caller mistakes surface here.
/// Buffer overflow, checksum mismatches and pool exhaustion are absorbed
/// into statistics and events instead.
#[derive(Debug, Error)]
pub enum FramewireError {
    /// Checksum algorithm name not recognised.
    #[error("Unsupported checksum algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Frame detection settings are inconsistent (missing delimiter, etc.).
    #[error("Invalid frame detection config: {0}")]
    InvalidDetectionConfig(String),

    /// Persisted settings could not be turned into a valid configuration.
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// No connection registered under this id.
    #[error("Unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    /// A connection with this id is already open.
    #[error("Connection already open: {0}")]
    ConnectionExists(ConnectionId),

    /// The worker pool has been destroyed and accepts no more work.
    #[error("Worker pool destroyed")]
    PoolDestroyed,

    /// A frame transform failed.
    #[error(transparent)]
    Transform(#[from] TransformFailure),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),
}

/// Result type alias using FramewireError.
pub type Result<T> = std::result::Result<T, FramewireError>;
