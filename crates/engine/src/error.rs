//! Engine error types.
//!
//! Every failure the ingestion and query paths can raise. The calling layer
//! decides how to present them; [`EngineError::is_client_error`] separates
//! problems with the request from problems with the stored data or the
//! backend.

use playstat_storage::StorageError;
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised by key composition, ingestion and aggregation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// A leveled key was requested outside depths `1..=4`.
    #[error("Invalid key depth {depth}: expected 1 to 4")]
    InvalidDepth {
        /// The rejected depth.
        depth: usize,
    },

    /// A scanned key does not belong to the family being aggregated.
    ///
    /// This indicates corrupted or foreign data in the store, not a bad
    /// request.
    #[error("Malformed stored key: {key}")]
    MalformedKey {
        /// The offending key.
        key: String,
    },

    /// A grouping index points past the segments a stored key has.
    #[error("Node index {index} out of range for {segments} key segments")]
    IndexOutOfRange {
        /// The requested index.
        index: usize,
        /// Number of segments the key actually has.
        segments: usize,
    },

    /// Query parameters could not be understood.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A playback record cannot be addressed, e.g. its target has no host.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// A raw record could not be encoded or decoded.
    #[error("Record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend selection failed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The storage backend failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl EngineError {
    /// Returns `true` if the caller sent something unusable.
    ///
    /// Request layers answer these with a 4xx-style rejection. Everything else
    /// is a server-side fault.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidDepth { .. }
                | Self::IndexOutOfRange { .. }
                | Self::BadRequest(_)
                | Self::InvalidRecord(_)
        )
    }

    /// Returns `true` if the backend could not be reached.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_unavailable())
    }
}
