//! Storage error types and result alias.
//!
//! This module defines the error types that can occur during storage operations.
//! All storage backends must map their internal errors to these standardized error types.
//!
//! # Error Types
//!
//! - [`StorageError::Conflict`] - A watched key changed before the batch committed
//! - [`StorageError::ConflictRetriesExhausted`] - Every bounded retry attempt conflicted
//! - [`StorageError::Connection`] - Network or connection-related failures
//! - [`StorageError::Timeout`] - Operation exceeded time limit
//! - [`StorageError::Serialization`] - A stored value could not be decoded (e.g. a counter
//!   holding non-numeric text)
//! - [`StorageError::Internal`] - Backend-specific internal errors
//!
//! # Example
//!
//! ```
//! use playstat_storage::{StorageError, StorageResult};
//!
//! fn parse_counter(raw: &str) -> StorageResult<f64> {
//!     raw.parse().map_err(|_| StorageError::serialization(format!("not a counter: {raw}")))
//! }
//!
//! assert!(parse_counter("1.5").is_ok());
//! assert!(parse_counter("abc").is_err());
//! ```

use std::sync::Arc;

use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for storage operations.
///
/// All storage operations return this type, providing consistent error handling
/// across different backend implementations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
///
/// Errors preserve their source chain via the `#[source]` attribute, enabling
/// debugging tools to display the full error context.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// Optimistic concurrency failure.
    ///
    /// Another writer committed to a watched key between the moment the batch
    /// declared its watch set and the moment it tried to commit. Backends
    /// absorb this inside their retry loop; callers of the
    /// [`StorageBackend`](crate::StorageBackend) methods never observe it.
    #[error("Write conflict on watched keys")]
    Conflict,

    /// The bounded conflict-retry loop gave up.
    #[error("Write conflict persisted after {attempts} attempts")]
    ConflictRetriesExhausted {
        /// Total number of attempts made, including the first one.
        attempts: u32,
    },

    /// Connection or network error.
    ///
    /// The backend could not be reached. This is fatal to the in-flight
    /// operation and is not retried by the storage layer.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
        /// The underlying error that caused this connection failure.
        #[source]
        source: Option<BoxError>,
    },

    /// Serialization or deserialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization error.
        message: String,
        /// The underlying error that caused serialization to fail.
        #[source]
        source: Option<BoxError>,
    },

    /// Internal storage backend error.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
        /// The underlying error that caused this internal failure.
        #[source]
        source: Option<BoxError>,
    },

    /// Operation timed out.
    #[error("Operation timeout")]
    Timeout,
}

impl StorageError {
    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict() -> Self {
        Self::Conflict
    }

    /// Creates a new `ConflictRetriesExhausted` error.
    #[must_use]
    pub fn conflict_retries_exhausted(attempts: u32) -> Self {
        Self::ConflictRetriesExhausted { attempts }
    }

    /// Creates a new `Connection` error with the given message.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Creates a new `Connection` error with a message and source error.
    #[must_use]
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Serialization` error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization { message: message.into(), source: None }
    }

    /// Creates a new `Serialization` error with a message and source error.
    #[must_use]
    pub fn serialization_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Serialization { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Internal` error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Creates a new `Internal` error with a message and source error.
    #[must_use]
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout() -> Self {
        Self::Timeout
    }

    /// Returns `true` for errors that a retry of the same batch may resolve.
    ///
    /// Only [`Conflict`](Self::Conflict) qualifies. Connectivity failures are
    /// surfaced to the caller instead of being retried here.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict)
    }

    /// Returns `true` when the backend itself could not be reached.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout)
    }
}
