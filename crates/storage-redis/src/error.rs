//! Error types for the Redis storage backend.
//!
//! This module maps the `redis` client's errors onto the generic
//! [`StorageError`](playstat_storage::StorageError) taxonomy.

use playstat_storage::StorageError;
use redis::{ErrorKind, RedisError};
use thiserror::Error;

/// Result type alias for Redis backend construction.
pub type Result<T> = std::result::Result<T, RedisStorageError>;

/// Errors specific to the Redis storage backend.
#[derive(Debug, Error)]
pub enum RedisStorageError {
    /// Error reported by the Redis client.
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<RedisStorageError> for StorageError {
    fn from(err: RedisStorageError) -> Self {
        match err {
            RedisStorageError::Redis(source) => redis_error_to_storage_error(source),
            RedisStorageError::Config(message) => {
                StorageError::internal(format!("Config: {message}"))
            },
        }
    }
}

/// Converts a client error to a storage error.
///
/// Unreachable servers become `Connection` or `Timeout`, replies of the wrong
/// type become `Serialization`, and everything else is `Internal`.
pub(crate) fn redis_error_to_storage_error(err: RedisError) -> StorageError {
    if err.is_timeout() {
        tracing::warn!(error = %err, "Redis operation timed out");
        return StorageError::timeout();
    }
    if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() {
        return StorageError::connection_with_source("Redis server unreachable", err);
    }
    match err.kind() {
        ErrorKind::TypeError => {
            StorageError::serialization_with_source("Unexpected reply type", err)
        },
        ErrorKind::AuthenticationFailed => {
            StorageError::connection_with_source("Redis authentication failed", err)
        },
        _ => StorageError::internal_with_source("Redis command failed", err),
    }
}
