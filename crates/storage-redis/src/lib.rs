//! Redis-backed implementation of [`StorageBackend`](playstat_storage::StorageBackend).
//!
//! This crate provides [`RedisBackend`], the shared storage backend that lets
//! many ingesting processes bump the same counters concurrently without losing
//! updates.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     playstat-engine                         │
//! │            MetricIngester │ QueryAggregator                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │                     RedisBackend                            │
//! │         (implements StorageBackend trait)                   │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │   ConnectionManager (reads)  │ dedicated connection (write) │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │                     Redis server                            │
//! │      string values │ membership set (`__MEMS__`)            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! // Requires a running Redis server.
//! use playstat_storage::StorageBackend;
//! use playstat_storage_redis::{RedisBackend, RedisBackendConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RedisBackendConfig::builder().url("redis://localhost:6379/0").build()?;
//!     let backend = RedisBackend::new(config).await?;
//!
//!     backend.set("ORGE:S3:ios:a.mp4:1".to_owned(), "{}".to_owned()).await?;
//!     let keys = backend.get_keys("ORGE:S3:").await?;
//!     assert!(keys.contains(&"ORGE:S3:ios:a.mp4:1".to_owned()));
//!
//!     Ok(())
//! }
//! ```
//!
//! # Command Mapping
//!
//! | StorageBackend      | Redis                                                        |
//! | ------------------- | ------------------------------------------------------------ |
//! | `get_items(prefix)` | `GET prefix`, else `SSCAN members MATCH prefix*` + `MGET`    |
//! | `contains(key)`     | `SISMEMBER members key`                                      |
//! | `apply_batch(ops)`  | `WATCH` + `MGET` + `MULTI` / `SET`... / `SADD` / `EXEC`      |
//! | `health_check()`    | `PING`                                                       |
//!
//! # Consistency Model
//!
//! Batches are all-or-nothing. Increments are computed client-side from the
//! values read under `WATCH`, so a batch either commits against exactly the
//! values it read or aborts and is replayed. Reads are not isolated from
//! concurrent writers: a prefix scan may observe one batch's writes partially.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod config;
mod error;
mod keys;
mod retry;

/// Redis-backed storage backend.
pub use backend::RedisBackend;
/// Configuration types and default constants for the Redis backend.
pub use config::{
    ConflictRetryConfig, DEFAULT_CONFLICT_BASE_DELAY, DEFAULT_CONFLICT_MAX_DELAY,
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_CONFLICT_RETRIES, DEFAULT_MEMBER_SET_KEY,
    DEFAULT_RESPONSE_TIMEOUT, RedisBackendConfig,
};
/// Redis-specific error types and result alias.
pub use error::{RedisStorageError, Result};
