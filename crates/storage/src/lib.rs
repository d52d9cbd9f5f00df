//! Shared storage backend abstraction for playstat services.
//!
//! This crate provides the [`StorageBackend`] trait and related types that form
//! the foundation for every read and write the telemetry engine performs. The
//! ingestion and query paths are written once against the trait and run
//! unchanged on any backend.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     playstat-engine                         │
//! │        MetricIngester │ QueryAggregator │ KeyNamespace      │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    playstat-storage                         │
//! │                  StorageBackend trait                       │
//! │  (get, get_keys, get_items, set, mset, contains, mupdate)   │
//! ├──────────────┬──────────────────────────────────────────────┤
//! │ MemoryBackend│            RedisBackend                      │
//! │ (in-process) │  (playstat-storage-redis, shared server)     │
//! └──────────────┴──────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use playstat_storage::{MemoryBackend, StorageBackend};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = MemoryBackend::new();
//!
//!     // Store a document
//!     backend.set("ORGE:S3:ios:a.mp4:1".to_owned(), "{}".to_owned()).await?;
//!
//!     // Bump two counters atomically
//!     let totals = backend
//!         .mupdate(&[("hits:ios".to_owned(), 1.0), ("hits:all".to_owned(), 1.0)])
//!         .await?;
//!     assert_eq!(totals, vec![1.0, 1.0]);
//!
//!     // Scan by prefix
//!     assert_eq!(backend.get_keys("hits:").await?, vec!["hits:all", "hits:ios"]);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Available Backends
//!
//! | Backend | Use Case | Persistence |
//! |---------|----------|-------------|
//! | [`MemoryBackend`] | Testing, single process | No |
//! | `RedisBackend` (in `playstat-storage-redis`) | Production, multi-process | Yes |
//!
//! # Error Handling
//!
//! All operations return [`StorageResult<T>`], which wraps potential
//! [`StorageError`] variants. Backends map their internal errors to these
//! standardized error types.
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` and `conformance` modules with shared test helpers and
//!   the backend conformance suite. Enable this in `[dev-dependencies]` for integration tests.
//! - **`failpoints`**: Compiles in the `fail` crate's injection points.

#![deny(unsafe_code)]

pub mod backend;
pub mod batch;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod conformance;
pub mod error;
pub mod memory;
pub mod metrics;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;

// Re-export primary types at crate root for convenience
pub use backend::StorageBackend;
pub use batch::{BatchOperation, StagedWrites, WriteBatch, format_counter, parse_counter};
pub use error::{BoxError, StorageError, StorageResult};
pub use memory::MemoryBackend;
pub use metrics::{LatencyPercentiles, Metrics, MetricsCollector, MetricsSnapshot};
