//! Storage backend trait definition.
//!
//! This module defines the [`StorageBackend`] trait, the capability interface
//! every playstat storage variant implements. Callers hold an
//! `Arc<dyn StorageBackend>` and never name the concrete backend.
//!
//! # Design
//!
//! - **Text keys and values**: keys and values cross this boundary as UTF-8 `String`s. Counter
//!   values are stored as decimal text and parsed as `f64`, so every backend returns the same
//!   representation for the same data.
//! - **Prefix scans**: reads address a key prefix; the empty prefix addresses everything.
//! - **Atomic batches**: every write is a [`WriteBatch`] applied as one indivisible unit together
//!   with the registration of its keys in the membership set.
//!
//! # Implementing a Backend
//!
//! 1. Implement [`get_items`](StorageBackend::get_items),
//!    [`contains`](StorageBackend::contains), [`apply_batch`](StorageBackend::apply_batch) and
//!    [`health_check`](StorageBackend::health_check)
//! 2. Override the provided scan methods when the backend can answer them more cheaply
//! 3. Map backend-specific errors to [`StorageError`](crate::StorageError)
//!
//! See [`MemoryBackend`](crate::MemoryBackend) for a reference implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::{batch::WriteBatch, error::StorageResult};

/// Abstract storage backend for prefix-addressed text values and counters.
///
/// Backends are expected to be thread-safe (`Send + Sync`) and to support
/// any number of concurrent callers.
///
/// # Key Operations
///
/// | Method | Description |
/// |--------|-------------|
/// | [`get`](StorageBackend::get) | Values under a prefix |
/// | [`get_keys`](StorageBackend::get_keys) | Keys under a prefix |
/// | [`get_items`](StorageBackend::get_items) | Key/value pairs under a prefix |
/// | [`set`](StorageBackend::set) | Overwrite one key |
/// | [`mset`](StorageBackend::mset) | Overwrite several keys at once |
/// | [`contains`](StorageBackend::contains) | Membership-set lookup |
/// | [`mupdate`](StorageBackend::mupdate) | Atomic multi-counter increment |
/// | [`apply_batch`](StorageBackend::apply_batch) | Commit a staged [`WriteBatch`] |
///
/// # Example
///
/// ```
/// use playstat_storage::{MemoryBackend, StorageBackend};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let backend = MemoryBackend::new();
///
/// let values = backend
///     .mupdate(&[("hits:a".to_owned(), 1.0), ("hits:b".to_owned(), 2.0)])
///     .await
///     .unwrap();
/// assert_eq!(values, vec![1.0, 2.0]);
/// assert_eq!(backend.get_keys("hits:").await.unwrap(), vec!["hits:a", "hits:b"]);
/// # });
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Returns the values of every key under `prefix`, ordered by key.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get(&self, prefix: &str) -> StorageResult<Vec<String>> {
        Ok(self.get_items(prefix).await?.into_values().collect())
    }

    /// Returns every key under `prefix`, in ascending order.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get_keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        Ok(self.get_items(prefix).await?.into_keys().collect())
    }

    /// Returns every key/value pair under `prefix`.
    ///
    /// # Semantics
    ///
    /// - The empty prefix returns the whole store.
    /// - If `prefix` is itself a stored key, only that entry is returned, even when longer keys
    ///   extend it. Metric family names may coincide with the start of a stored key, and a point
    ///   lookup must not drag those longer keys in.
    /// - The backend's own bookkeeping keys (the membership set) are never returned.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get_items(&self, prefix: &str) -> StorageResult<BTreeMap<String, String>>;

    /// Overwrites `key` with `value` and registers `key` in the membership set.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn set(&self, key: String, value: String) -> StorageResult<()> {
        let mut batch = WriteBatch::new();
        batch.set(key, value);
        self.apply_batch(&batch).await.map(|_| ())
    }

    /// Overwrites several keys at once.
    ///
    /// Returns `Ok(false)` without writing anything when `keys` and `values`
    /// differ in length.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn mset(&self, keys: Vec<String>, values: Vec<String>) -> StorageResult<bool> {
        let Some(batch) = WriteBatch::from_pairs(keys, values) else {
            return Ok(false);
        };
        if !batch.is_empty() {
            self.apply_batch(&batch).await?;
        }
        Ok(true)
    }

    /// Returns `true` if `key` was ever registered in the membership set.
    ///
    /// This consults the membership set, not the scanned key space.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn contains(&self, key: &str) -> StorageResult<bool>;

    /// Atomically adds each delta to its counter.
    ///
    /// Absent counters start at zero. All touched keys are registered in the
    /// membership set within the same atomic unit. Returns the resulting
    /// counter values in input order. A key listed twice is incremented twice.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn mupdate(&self, deltas: &[(String, f64)]) -> StorageResult<Vec<f64>> {
        if deltas.is_empty() {
            return Ok(Vec::new());
        }
        self.apply_batch(&WriteBatch::from_increments(deltas)).await
    }

    /// Commits a staged batch as one all-or-nothing unit.
    ///
    /// The batch is linearizable with respect to every other batch touching
    /// an overlapping key set. Returns the new value of every
    /// [`Increment`](crate::batch::BatchOperation::Increment) in batch order.
    ///
    /// Write conflicts are resolved inside the backend and never surface as
    /// [`StorageError::Conflict`](crate::StorageError::Conflict).
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn apply_batch(&self, batch: &WriteBatch) -> StorageResult<Vec<f64>>;

    /// Verifies the backend can serve requests.
    #[must_use = "health check results indicate backend availability and must be inspected"]
    async fn health_check(&self) -> StorageResult<()>;
}
