//! Shared test utilities for storage backend testing.
//!
//! Helpers for building test keys, seeding backends and asserting on
//! [`StorageResult`] values. Feature-gated behind `testutil` so none of it
//! leaks into production builds.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! playstat-storage = { path = "../storage", features = ["testutil"] }
//! ```
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use playstat_storage::testutil::{counter_deltas, make_key, populated_backend};
//! ```

use crate::{
    StorageBackend,
    error::{StorageError, StorageResult},
    memory::MemoryBackend,
};

/// Create a deterministic test key from a prefix and index.
///
/// Produces keys like `"prefix:000042"`. The zero-padding keeps
/// lexicographic order equal to numeric order.
#[must_use]
pub fn make_key(prefix: &str, idx: usize) -> String {
    format!("{prefix}:{idx:06}")
}

/// Create a test value tagged with a task ID and sequence number.
///
/// Produces values like `"task3-val042"`, for concurrent tests that need to
/// know which task wrote which value.
#[must_use]
pub fn make_tagged_value(task: usize, seq: usize) -> String {
    format!("task{task}-val{seq}")
}

/// Builds an owned delta list from borrowed pairs.
#[must_use]
pub fn counter_deltas(pairs: &[(&str, f64)]) -> Vec<(String, f64)> {
    pairs.iter().map(|(key, delta)| ((*key).to_owned(), *delta)).collect()
}

/// Create a [`MemoryBackend`] pre-populated with `count` keys.
///
/// Keys come from [`make_key`] and every value is `"value-{idx}"`.
///
/// # Panics
///
/// Panics if any `set` operation fails (should not happen with `MemoryBackend`).
pub async fn populated_backend(prefix: &str, count: usize) -> MemoryBackend {
    let backend = MemoryBackend::new();
    let keys: Vec<String> = (0..count).map(|i| make_key(prefix, i)).collect();
    let values: Vec<String> = (0..count).map(|i| format!("value-{i}")).collect();
    let written = backend.mset(keys, values).await.expect("populate mset failed");
    assert!(written, "populate mset rejected equal-length lists");
    backend
}

/// Reads a single counter, returning `None` when it is absent.
///
/// # Panics
///
/// Panics if the stored value is not a number.
pub async fn read_counter<B: StorageBackend + ?Sized>(
    backend: &B,
    key: &str,
) -> StorageResult<Option<f64>> {
    let items = backend.get_items(key).await?;
    Ok(items.get(key).map(|raw| raw.parse().expect("counter holds a number")))
}

/// Assert that a [`StorageResult`] is `Ok`.
///
/// Returns the inner value on success, panics with a descriptive message
/// on failure.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use playstat_storage::assert_storage_ok;
/// use playstat_storage::error::StorageResult;
///
/// let result: StorageResult<i32> = Ok(42);
/// let value = assert_storage_ok!(result);
/// assert_eq!(value, 42);
/// ```
#[macro_export]
macro_rules! assert_storage_ok {
    ($result:expr) => {
        match $result {
            Ok(val) => val,
            Err(e) => panic!("expected Ok, got StorageError: {e:?}"),
        }
    };
    ($result:expr, $msg:expr) => {
        match $result {
            Ok(val) => val,
            Err(e) => panic!("{}: expected Ok, got StorageError: {e:?}", $msg),
        }
    };
}

/// Assert that a [`StorageResult`] is a [`StorageError::Serialization`].
#[macro_export]
macro_rules! assert_serialization_error {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::Serialization { .. })),
            "expected StorageError::Serialization, got: {:?}",
            $result,
        );
    };
}

/// Returns `true` if the result is a conflict-retry exhaustion.
pub fn is_retries_exhausted<T>(result: &StorageResult<T>) -> bool {
    matches!(result, Err(StorageError::ConflictRetriesExhausted { .. }))
}
