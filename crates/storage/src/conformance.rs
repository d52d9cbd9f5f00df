//! Conformance test suite for [`StorageBackend`] implementations.
//!
//! Async check functions that validate whether a backend satisfies the trait
//! contract. The in-memory backend and the Redis backend run the same suite.
//!
//! Every check writes under its own key prefix, so the whole suite can run in
//! sequence against one backend instance without checks seeing each other's
//! data.
//!
//! # Usage
//!
//! Enable the `testutil` feature and call each check with a backend:
//!
//! ```no_run
//! use playstat_storage::conformance;
//! use playstat_storage::MemoryBackend;
//!
//! #[tokio::test]
//! async fn scan_missing_prefix_is_empty() {
//!     conformance::scan_missing_prefix_is_empty(&MemoryBackend::new()).await;
//! }
//! ```
//!
//! # Test Categories
//!
//! | Category | Functions | Contract aspect |
//! |----------|-----------|-----------------|
//! | Scan | 5 tests | Prefix matching, ordering, exact-key fast path |
//! | Write | 5 tests | `set` / `mset` overwrite and membership semantics |
//! | Counter | 6 tests | `mupdate` accumulation and atomicity |
//! | Concurrent | 3 tests | No lost updates under parallel writers |
//! | Health | 1 test | `health_check` on a reachable backend |

use std::sync::Arc;

use crate::{
    backend::StorageBackend,
    testutil::{counter_deltas, make_key, make_tagged_value, read_counter},
};

// ============================================================================
// Scan: prefix matching and ordering (5 tests)
// ============================================================================

/// A prefix with no stored keys yields empty results, not an error.
pub async fn scan_missing_prefix_is_empty<B: StorageBackend + ?Sized>(backend: &B) {
    let values = backend.get("conf:scan:none:").await.expect("get should not error");
    assert!(values.is_empty(), "missing prefix should return nothing: {values:?}");
    let keys = backend.get_keys("conf:scan:none:").await.expect("get_keys");
    assert!(keys.is_empty());
}

/// Keys come back in ascending order regardless of write order.
pub async fn scan_results_are_ordered<B: StorageBackend + ?Sized>(backend: &B) {
    for idx in [3, 1, 2] {
        backend.set(make_key("conf:scan:ord", idx), format!("v{idx}")).await.expect("set");
    }
    let keys = backend.get_keys("conf:scan:ord:").await.expect("get_keys");
    assert_eq!(
        keys,
        vec![
            make_key("conf:scan:ord", 1),
            make_key("conf:scan:ord", 2),
            make_key("conf:scan:ord", 3)
        ]
    );
    let values = backend.get("conf:scan:ord:").await.expect("get");
    assert_eq!(values, vec!["v1", "v2", "v3"], "values should follow key order");
}

/// Keys outside the prefix are never returned.
pub async fn scan_prefix_excludes_siblings<B: StorageBackend + ?Sized>(backend: &B) {
    backend.set("conf:scan:sib:a:1".to_owned(), "in".to_owned()).await.expect("set");
    backend.set("conf:scan:sib:b:1".to_owned(), "out".to_owned()).await.expect("set");
    let items = backend.get_items("conf:scan:sib:a:").await.expect("get_items");
    assert_eq!(items.len(), 1);
    assert_eq!(items.get("conf:scan:sib:a:1").map(String::as_str), Some("in"));
}

/// A prefix that is itself a stored key returns only that key.
pub async fn scan_exact_key_excludes_extensions<B: StorageBackend + ?Sized>(backend: &B) {
    backend.set("conf:scan:exact:k".to_owned(), "short".to_owned()).await.expect("set");
    backend.set("conf:scan:exact:k:longer".to_owned(), "long".to_owned()).await.expect("set");

    let keys = backend.get_keys("conf:scan:exact:k").await.expect("get_keys");
    assert_eq!(keys, vec!["conf:scan:exact:k"], "exact match should shadow longer keys");

    let keys = backend.get_keys("conf:scan:exact:").await.expect("get_keys");
    assert_eq!(keys.len(), 2, "a non-key prefix still matches both");
}

/// Glob metacharacters in a prefix are matched literally.
pub async fn scan_prefix_with_glob_characters<B: StorageBackend + ?Sized>(backend: &B) {
    backend.set("conf:scan:glob:[a]*?:1".to_owned(), "literal".to_owned()).await.expect("set");
    backend.set("conf:scan:glob:a:1".to_owned(), "other".to_owned()).await.expect("set");

    let values = backend.get("conf:scan:glob:[a]*?:").await.expect("get");
    assert_eq!(values, vec!["literal"]);
}

// ============================================================================
// Write: overwrite and membership semantics (5 tests)
// ============================================================================

/// `set` then `get` round-trips the value.
pub async fn set_then_get_returns_value<B: StorageBackend + ?Sized>(backend: &B) {
    backend.set("conf:set:k1".to_owned(), "v1".to_owned()).await.expect("set");
    let values = backend.get("conf:set:k1").await.expect("get");
    assert_eq!(values, vec!["v1"]);
}

/// `set` on an existing key overwrites the value.
pub async fn set_overwrites_existing<B: StorageBackend + ?Sized>(backend: &B) {
    backend.set("conf:set:ow".to_owned(), "original".to_owned()).await.expect("set");
    backend.set("conf:set:ow".to_owned(), "updated".to_owned()).await.expect("overwrite");
    let values = backend.get("conf:set:ow").await.expect("get");
    assert_eq!(values, vec!["updated"]);
}

/// Written keys are registered in the membership set; unknown keys are not.
pub async fn set_registers_membership<B: StorageBackend + ?Sized>(backend: &B) {
    assert!(!backend.contains("conf:set:member").await.expect("contains"));
    backend.set("conf:set:member".to_owned(), "v".to_owned()).await.expect("set");
    assert!(backend.contains("conf:set:member").await.expect("contains"));
    assert!(!backend.contains("conf:set:member:other").await.expect("contains"));
}

/// `mset` with unequal list lengths reports `false` and writes nothing.
pub async fn mset_length_mismatch_writes_nothing<B: StorageBackend + ?Sized>(backend: &B) {
    let keys = vec!["conf:mset:bad:a".to_owned(), "conf:mset:bad:b".to_owned()];
    let written = backend.mset(keys, vec!["1".to_owned()]).await.expect("mset");
    assert!(!written, "mismatched lengths should be rejected");
    assert!(backend.get("conf:mset:bad:").await.expect("get").is_empty());
    assert!(!backend.contains("conf:mset:bad:a").await.expect("contains"));
}

/// `mset` writes every pair and registers every key.
pub async fn mset_writes_all<B: StorageBackend + ?Sized>(backend: &B) {
    let keys: Vec<String> = (0..4).map(|i| make_key("conf:mset:ok", i)).collect();
    let values: Vec<String> = (0..4).map(|i| make_tagged_value(0, i)).collect();
    let written = backend.mset(keys.clone(), values.clone()).await.expect("mset");
    assert!(written);
    assert_eq!(backend.get("conf:mset:ok:").await.expect("get"), values);
    for key in &keys {
        assert!(backend.contains(key).await.expect("contains"), "{key} should be a member");
    }
}

// ============================================================================
// Counter: mupdate accumulation and atomicity (6 tests)
// ============================================================================

/// Absent counters start at zero.
pub async fn mupdate_absent_starts_at_zero<B: StorageBackend + ?Sized>(backend: &B) {
    let values = backend
        .mupdate(&counter_deltas(&[("conf:cnt:zero:a", 1.0), ("conf:cnt:zero:b", 2.5)]))
        .await
        .expect("mupdate");
    assert_eq!(values, vec![1.0, 2.5]);
}

/// Repeated updates accumulate and the stored text parses back to the total.
pub async fn mupdate_accumulates<B: StorageBackend + ?Sized>(backend: &B) {
    for _ in 0..3 {
        backend.mupdate(&counter_deltas(&[("conf:cnt:acc", 2.0)])).await.expect("mupdate");
    }
    let values = backend.mupdate(&counter_deltas(&[("conf:cnt:acc", 0.5)])).await.expect("mupdate");
    assert_eq!(values, vec![6.5]);
    assert_eq!(read_counter(backend, "conf:cnt:acc").await.expect("read"), Some(6.5));
}

/// A key listed twice in one call is incremented twice.
pub async fn mupdate_repeated_key_in_batch<B: StorageBackend + ?Sized>(backend: &B) {
    let values = backend
        .mupdate(&counter_deltas(&[("conf:cnt:dup", 1.0), ("conf:cnt:dup", 2.0)]))
        .await
        .expect("mupdate");
    assert_eq!(values, vec![1.0, 3.0]);
    assert_eq!(read_counter(backend, "conf:cnt:dup").await.expect("read"), Some(3.0));
}

/// An empty delta list is a no-op returning no values.
pub async fn mupdate_empty_is_noop<B: StorageBackend + ?Sized>(backend: &B) {
    let values = backend.mupdate(&[]).await.expect("mupdate");
    assert!(values.is_empty());
}

/// Counters written by `mupdate` are registered in the membership set.
pub async fn mupdate_registers_membership<B: StorageBackend + ?Sized>(backend: &B) {
    backend.mupdate(&counter_deltas(&[("conf:cnt:member", 1.0)])).await.expect("mupdate");
    assert!(backend.contains("conf:cnt:member").await.expect("contains"));
}

/// A non-numeric counter fails the whole batch and leaves every key untouched.
pub async fn mupdate_non_numeric_counter_fails_atomically<B: StorageBackend + ?Sized>(
    backend: &B,
) {
    backend.set("conf:cnt:bad:text".to_owned(), "{}".to_owned()).await.expect("set");
    backend.mupdate(&counter_deltas(&[("conf:cnt:bad:num", 1.0)])).await.expect("seed");

    let result = backend
        .mupdate(&counter_deltas(&[("conf:cnt:bad:num", 1.0), ("conf:cnt:bad:text", 1.0)]))
        .await;
    crate::assert_serialization_error!(result);
    assert_eq!(read_counter(backend, "conf:cnt:bad:num").await.expect("read"), Some(1.0));
    assert_eq!(backend.get("conf:cnt:bad:text").await.expect("get"), vec!["{}"]);
}

// ============================================================================
// Concurrent: no lost updates under parallel writers (3 tests)
// ============================================================================

/// N concurrent `+1` updates on one key leave it at exactly N.
pub async fn concurrent_increments_same_key<B: StorageBackend + ?Sized + 'static>(
    backend: Arc<B>,
) {
    const WRITERS: usize = 16;
    let mut handles = Vec::new();
    for _ in 0..WRITERS {
        let backend = Arc::clone(&backend);
        handles.push(tokio::spawn(async move {
            backend.mupdate(&counter_deltas(&[("conf:conc:same", 1.0)])).await
        }));
    }
    let mut observed = Vec::new();
    for handle in handles {
        let values = handle.await.expect("task join").expect("mupdate");
        observed.push(values[0]);
    }

    assert_eq!(
        read_counter(backend.as_ref(), "conf:conc:same").await.expect("read"),
        Some(WRITERS as f64)
    );
    observed.sort_by(f64::total_cmp);
    let expected: Vec<f64> = (1..=WRITERS).map(|n| n as f64).collect();
    assert_eq!(observed, expected, "every writer should observe a distinct intermediate total");
}

/// Concurrent writers on disjoint keys all succeed.
pub async fn concurrent_increments_disjoint_keys<B: StorageBackend + ?Sized + 'static>(
    backend: Arc<B>,
) {
    let mut handles = Vec::new();
    for task in 0..8 {
        let backend = Arc::clone(&backend);
        handles.push(tokio::spawn(async move {
            let key = make_key("conf:conc:disjoint", task);
            for _ in 0..5 {
                backend.mupdate(&[(key.clone(), 1.0)]).await.expect("mupdate");
            }
        }));
    }
    for handle in handles {
        handle.await.expect("task join");
    }
    for task in 0..8 {
        let key = make_key("conf:conc:disjoint", task);
        assert_eq!(read_counter(backend.as_ref(), &key).await.expect("read"), Some(5.0));
    }
}

/// Overlapping multi-key batches keep every counter's total intact.
pub async fn concurrent_overlapping_batches<B: StorageBackend + ?Sized + 'static>(
    backend: Arc<B>,
) {
    let mut handles = Vec::new();
    for task in 0..8 {
        let backend = Arc::clone(&backend);
        handles.push(tokio::spawn(async move {
            let own = make_key("conf:conc:overlap:own", task);
            let deltas = vec![("conf:conc:overlap:shared".to_owned(), 1.0), (own, 2.0)];
            backend.mupdate(&deltas).await.expect("mupdate");
        }));
    }
    for handle in handles {
        handle.await.expect("task join");
    }
    assert_eq!(
        read_counter(backend.as_ref(), "conf:conc:overlap:shared").await.expect("read"),
        Some(8.0)
    );
    let owned = backend.get("conf:conc:overlap:own:").await.expect("get");
    assert_eq!(owned, vec!["2"; 8]);
}

// ============================================================================
// Health (1 test)
// ============================================================================

/// `health_check` succeeds on a reachable backend.
pub async fn health_check_succeeds<B: StorageBackend + ?Sized>(backend: &B) {
    backend.health_check().await.expect("health_check should succeed");
}

// ============================================================================
// Convenience runner: run all conformance tests against a single backend
// ============================================================================

/// Run the full conformance suite against the given backend.
///
/// ```no_run
/// use std::sync::Arc;
/// use playstat_storage::conformance;
/// use playstat_storage::MemoryBackend;
///
/// #[tokio::test]
/// async fn memory_backend_conformance() {
///     conformance::run_all(Arc::new(MemoryBackend::new())).await;
/// }
/// ```
pub async fn run_all<B: StorageBackend + ?Sized + 'static>(backend: Arc<B>) {
    // Scan
    scan_missing_prefix_is_empty(backend.as_ref()).await;
    scan_results_are_ordered(backend.as_ref()).await;
    scan_prefix_excludes_siblings(backend.as_ref()).await;
    scan_exact_key_excludes_extensions(backend.as_ref()).await;
    scan_prefix_with_glob_characters(backend.as_ref()).await;

    // Write
    set_then_get_returns_value(backend.as_ref()).await;
    set_overwrites_existing(backend.as_ref()).await;
    set_registers_membership(backend.as_ref()).await;
    mset_length_mismatch_writes_nothing(backend.as_ref()).await;
    mset_writes_all(backend.as_ref()).await;

    // Counter
    mupdate_absent_starts_at_zero(backend.as_ref()).await;
    mupdate_accumulates(backend.as_ref()).await;
    mupdate_repeated_key_in_batch(backend.as_ref()).await;
    mupdate_empty_is_noop(backend.as_ref()).await;
    mupdate_registers_membership(backend.as_ref()).await;
    mupdate_non_numeric_counter_fails_atomically(backend.as_ref()).await;

    // Concurrent
    concurrent_increments_same_key(Arc::clone(&backend)).await;
    concurrent_increments_disjoint_keys(Arc::clone(&backend)).await;
    concurrent_overlapping_batches(Arc::clone(&backend)).await;

    // Health
    health_check_succeeds(backend.as_ref()).await;
}
