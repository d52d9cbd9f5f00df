#![allow(clippy::expect_used, clippy::panic)]
//! Integration tests for fail-point injection.
//!
//! These tests require the `failpoints` feature:
//! ```bash
//! cargo test -p playstat-storage --features failpoints --test failpoint_tests
//! ```

use playstat_storage::{MemoryBackend, MetricsCollector, StorageBackend, StorageError};

#[tokio::test]
async fn batch_commit_failpoint_returns_error() {
    let scenario = fail::FailScenario::setup();
    fail::cfg("memory-before-commit", "return").expect("failed to configure fail point");

    let backend = MemoryBackend::new();
    let result = backend.mupdate(&[("c".to_owned(), 1.0)]).await;

    assert!(matches!(result, Err(StorageError::Internal { .. })), "got: {result:?}");
    assert!(backend.is_empty(), "failed commit must not write");
    assert_eq!(backend.metrics().snapshot().error_count, 1);

    scenario.teardown();
}

#[tokio::test]
async fn batch_commit_without_failpoint_succeeds() {
    let scenario = fail::FailScenario::setup();

    let backend = MemoryBackend::new();
    let result = backend.mupdate(&[("c".to_owned(), 1.0)]).await;

    assert_eq!(result.expect("mupdate should succeed"), vec![1.0]);

    scenario.teardown();
}

#[tokio::test]
async fn health_check_failpoint_returns_error() {
    let scenario = fail::FailScenario::setup();
    fail::cfg("health-check", "return").expect("failed to configure fail point");

    let backend = MemoryBackend::new();
    let result = backend.health_check().await;

    assert!(result.is_err(), "health check should fail when fail point is active");

    scenario.teardown();
}

#[tokio::test]
async fn health_check_without_failpoint_succeeds() {
    let scenario = fail::FailScenario::setup();

    let backend = MemoryBackend::new();
    let result = backend.health_check().await;

    assert!(result.is_ok(), "health check should succeed without fail point");

    scenario.teardown();
}
