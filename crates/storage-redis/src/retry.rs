//! Bounded retry for optimistic-concurrency conflicts.
//!
//! Every atomic write against Redis watches its keys, stages its mutations and
//! commits with `EXEC`. A concurrent writer touching a watched key makes the
//! commit abort; the whole watch/stage/commit cycle is then replayed with the
//! same inputs. [`with_conflict_retry`] runs that loop.
//!
//! # Backoff Strategy
//!
//! Retries use exponential backoff with jitter:
//! - The delay doubles with each attempt: `base_delay * 2^attempt`
//! - The delay is capped at `max_delay`
//! - Random jitter of 0-100% of the computed delay is added
//!
//! Writers that collided on the same keys (or on the membership set) wake at
//! different times, and a crowd of writers thins out as the delays grow.

use std::{future::Future, time::Duration};

use fail::fail_point;
use playstat_storage::{Metrics, StorageError, StorageResult};
use rand::Rng;

use crate::config::ConflictRetryConfig;

/// Re-runs `operation` while it fails with [`StorageError::Conflict`].
///
/// Non-conflict errors are returned immediately without retry. Returns
/// [`StorageError::ConflictRetriesExhausted`] when all
/// `config.max_retries + 1` attempts conflict.
///
/// # Metrics
///
/// When `metrics` is provided, every conflict increments `conflict_count`,
/// every replay increments `retry_count`, and giving up increments
/// `retry_exhausted_count`.
#[tracing::instrument(skip(config, metrics, operation), fields(max_retries = config.max_retries))]
pub(crate) async fn with_conflict_retry<F, Fut, T>(
    config: &ConflictRetryConfig,
    metrics: Option<&Metrics>,
    operation_name: &str,
    mut operation: F,
) -> StorageResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StorageResult<T>>,
{
    let attempts = config.max_retries.saturating_add(1);
    for attempt in 0..attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(StorageError::Conflict) => {
                if let Some(m) = metrics {
                    m.record_conflict();
                }
                if attempt + 1 == attempts {
                    break;
                }
                let delay = compute_backoff(config, attempt);
                tracing::debug!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Write conflict, retrying after backoff",
                );
                if let Some(m) = metrics {
                    m.record_retry();
                }
                fail_point!("conflict-retry-before-sleep");
                tokio::time::sleep(delay).await;
            },
            Err(e) => return Err(e),
        }
    }

    if let Some(m) = metrics {
        m.record_retry_exhausted();
    }
    tracing::warn!(operation = operation_name, attempts, "Write conflict retries exhausted");
    Err(StorageError::conflict_retries_exhausted(attempts))
}

/// Computes the sleep before the retry that follows `attempt`.
///
/// `min(base_delay * 2^attempt, max_delay) + random(0..=that)`, measured in
/// microseconds so millisecond-scale delays still get jitter.
fn compute_backoff(config: &ConflictRetryConfig, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    let capped = config.base_delay.saturating_mul(factor).min(config.max_delay);

    let jitter_range = capped.as_micros() as u64;
    if jitter_range == 0 {
        return capped;
    }
    capped + Duration::from_micros(rand::rng().random_range(0..=jitter_range))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast(max_retries: u32) -> ConflictRetryConfig {
        ConflictRetryConfig::builder()
            .max_retries(max_retries)
            .base_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(4))
            .build()
    }

    fn backoff(base_ms: u64, max_ms: u64) -> ConflictRetryConfig {
        ConflictRetryConfig::builder()
            .base_delay(Duration::from_millis(base_ms))
            .max_delay(Duration::from_millis(max_ms))
            .build()
    }

    #[test]
    fn test_compute_backoff_exponential() {
        let config = backoff(2, 1_000);

        for (attempt, expected_ms) in [(0, 2), (1, 4), (2, 8), (5, 64)] {
            let expected = Duration::from_millis(expected_ms);
            for _ in 0..50 {
                let delay = compute_backoff(&config, attempt);
                assert!(
                    delay >= expected && delay <= expected * 2,
                    "attempt {attempt}: delay {delay:?} outside [{expected:?}, 2x]"
                );
            }
        }
    }

    #[test]
    fn test_compute_backoff_capped_at_max() {
        let config = backoff(2, 50);

        for attempt in [6, 10, 31, 32, 200] {
            let delay = compute_backoff(&config, attempt);
            assert!(delay >= Duration::from_millis(50), "attempt {attempt}: {delay:?}");
            assert!(delay <= Duration::from_millis(100), "attempt {attempt}: {delay:?}");
        }
    }

    #[test]
    fn test_compute_backoff_jitter_varies() {
        let config = backoff(8, 8);
        let delays: std::collections::HashSet<Duration> =
            (0..64).map(|_| compute_backoff(&config, 0)).collect();
        assert!(delays.len() > 1, "jitter should spread delays, got {delays:?}");
    }

    #[test]
    fn test_compute_backoff_zero_base() {
        let config = backoff(0, 50);
        assert_eq!(compute_backoff(&config, 0), Duration::ZERO);
        assert_eq!(compute_backoff(&config, 10), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_succeeds_first_attempt() {
        let call_count = AtomicU32::new(0);

        let result = with_conflict_retry(&ConflictRetryConfig::default(), None, "test", || {
            call_count.fetch_add(1, Ordering::Relaxed);
            async { Ok(7) }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(call_count.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_succeeds_after_conflict() {
        let metrics = Metrics::new();
        let call_count = AtomicU32::new(0);

        let result = with_conflict_retry(&fast(3), Some(&metrics), "test", || {
            let attempt = call_count.fetch_add(1, Ordering::Relaxed);
            async move { if attempt < 2 { Err(StorageError::conflict()) } else { Ok(()) } }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(call_count.load(Ordering::Relaxed), 3); // 2 conflicts + 1 success
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.conflict_count, 2);
        assert_eq!(snapshot.retry_count, 2);
        assert_eq!(snapshot.retry_exhausted_count, 0);
    }

    #[tokio::test]
    async fn test_exhausted_returns_conflict_retries_exhausted() {
        let metrics = Metrics::new();
        let call_count = AtomicU32::new(0);

        let result: StorageResult<()> = with_conflict_retry(&fast(2), Some(&metrics), "test", || {
            call_count.fetch_add(1, Ordering::Relaxed);
            async { Err(StorageError::conflict()) }
        })
        .await;

        assert!(
            matches!(result, Err(StorageError::ConflictRetriesExhausted { attempts: 3 })),
            "expected ConflictRetriesExhausted with 3 attempts, got: {result:?}",
        );
        assert_eq!(call_count.load(Ordering::Relaxed), 3); // 1 initial + 2 retries
        assert_eq!(metrics.snapshot().retry_exhausted_count, 1);
        assert_eq!(metrics.snapshot().retry_count, 2);
    }

    #[tokio::test]
    async fn test_non_conflict_error_not_retried() {
        let call_count = AtomicU32::new(0);

        let result: StorageResult<()> = with_conflict_retry(&fast(5), None, "test", || {
            call_count.fetch_add(1, Ordering::Relaxed);
            async { Err(StorageError::connection("down")) }
        })
        .await;

        assert!(matches!(result, Err(StorageError::Connection { .. })));
        assert_eq!(call_count.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_zero_max_retries_makes_one_attempt() {
        let call_count = AtomicU32::new(0);

        let result: StorageResult<()> = with_conflict_retry(&fast(0), None, "test", || {
            call_count.fetch_add(1, Ordering::Relaxed);
            async { Err(StorageError::conflict()) }
        })
        .await;

        assert!(matches!(result, Err(StorageError::ConflictRetriesExhausted { attempts: 1 })));
        assert_eq!(call_count.load(Ordering::Relaxed), 1);
    }

    #[cfg(feature = "failpoints")]
    #[tokio::test]
    async fn test_failpoint_before_sleep_can_abort_retry() {
        let scenario = fail::FailScenario::setup();
        fail::cfg("conflict-retry-before-sleep", "panic").unwrap();

        let handle = tokio::spawn(async {
            with_conflict_retry(&fast(1), None, "test", || async {
                StorageResult::<()>::Err(StorageError::conflict())
            })
            .await
        });
        assert!(handle.await.is_err(), "fail point should panic the retry task");

        scenario.teardown();
    }
}
