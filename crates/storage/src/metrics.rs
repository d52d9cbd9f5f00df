//! Storage metrics collection and monitoring
//!
//! Backends record into a shared [`Metrics`] handle:
//!
//! - Operation counts (prefix scans, membership lookups, committed batches)
//! - Operation latencies (cumulative microseconds and p50/p95/p99 percentiles)
//! - Batch sizes (staged operations per committed batch)
//! - Errors, write conflicts and conflict retries
//!
//! # Memory Ordering
//!
//! Every counter is independent and monotonically increasing, so all atomics
//! use `Ordering::Relaxed`. A [`snapshot`](Metrics::snapshot) reads the counters
//! one after another and may observe them at slightly different instants.
//! [`reset`](Metrics::reset) may lose an increment that races with it.
//!
//! # Percentile Tracking
//!
//! Scans and batches each keep a circular window of the most recent 1024
//! latency samples. Percentiles are computed at snapshot time by sorting a copy
//! of the window, keeping the recording path at a single O(1) push.
//!
//! # Usage
//!
//! ```
//! use std::time::Duration;
//! use playstat_storage::metrics::Metrics;
//!
//! let metrics = Metrics::new();
//!
//! metrics.record_scan(Duration::from_micros(100));
//! metrics.record_batch(Duration::from_micros(200), 3);
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.scan_count, 1);
//! assert_eq!(snapshot.batch_operations, 3);
//! assert_eq!(snapshot.avg_scan_latency_us(), 100.0);
//! assert_eq!(snapshot.batch_percentiles.p50, 200);
//! ```

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use tracing::warn;

/// Default number of latency samples retained per operation type.
const DEFAULT_HISTOGRAM_WINDOW_SIZE: usize = 1024;

/// Latency percentiles for a single operation type, in microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencyPercentiles {
    /// 50th percentile (median) latency in microseconds.
    pub p50: u64,
    /// 95th percentile latency in microseconds.
    pub p95: u64,
    /// 99th percentile latency in microseconds.
    pub p99: u64,
}

// ── LatencyHistogram ────────────────────────────────────────────────────

/// A bounded circular buffer of recent latency samples.
pub(crate) struct LatencyHistogram {
    inner: Mutex<HistogramInner>,
}

struct HistogramInner {
    buf: Vec<u64>,
    pos: usize,
    capacity: usize,
}

impl LatencyHistogram {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(HistogramInner {
                buf: Vec::with_capacity(capacity),
                pos: 0,
                capacity: capacity.max(1),
            }),
        }
    }

    pub(crate) fn record(&self, value_us: u64) {
        let mut inner = self.inner.lock();
        let pos = inner.pos;
        if inner.buf.len() < inner.capacity {
            inner.buf.push(value_us);
        } else {
            inner.buf[pos] = value_us;
        }
        inner.pos = (pos + 1) % inner.capacity;
    }

    /// Returns all zeros when nothing has been recorded.
    pub(crate) fn percentiles(&self) -> LatencyPercentiles {
        let mut sorted = self.inner.lock().buf.clone();
        if sorted.is_empty() {
            return LatencyPercentiles::default();
        }
        sorted.sort_unstable();
        let len = sorted.len();
        LatencyPercentiles {
            p50: sorted[percentile_index(len, 50)],
            p95: sorted[percentile_index(len, 95)],
            p99: sorted[percentile_index(len, 99)],
        }
    }

    pub(crate) fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.buf.clear();
        inner.pos = 0;
    }
}

/// Nearest-rank index: `ceil(percentile/100 * len) - 1`, clamped to the slice.
fn percentile_index(len: usize, percentile: u32) -> usize {
    if len == 0 {
        return 0;
    }
    let rank = (u64::from(percentile) * len as u64).div_ceil(100) as usize;
    rank.saturating_sub(1).min(len - 1)
}

fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

// ── Snapshot ────────────────────────────────────────────────────────────

/// Point-in-time copy of a [`Metrics`] collector.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Prefix scans served.
    pub scan_count: u64,
    /// Membership-set lookups served.
    pub contains_count: u64,
    /// Batches committed.
    pub batch_count: u64,
    /// Staged operations across all committed batches.
    pub batch_operations: u64,
    /// Cumulative scan latency in microseconds.
    pub scan_latency_us: u64,
    /// Cumulative membership lookup latency in microseconds.
    pub contains_latency_us: u64,
    /// Cumulative batch commit latency in microseconds, retries included.
    pub batch_latency_us: u64,
    /// Scan latency percentiles over the recent window.
    pub scan_percentiles: LatencyPercentiles,
    /// Batch latency percentiles over the recent window.
    pub batch_percentiles: LatencyPercentiles,
    /// Operations that returned an error.
    pub error_count: u64,
    /// Commit attempts rejected because a watched key changed.
    pub conflict_count: u64,
    /// Commit attempts re-run after a conflict.
    pub retry_count: u64,
    /// Batches abandoned after exhausting the conflict-retry budget.
    pub retry_exhausted_count: u64,
    /// Health checks performed.
    pub health_check_count: u64,
}

impl MetricsSnapshot {
    /// Average scan latency in microseconds.
    #[must_use]
    pub fn avg_scan_latency_us(&self) -> f64 {
        average(self.scan_latency_us, self.scan_count)
    }

    /// Average membership lookup latency in microseconds.
    #[must_use]
    pub fn avg_contains_latency_us(&self) -> f64 {
        average(self.contains_latency_us, self.contains_count)
    }

    /// Average batch commit latency in microseconds.
    #[must_use]
    pub fn avg_batch_latency_us(&self) -> f64 {
        average(self.batch_latency_us, self.batch_count)
    }

    /// Fraction of operations that failed.
    #[must_use]
    pub fn error_rate(&self) -> f64 {
        average(self.error_count, self.total_operations())
    }

    /// Conflicts per committed batch.
    ///
    /// Can exceed `1.0` when a single batch conflicts several times before it
    /// commits.
    #[must_use]
    pub fn conflict_rate(&self) -> f64 {
        average(self.conflict_count, self.batch_count)
    }

    /// Total number of scans, lookups and batches.
    #[must_use]
    pub fn total_operations(&self) -> u64 {
        self.scan_count + self.contains_count + self.batch_count
    }
}

fn average(total: u64, count: u64) -> f64 {
    if count == 0 { 0.0 } else { total as f64 / count as f64 }
}

// ── Metrics ─────────────────────────────────────────────────────────────

/// Thread-safe metrics collector.
///
/// Cloning shares the underlying counters.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    scan_count: AtomicU64,
    contains_count: AtomicU64,
    batch_count: AtomicU64,
    batch_operations: AtomicU64,
    scan_latency_us: AtomicU64,
    contains_latency_us: AtomicU64,
    batch_latency_us: AtomicU64,
    scan_histogram: LatencyHistogram,
    batch_histogram: LatencyHistogram,
    error_count: AtomicU64,
    conflict_count: AtomicU64,
    retry_count: AtomicU64,
    retry_exhausted_count: AtomicU64,
    health_check_count: AtomicU64,
}

impl Metrics {
    /// Creates a collector with every counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                scan_count: AtomicU64::new(0),
                contains_count: AtomicU64::new(0),
                batch_count: AtomicU64::new(0),
                batch_operations: AtomicU64::new(0),
                scan_latency_us: AtomicU64::new(0),
                contains_latency_us: AtomicU64::new(0),
                batch_latency_us: AtomicU64::new(0),
                scan_histogram: LatencyHistogram::new(DEFAULT_HISTOGRAM_WINDOW_SIZE),
                batch_histogram: LatencyHistogram::new(DEFAULT_HISTOGRAM_WINDOW_SIZE),
                error_count: AtomicU64::new(0),
                conflict_count: AtomicU64::new(0),
                retry_count: AtomicU64::new(0),
                retry_exhausted_count: AtomicU64::new(0),
                health_check_count: AtomicU64::new(0),
            }),
        }
    }

    /// Records a prefix scan.
    pub fn record_scan(&self, duration: Duration) {
        let us = micros(duration);
        self.inner.scan_count.fetch_add(1, Ordering::Relaxed);
        self.inner.scan_latency_us.fetch_add(us, Ordering::Relaxed);
        self.inner.scan_histogram.record(us);
    }

    /// Records a membership-set lookup.
    pub fn record_contains(&self, duration: Duration) {
        self.inner.contains_count.fetch_add(1, Ordering::Relaxed);
        self.inner.contains_latency_us.fetch_add(micros(duration), Ordering::Relaxed);
    }

    /// Records a committed batch of `operations` staged mutations.
    pub fn record_batch(&self, duration: Duration, operations: usize) {
        let us = micros(duration);
        self.inner.batch_count.fetch_add(1, Ordering::Relaxed);
        self.inner.batch_operations.fetch_add(operations as u64, Ordering::Relaxed);
        self.inner.batch_latency_us.fetch_add(us, Ordering::Relaxed);
        self.inner.batch_histogram.record(us);
    }

    /// Records a failed operation.
    pub fn record_error(&self) {
        self.inner.error_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a commit attempt rejected by a concurrent writer.
    pub fn record_conflict(&self) {
        self.inner.conflict_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a retried commit attempt.
    pub fn record_retry(&self) {
        self.inner.retry_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a batch abandoned after the retry budget ran out.
    pub fn record_retry_exhausted(&self) {
        self.inner.retry_exhausted_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a health check.
    pub fn record_health_check(&self) {
        self.inner.health_check_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a snapshot of the current counters and percentiles.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = &self.inner;
        MetricsSnapshot {
            scan_count: inner.scan_count.load(Ordering::Relaxed),
            contains_count: inner.contains_count.load(Ordering::Relaxed),
            batch_count: inner.batch_count.load(Ordering::Relaxed),
            batch_operations: inner.batch_operations.load(Ordering::Relaxed),
            scan_latency_us: inner.scan_latency_us.load(Ordering::Relaxed),
            contains_latency_us: inner.contains_latency_us.load(Ordering::Relaxed),
            batch_latency_us: inner.batch_latency_us.load(Ordering::Relaxed),
            scan_percentiles: inner.scan_histogram.percentiles(),
            batch_percentiles: inner.batch_histogram.percentiles(),
            error_count: inner.error_count.load(Ordering::Relaxed),
            conflict_count: inner.conflict_count.load(Ordering::Relaxed),
            retry_count: inner.retry_count.load(Ordering::Relaxed),
            retry_exhausted_count: inner.retry_exhausted_count.load(Ordering::Relaxed),
            health_check_count: inner.health_check_count.load(Ordering::Relaxed),
        }
    }

    /// Resets all metrics to zero.
    pub fn reset(&self) {
        let inner = &self.inner;
        for counter in [
            &inner.scan_count,
            &inner.contains_count,
            &inner.batch_count,
            &inner.batch_operations,
            &inner.scan_latency_us,
            &inner.contains_latency_us,
            &inner.batch_latency_us,
            &inner.error_count,
            &inner.conflict_count,
            &inner.retry_count,
            &inner.retry_exhausted_count,
            &inner.health_check_count,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        inner.scan_histogram.reset();
        inner.batch_histogram.reset();
    }

    /// Logs current metrics at INFO level, warning on high error or conflict rates.
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();

        if snapshot.total_operations() == 0 {
            return;
        }

        tracing::info!(
            scan_count = snapshot.scan_count,
            contains_count = snapshot.contains_count,
            batch_count = snapshot.batch_count,
            batch_operations = snapshot.batch_operations,
            avg_scan_latency_us = snapshot.avg_scan_latency_us(),
            avg_batch_latency_us = snapshot.avg_batch_latency_us(),
            scan_p99 = snapshot.scan_percentiles.p99,
            batch_p50 = snapshot.batch_percentiles.p50,
            batch_p99 = snapshot.batch_percentiles.p99,
            error_count = snapshot.error_count,
            conflict_count = snapshot.conflict_count,
            retry_count = snapshot.retry_count,
            retry_exhausted_count = snapshot.retry_exhausted_count,
            "Storage metrics snapshot"
        );

        if snapshot.error_rate() > 0.05 {
            warn!(
                error_rate = snapshot.error_rate(),
                error_count = snapshot.error_count,
                total_ops = snapshot.total_operations(),
                "High storage error rate detected"
            );
        }

        if snapshot.conflict_rate() > 0.10 {
            warn!(
                conflict_rate = snapshot.conflict_rate(),
                conflict_count = snapshot.conflict_count,
                batch_count = snapshot.batch_count,
                "High write conflict rate detected"
            );
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").field("snapshot", &self.snapshot()).finish()
    }
}

/// Exposes the [`Metrics`] instance for a storage backend.
pub trait MetricsCollector {
    /// Returns a reference to the backend's metrics collector.
    fn metrics(&self) -> &Metrics;
}
