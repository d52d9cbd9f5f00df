//! Turning one playback record into stored state.
//!
//! [`MetricIngester::ingest`] performs three writes:
//!
//! 1. `set` the raw record under `ORGE:` + full record key
//! 2. `mupdate` one histogram counter per distinct event type
//! 3. `mupdate` the latency and duration counters the milestones allow
//!
//! Counters are addressed at depth 3, so every session of the same
//! origin/device/video accumulates into the same values.

use std::sync::Arc;

use playstat_storage::StorageBackend;

use crate::{
    error::{EngineError, Result},
    keys::{AGGREGATION_DEPTH, KEY_SEPARATOR, MetricFamily, RecordKey, histogram_key},
    origin::resolve_target,
    record::PlaybackStatistics,
};

/// Scale applied to the reported duration before it is summed.
///
/// Existing data was accumulated with this factor, so it stays even though
/// the duration and the event timestamps may not share a unit.
pub const DURATION_SCALE: f64 = 1000.0;

/// Writes playback records and their derived counters.
#[derive(Clone)]
pub struct MetricIngester {
    backend: Arc<dyn StorageBackend>,
}

impl std::fmt::Debug for MetricIngester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricIngester").finish_non_exhaustive()
    }
}

impl MetricIngester {
    /// Creates an ingester writing to `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Stores `record` and folds it into the aggregates.
    ///
    /// The three writes are separate atomic units; a failure between them
    /// leaves the earlier ones applied.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidRecord`] if the record cannot be keyed or an
    ///   event type contains the key separator; nothing is written
    /// - [`EngineError::Storage`] if the backend fails
    #[tracing::instrument(skip(self, record), fields(id = %record.id, device = %record.device_tag))]
    pub async fn ingest(&self, record: &PlaybackStatistics) -> Result<()> {
        let key = record_key(record)?;
        check_event_kinds(record)?;

        let raw = serde_json::to_string(record)?;
        self.backend.set(MetricFamily::OriginalEvent.key(key.as_str()), raw).await?;

        let leveled = key.leveled(AGGREGATION_DEPTH)?;
        let histogram = histogram_deltas(record, leveled);
        self.backend.mupdate(&histogram).await?;

        let playback = playback_deltas(record, leveled);
        self.backend.mupdate(&playback).await?;

        tracing::debug!(
            key = %key,
            histogram_counters = histogram.len(),
            playback_counters = playback.len(),
            "Ingested playback record"
        );
        Ok(())
    }
}

/// Composes the depth-4 key of `record`.
///
/// # Errors
///
/// Returns [`EngineError::InvalidRecord`] if the target cannot be resolved or
/// the device tag contains the key separator.
pub fn record_key(record: &PlaybackStatistics) -> Result<RecordKey> {
    let target = resolve_target(&record.target)?;
    if record.device_tag.contains(KEY_SEPARATOR) {
        return Err(EngineError::InvalidRecord(format!(
            "device tag contains ':': {}",
            record.device_tag
        )));
    }
    Ok(RecordKey::compose(target.origin.as_str(), &record.device_tag, &target.video, &record.id))
}

/// Rejects event types that would add a segment to their histogram key.
fn check_event_kinds(record: &PlaybackStatistics) -> Result<()> {
    match record.events.iter().find(|event| event.kind.contains(KEY_SEPARATOR)) {
        Some(event) => {
            Err(EngineError::InvalidRecord(format!("event type contains ':': {}", event.kind)))
        },
        None => Ok(()),
    }
}

/// One `+count` per distinct event type.
fn histogram_deltas(record: &PlaybackStatistics, leveled: &str) -> Vec<(String, f64)> {
    record
        .event_histogram()
        .into_iter()
        .map(|(event, count)| (histogram_key(event, leveled), count as f64))
        .collect()
}

/// Latency count and sum, then video and actual duration sums, each only
/// when its milestones fired.
fn playback_deltas(record: &PlaybackStatistics, leveled: &str) -> Vec<(String, f64)> {
    let milestones = record.milestones();
    let mut deltas = Vec::with_capacity(4);
    if let Some(latency) = milestones.playable_latency() {
        deltas.push((MetricFamily::PlayableCount.key(leveled), 1.0));
        deltas.push((MetricFamily::PlayableSum.key(leveled), latency));
    }
    if let Some(actual) = milestones.actual_playback() {
        let scaled = record.duration * DURATION_SCALE;
        deltas.push((MetricFamily::DurationVideoSum.key(leveled), scaled));
        deltas.push((MetricFamily::DurationActualSum.key(leveled), actual));
    }
    deltas
}
