//! Grouped reads over the stored counters.
//!
//! A query scans one metric family, strips the family prefix from every key
//! to recover the leveled key, projects it onto the caller's `nodes`
//! (segment indices into `origin:device:video`) and sums per projected group.

use std::{collections::BTreeMap, sync::Arc};

use playstat_storage::{StorageBackend, parse_counter};

use crate::{
    error::{EngineError, Result},
    keys::{
        AGGREGATION_DEPTH, FractionKind, KEY_SEPARATOR, MetricFamily, histogram_prefix, project,
    },
    record::PlaybackStatistics,
};

/// Parses a comma-separated node list such as `"0,2"`.
///
/// Empty pieces are ignored, so `"1,"` is `[1]`.
///
/// # Errors
///
/// Returns [`EngineError::BadRequest`] if a piece is not a non-negative
/// integer or nothing remains.
pub fn parse_nodes(raw: &str) -> Result<Vec<usize>> {
    let nodes = raw
        .split(',')
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .map(|piece| {
            piece
                .parse::<usize>()
                .map_err(|_| EngineError::BadRequest(format!("invalid node index: {piece:?}")))
        })
        .collect::<Result<Vec<_>>>()?;
    if nodes.is_empty() {
        return Err(EngineError::BadRequest("node list is empty".into()));
    }
    Ok(nodes)
}

/// Computes histograms and ratios from the stored counters.
#[derive(Clone)]
pub struct QueryAggregator {
    backend: Arc<dyn StorageBackend>,
}

impl std::fmt::Debug for QueryAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryAggregator").finish_non_exhaustive()
    }
}

impl QueryAggregator {
    /// Creates an aggregator reading from `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Returns `dividend_sum / divisor_sum` per group.
    ///
    /// Only groups with a non-zero divisor sum appear. An empty store yields
    /// an empty map.
    ///
    /// # Errors
    ///
    /// - [`EngineError::BadRequest`] if `nodes` is empty
    /// - [`EngineError::IndexOutOfRange`] if a node index exceeds a stored key's segments
    /// - [`EngineError::MalformedKey`] if a scanned key belongs to neither family
    ///   or its leveled part is not `origin:device:video`
    /// - [`EngineError::Storage`] if the backend fails or a counter is not numeric
    #[tracing::instrument(skip(self))]
    pub async fn fraction_aggregate(
        &self,
        kind: FractionKind,
        nodes: &[usize],
    ) -> Result<BTreeMap<String, f64>> {
        require_nodes(nodes)?;
        let dividend_prefix = kind.dividend().prefix();
        let divisor_prefix = kind.divisor().prefix();

        let mut dividends: BTreeMap<String, f64> = BTreeMap::new();
        let mut divisors: BTreeMap<String, f64> = BTreeMap::new();
        for (key, raw) in self.backend.get_items(kind.scan_prefix()).await? {
            let (sums, leveled) = if let Some(rest) = key.strip_prefix(dividend_prefix) {
                (&mut dividends, rest)
            } else if let Some(rest) = key.strip_prefix(divisor_prefix) {
                (&mut divisors, rest)
            } else {
                return Err(EngineError::MalformedKey { key });
            };
            if !is_leveled(leveled) {
                return Err(EngineError::MalformedKey { key });
            }
            let group = project(leveled, nodes)?;
            *sums.entry(group).or_insert(0.0) += parse_counter(&key, &raw)?;
        }

        let ratios: BTreeMap<String, f64> = divisors
            .into_iter()
            .filter(|(_, divisor)| *divisor != 0.0)
            .map(|(group, divisor)| {
                let dividend = dividends.get(&group).copied().unwrap_or(0.0);
                (group, dividend / divisor)
            })
            .collect();
        tracing::debug!(groups = ratios.len(), "Computed fraction aggregate");
        Ok(ratios)
    }

    /// Returns the number of `event` occurrences per group.
    ///
    /// # Errors
    ///
    /// - [`EngineError::BadRequest`] if `nodes` is empty or `event` contains `:`
    /// - [`EngineError::IndexOutOfRange`] if a node index exceeds a stored key's segments
    /// - [`EngineError::MalformedKey`] if a scanned key's leveled part is not
    ///   `origin:device:video`
    /// - [`EngineError::Storage`] if the backend fails or a counter is not numeric
    #[tracing::instrument(skip(self))]
    pub async fn histogram_aggregate(
        &self,
        event: &str,
        nodes: &[usize],
    ) -> Result<BTreeMap<String, u64>> {
        require_nodes(nodes)?;
        if event.contains(KEY_SEPARATOR) {
            return Err(EngineError::BadRequest(format!("event type contains ':': {event}")));
        }
        let prefix = histogram_prefix(event);

        let mut totals: BTreeMap<String, f64> = BTreeMap::new();
        for (key, raw) in self.backend.get_items(&prefix).await? {
            let Some(leveled) = key.strip_prefix(prefix.as_str()) else {
                return Err(EngineError::MalformedKey { key });
            };
            if !is_leveled(leveled) {
                return Err(EngineError::MalformedKey { key });
            }
            let group = project(leveled, nodes)?;
            *totals.entry(group).or_insert(0.0) += parse_counter(&key, &raw)?;
        }

        // Counters only ever receive whole increments.
        Ok(totals.into_iter().map(|(group, total)| (group, total.round() as u64)).collect())
    }

    /// Dumps every stored key and value.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] if the backend fails.
    #[tracing::instrument(skip(self))]
    pub async fn list_all(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.backend.get_items("").await?)
    }

    /// Returns every stored raw record, ordered by record key.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Serialization`] if a stored record is not valid JSON
    /// - [`EngineError::Storage`] if the backend fails
    #[tracing::instrument(skip(self))]
    pub async fn list_raw(&self) -> Result<Vec<PlaybackStatistics>> {
        let items = self.backend.get_items(MetricFamily::OriginalEvent.prefix()).await?;
        let records = items
            .values()
            .map(|raw| serde_json::from_str(raw))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

/// Stored counters are addressed by depth-3 keys only.
fn is_leveled(leveled: &str) -> bool {
    leveled.split(KEY_SEPARATOR).count() == AGGREGATION_DEPTH
}

fn require_nodes(nodes: &[usize]) -> Result<()> {
    if nodes.is_empty() {
        return Err(EngineError::BadRequest("node list is empty".into()));
    }
    Ok(())
}
