//! Playback telemetry ingestion and hierarchical aggregation.
//!
//! Players report one [`PlaybackStatistics`] record per session. The engine
//! stores it, folds it into counters keyed by `origin:device:video`, and
//! answers grouped queries over those counters.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    PlaybackBenchmark                        │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │        MetricIngester        │       QueryAggregator        │
//! │  set raw record, mupdate     │  prefix scan, project,       │
//! │  histogram + playback        │  sum, divide                 │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │           keys: RecordKey │ MetricFamily │ FractionKind      │
//! ├─────────────────────────────────────────────────────────────┤
//! │                 Arc<dyn StorageBackend>                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use playstat_engine::{DomEvent, FractionKind, PlaybackBenchmark, PlaybackStatistics};
//! use playstat_storage::MemoryBackend;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let engine = PlaybackBenchmark::new(Arc::new(MemoryBackend::new()));
//!
//! engine
//!     .ingest(&PlaybackStatistics {
//!         id: "session-1".into(),
//!         timestamp: 0.0,
//!         target: "https://mybucket.s3.amazonaws.com/videos/short.mp4".into(),
//!         events: vec![DomEvent::new(0.0, "loadstart"), DomEvent::new(5.0, "loadeddata")],
//!         device_tag: "ios".into(),
//!         duration: 10.0,
//!         playbackquality: None,
//!     })
//!     .await
//!     .unwrap();
//!
//! let latency = engine.fraction_aggregate(FractionKind::PlayableLatency, &[1]).await.unwrap();
//! assert_eq!(latency.get("ios"), Some(&5.0));
//! # });
//! ```
//!
//! # Errors
//!
//! Every operation returns [`Result`]. [`EngineError::is_client_error`]
//! tells request layers whether to blame the caller.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod ingest;
pub mod keys;
pub mod origin;
pub mod query;
pub mod record;

use std::{collections::BTreeMap, sync::Arc};

pub use config::BackendConfig;
pub use error::{EngineError, Result};
pub use ingest::MetricIngester;
pub use keys::{FractionKind, MetricFamily, RecordKey};
pub use origin::OriginTag;
use playstat_storage::StorageBackend;
pub use query::{QueryAggregator, parse_nodes};
pub use record::{DomEvent, PlaybackQualitySample, PlaybackStatistics};

/// The operations a request layer needs, over one shared backend.
#[derive(Clone)]
pub struct PlaybackBenchmark {
    backend: Arc<dyn StorageBackend>,
    ingester: MetricIngester,
    aggregator: QueryAggregator,
}

impl std::fmt::Debug for PlaybackBenchmark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackBenchmark").finish_non_exhaustive()
    }
}

impl PlaybackBenchmark {
    /// Builds the engine over an injected backend.
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            ingester: MetricIngester::new(Arc::clone(&backend)),
            aggregator: QueryAggregator::new(Arc::clone(&backend)),
            backend,
        }
    }

    /// Opens the configured backend and builds the engine over it.
    ///
    /// # Errors
    ///
    /// See [`BackendConfig::open`].
    pub async fn open(config: &BackendConfig) -> Result<Self> {
        Ok(Self::new(config.open().await?))
    }

    /// Returns the shared backend.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Stores one session and updates its aggregates.
    ///
    /// # Errors
    ///
    /// See [`MetricIngester::ingest`].
    pub async fn ingest(&self, record: &PlaybackStatistics) -> Result<()> {
        self.ingester.ingest(record).await
    }

    /// Returns every stored raw record.
    ///
    /// # Errors
    ///
    /// See [`QueryAggregator::list_raw`].
    pub async fn list_raw(&self) -> Result<Vec<PlaybackStatistics>> {
        self.aggregator.list_raw().await
    }

    /// Dumps the whole store.
    ///
    /// # Errors
    ///
    /// See [`QueryAggregator::list_all`].
    pub async fn list_all(&self) -> Result<BTreeMap<String, String>> {
        self.aggregator.list_all().await
    }

    /// Counts `event` occurrences per group of `nodes`.
    ///
    /// # Errors
    ///
    /// See [`QueryAggregator::histogram_aggregate`].
    pub async fn histogram_aggregate(
        &self,
        event: &str,
        nodes: &[usize],
    ) -> Result<BTreeMap<String, u64>> {
        self.aggregator.histogram_aggregate(event, nodes).await
    }

    /// Computes a ratio per group of `nodes`.
    ///
    /// # Errors
    ///
    /// See [`QueryAggregator::fraction_aggregate`].
    pub async fn fraction_aggregate(
        &self,
        kind: FractionKind,
        nodes: &[usize],
    ) -> Result<BTreeMap<String, f64>> {
        self.aggregator.fraction_aggregate(kind, nodes).await
    }

    /// Verifies the backend is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] if the health check fails.
    pub async fn health_check(&self) -> Result<()> {
        Ok(self.backend.health_check().await?)
    }
}
