//! In-memory storage backend implementation.
//!
//! This module provides [`MemoryBackend`], an in-memory implementation of
//! [`StorageBackend`] suitable for tests, development and single-process
//! deployments.
//!
//! # Features
//!
//! - **Thread-safe**: one [`parking_lot::RwLock`] guards both the data and the membership set
//! - **Ordered storage**: keys live in a [`BTreeMap`], so prefix scans are range walks
//! - **All-or-nothing batches**: a batch is staged in full before any of it is written
//!
//! # Example
//!
//! ```
//! use playstat_storage::{MemoryBackend, StorageBackend};
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = MemoryBackend::new();
//!
//!     backend.set("greeting".to_owned(), "hello".to_owned()).await.unwrap();
//!     let values = backend.get("greeting").await.unwrap();
//!
//!     assert_eq!(values, vec!["hello"]);
//!     assert!(backend.contains("greeting").await.unwrap());
//! }
//! ```
//!
//! # Performance Characteristics
//!
//! | Operation | Complexity |
//! |-----------|------------|
//! | get_items | O(log n + k) where k is result size |
//! | contains | O(log n) |
//! | apply_batch | O(b log n) where b is batch size |
//!
//! # Limitations
//!
//! - Data is not persisted; all data is lost when the process exits
//! - Nothing is shared between processes

use std::{
    collections::{BTreeMap, BTreeSet},
    ops::Bound,
    sync::Arc,
    time::Instant,
};

use async_trait::async_trait;
use fail::fail_point;
use parking_lot::RwLock;

use crate::{
    backend::StorageBackend,
    batch::WriteBatch,
    error::{StorageError, StorageResult},
    metrics::{Metrics, MetricsCollector},
};

#[derive(Default)]
struct MemoryState {
    data: BTreeMap<String, String>,
    members: BTreeSet<String>,
}

/// In-memory storage backend using [`BTreeMap`].
///
/// # Cloning
///
/// `MemoryBackend` is cheaply cloneable via [`Arc`]. All clones share the
/// same underlying data store and metrics.
#[derive(Clone)]
pub struct MemoryBackend {
    state: Arc<RwLock<MemoryState>>,
    metrics: Metrics,
}

impl MemoryBackend {
    /// Creates an empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::with_metrics(Metrics::new())
    }

    /// Creates an empty backend that records into an existing [`Metrics`] handle.
    #[must_use]
    pub fn with_metrics(metrics: Metrics) -> Self {
        Self { state: Arc::new(RwLock::new(MemoryState::default())), metrics }
    }

    /// Returns the number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().data.len()
    }

    /// Returns `true` if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().data.is_empty()
    }

    fn commit(&self, batch: &WriteBatch) -> StorageResult<Vec<f64>> {
        fail_point!("memory-before-commit", |_| {
            Err(StorageError::internal("injected failure before batch commit"))
        });

        let mut state = self.state.write();
        let staged = {
            let data = &state.data;
            batch.stage(|key| data.get(key).map(String::as_str))?
        };
        for (key, value) in staged.writes {
            state.members.insert(key.clone());
            state.data.insert(key, value);
        }
        Ok(staged.results)
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector for MemoryBackend {
    fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    #[tracing::instrument(skip(self))]
    async fn get_items(&self, prefix: &str) -> StorageResult<BTreeMap<String, String>> {
        let start = Instant::now();
        let state = self.state.read();

        let items = if let Some(value) = state.data.get(prefix) {
            BTreeMap::from([(prefix.to_owned(), value.clone())])
        } else {
            state
                .data
                .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
                .take_while(|(key, _)| key.starts_with(prefix))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        };

        self.metrics.record_scan(start.elapsed());
        Ok(items)
    }

    #[tracing::instrument(skip(self))]
    async fn contains(&self, key: &str) -> StorageResult<bool> {
        let start = Instant::now();
        let found = self.state.read().members.contains(key);
        self.metrics.record_contains(start.elapsed());
        Ok(found)
    }

    #[tracing::instrument(skip(self, batch), fields(operations = batch.len()))]
    async fn apply_batch(&self, batch: &WriteBatch) -> StorageResult<Vec<f64>> {
        let start = Instant::now();
        match self.commit(batch) {
            Ok(results) => {
                self.metrics.record_batch(start.elapsed(), batch.len());
                Ok(results)
            },
            Err(e) => {
                self.metrics.record_error();
                tracing::warn!(error = %e, "Batch rejected");
                Err(e)
            },
        }
    }

    #[tracing::instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<()> {
        fail_point!("health-check", |_| {
            Err(StorageError::internal("injected health check failure"))
        });
        self.metrics.record_health_check();
        // Try to acquire read lock to verify we're not deadlocked
        let _unused = self.state.read();
        Ok(())
    }
}
