//! Redis-backed storage backend implementation.
//!
//! This module provides [`RedisBackend`], which implements the
//! [`StorageBackend`](playstat_storage::StorageBackend) trait on top of a
//! Redis server shared by every ingesting process.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use parking_lot::Mutex;
use playstat_storage::{
    Metrics, MetricsCollector, StorageBackend, StorageError, StorageResult, WriteBatch,
};
use redis::{
    AsyncConnectionConfig, Client, RedisResult, Value,
    aio::{ConnectionManager, ConnectionManagerConfig, MultiplexedConnection},
};

use crate::{
    config::{ConflictRetryConfig, RedisBackendConfig},
    error::{Result, redis_error_to_storage_error},
    keys::prefix_pattern,
    retry::with_conflict_retry,
};

/// Keys requested per `SSCAN` round trip.
const SCAN_COUNT: usize = 1000;

/// Keys fetched per `MGET` during a prefix scan.
const MGET_CHUNK: usize = 512;

/// Idle write connections kept for reuse; extras are closed on release.
const MAX_IDLE_WRITE_CONNECTIONS: usize = 16;

/// Redis-backed implementation of [`StorageBackend`].
///
/// # Atomic Writes
///
/// Every write runs the optimistic-concurrency cycle on a connection it holds
/// exclusively, since `WATCH` state belongs to a connection. Write connections
/// are taken from a small idle pool and returned once `EXEC` or `UNWATCH` has
/// cleared their watch state; a connection that saw an error is dropped.
///
/// 1. `WATCH` every data key in the batch plus the membership set key
/// 2. `MGET` the current values of incremented counters and stage the batch
/// 3. `MULTI`, `SET` every staged value, `SADD` every key to the membership set, `EXEC`
///
/// A nil `EXEC` reply means a watched key changed after step 1; the cycle is
/// replayed with exponential backoff under the configured
/// [`ConflictRetryConfig`].
///
/// # Prefix Scans
///
/// Keys are enumerated from the membership set with `SSCAN ... MATCH`, never
/// with a keyspace `SCAN`, so only keys written through this backend are
/// visible and the membership set itself is never returned.
///
/// # Example
///
/// ```no_run
/// // Requires a running Redis server.
/// use playstat_storage::StorageBackend;
/// use playstat_storage_redis::{RedisBackend, RedisBackendConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = RedisBackendConfig::builder().url("redis://localhost:6379/0").build()?;
///     let backend = RedisBackend::new(config).await?;
///
///     let totals = backend.mupdate(&[("hits:ios".to_owned(), 1.0)]).await?;
///     assert!(totals[0] >= 1.0);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct RedisBackend {
    /// Client used to open dedicated connections for atomic writes.
    client: Client,

    /// Shared auto-reconnecting connection for reads.
    manager: ConnectionManager,

    /// Write connections with no pending `WATCH`, ready for reuse.
    idle_writers: Arc<Mutex<Vec<MultiplexedConnection>>>,

    /// Key of the membership set.
    member_set_key: String,

    connect_timeout: Duration,
    response_timeout: Duration,
    conflict_retry: ConflictRetryConfig,
    metrics: Metrics,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("member_set_key", &self.member_set_key)
            .field("conflict_retry", &self.conflict_retry)
            .finish_non_exhaustive()
    }
}

impl RedisBackend {
    /// Connects to the server named by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration is invalid
    /// - The URL cannot be parsed
    /// - The server cannot be reached within the connection timeout
    pub async fn new(config: RedisBackendConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::open(config.url())?;
        let manager_config = ConnectionManagerConfig::new()
            .set_connection_timeout(config.connect_timeout())
            .set_response_timeout(config.response_timeout());
        let manager = ConnectionManager::new_with_config(client.clone(), manager_config).await?;

        tracing::info!(member_set_key = config.member_set_key(), "Connected to Redis");

        Ok(Self {
            client,
            manager,
            idle_writers: Arc::new(Mutex::new(Vec::new())),
            member_set_key: config.member_set_key().to_owned(),
            connect_timeout: config.connect_timeout(),
            response_timeout: config.response_timeout(),
            conflict_retry: config.conflict_retry().clone(),
            metrics: Metrics::new(),
        })
    }

    /// Records into an existing [`Metrics`] handle instead of a private one.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Returns the membership set key.
    #[must_use]
    pub fn member_set_key(&self) -> &str {
        &self.member_set_key
    }

    /// Returns the number of idle write connections held for reuse.
    #[must_use]
    pub fn idle_write_connections(&self) -> usize {
        self.idle_writers.lock().len()
    }

    /// Takes an idle write connection, or opens one when none is idle.
    async fn write_connection(&self) -> RedisResult<MultiplexedConnection> {
        if let Some(con) = self.idle_writers.lock().pop() {
            return Ok(con);
        }
        let config = AsyncConnectionConfig::new()
            .set_connection_timeout(self.connect_timeout)
            .set_response_timeout(self.response_timeout);
        self.client.get_multiplexed_async_connection_with_config(&config).await
    }

    /// Hands a connection with no pending `WATCH` back to the idle pool.
    fn release_write_connection(&self, con: MultiplexedConnection) {
        let mut idle = self.idle_writers.lock();
        if idle.len() < MAX_IDLE_WRITE_CONNECTIONS {
            idle.push(con);
        }
    }

    async fn scan(&self, prefix: &str) -> RedisResult<BTreeMap<String, String>> {
        let mut con = self.manager.clone();

        if !prefix.is_empty() && prefix != self.member_set_key {
            let exact: Option<String> = redis::cmd("GET").arg(prefix).query_async(&mut con).await?;
            if let Some(value) = exact {
                return Ok(BTreeMap::from([(prefix.to_owned(), value)]));
            }
        }

        // SSCAN may report a member more than once.
        let pattern = prefix_pattern(prefix);
        let mut keys = BTreeSet::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, found): (u64, Vec<String>) = redis::cmd("SSCAN")
                .arg(&self.member_set_key)
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut con)
                .await?;
            keys.extend(found);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        let keys: Vec<String> = keys.into_iter().collect();
        let mut items = BTreeMap::new();
        for chunk in keys.chunks(MGET_CHUNK) {
            let values: Vec<Option<String>> =
                redis::cmd("MGET").arg(chunk).query_async(&mut con).await?;
            items.extend(
                chunk.iter().cloned().zip(values).filter_map(|(key, value)| Some((key, value?))),
            );
        }
        Ok(items)
    }

    /// Runs one watch/stage/commit cycle.
    ///
    /// Returns [`StorageError::Conflict`] when `EXEC` aborts.
    async fn commit_once(&self, batch: &WriteBatch) -> StorageResult<Vec<f64>> {
        let mut con = self.write_connection().await.map_err(redis_error_to_storage_error)?;
        let keys = batch.keys();

        let _: () = redis::cmd("WATCH")
            .arg(&keys)
            .arg(&self.member_set_key)
            .query_async(&mut con)
            .await
            .map_err(redis_error_to_storage_error)?;

        let current: Vec<Option<String>> = if batch.increment_count() > 0 {
            redis::cmd("MGET")
                .arg(&keys)
                .query_async(&mut con)
                .await
                .map_err(redis_error_to_storage_error)?
        } else {
            Vec::new()
        };
        let current: HashMap<&str, &str> = keys
            .iter()
            .zip(&current)
            .filter_map(|(key, value)| Some((*key, value.as_deref()?)))
            .collect();

        let staged = match batch.stage(|key| current.get(key).copied()) {
            Ok(staged) => staged,
            Err(e) => {
                let unwatched: RedisResult<()> = redis::cmd("UNWATCH").query_async(&mut con).await;
                if unwatched.is_ok() {
                    self.release_write_connection(con);
                }
                return Err(e);
            },
        };

        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in &staged.writes {
            pipe.cmd("SET").arg(key).arg(value).ignore();
        }
        pipe.cmd("SADD").arg(&self.member_set_key).arg(&keys).ignore();

        let outcome: Option<Value> =
            pipe.query_async(&mut con).await.map_err(redis_error_to_storage_error)?;
        // EXEC clears the watch whether or not it committed.
        self.release_write_connection(con);
        match outcome {
            Some(_) => Ok(staged.results),
            None => Err(StorageError::conflict()),
        }
    }

    fn record_failure(&self, operation: &str, err: &StorageError) {
        self.metrics.record_error();
        tracing::warn!(operation, error = %err, "Redis operation failed");
    }
}

impl MetricsCollector for RedisBackend {
    fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

#[async_trait]
impl StorageBackend for RedisBackend {
    #[tracing::instrument(skip(self))]
    async fn get_items(&self, prefix: &str) -> StorageResult<BTreeMap<String, String>> {
        let start = Instant::now();
        match self.scan(prefix).await {
            Ok(items) => {
                self.metrics.record_scan(start.elapsed());
                Ok(items)
            },
            Err(e) => {
                let err = redis_error_to_storage_error(e);
                self.record_failure("get_items", &err);
                Err(err)
            },
        }
    }

    #[tracing::instrument(skip(self))]
    async fn contains(&self, key: &str) -> StorageResult<bool> {
        let start = Instant::now();
        let mut con = self.manager.clone();
        let result: RedisResult<bool> = redis::cmd("SISMEMBER")
            .arg(&self.member_set_key)
            .arg(key)
            .query_async(&mut con)
            .await;
        match result {
            Ok(found) => {
                self.metrics.record_contains(start.elapsed());
                Ok(found)
            },
            Err(e) => {
                let err = redis_error_to_storage_error(e);
                self.record_failure("contains", &err);
                Err(err)
            },
        }
    }

    #[tracing::instrument(skip(self, batch), fields(operations = batch.len()))]
    async fn apply_batch(&self, batch: &WriteBatch) -> StorageResult<Vec<f64>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let result = with_conflict_retry(
            &self.conflict_retry,
            Some(&self.metrics),
            "apply_batch",
            || self.commit_once(batch),
        )
        .await;
        match result {
            Ok(values) => {
                self.metrics.record_batch(start.elapsed(), batch.len());
                Ok(values)
            },
            Err(err) => {
                self.record_failure("apply_batch", &err);
                Err(err)
            },
        }
    }

    #[tracing::instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<()> {
        self.metrics.record_health_check();
        let mut con = self.manager.clone();
        let reply: RedisResult<String> = redis::cmd("PING").query_async(&mut con).await;
        match reply {
            Ok(pong) if pong == "PONG" => Ok(()),
            Ok(other) => {
                let err = StorageError::internal(format!("unexpected PING reply: {other}"));
                self.record_failure("health_check", &err);
                Err(err)
            },
            Err(e) => {
                let err = redis_error_to_storage_error(e);
                self.record_failure("health_check", &err);
                Err(err)
            },
        }
    }
}
