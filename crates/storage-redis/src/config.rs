//! Configuration for the Redis storage backend.
//!
//! [`RedisBackendConfig`] says where the server is, how long to wait for it
//! and which key holds the membership set. [`ConflictRetryConfig`] bounds the
//! optimistic-concurrency retry loop that every atomic write runs in.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RedisStorageError, Result};

/// Default connection timeout (5 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default response timeout (30 seconds).
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default key of the membership set.
///
/// Shared with every deployment that has written to the same server; changing
/// it orphans all previously registered keys.
pub const DEFAULT_MEMBER_SET_KEY: &str = "__MEMS__";

/// Default number of retries after the first conflicting attempt.
pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 16;

/// Default base delay between conflicting attempts.
pub const DEFAULT_CONFLICT_BASE_DELAY: Duration = Duration::from_millis(2);

/// Default cap on the exponential backoff between conflicting attempts.
pub const DEFAULT_CONFLICT_MAX_DELAY: Duration = Duration::from_millis(100);

/// Bounds for the conflict-retry loop around atomic writes.
///
/// After the `n`th conflict the loop sleeps
/// `min(base_delay * 2^n, max_delay)` plus up to the same amount of jitter,
/// then replays the same batch. After `max_retries + 1` conflicting attempts the
/// write fails with
/// [`StorageError::ConflictRetriesExhausted`](playstat_storage::StorageError::ConflictRetriesExhausted).
#[derive(Debug, Clone, bon::Builder, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConflictRetryConfig {
    /// Maximum number of retries after the first attempt.
    #[serde(default = "default_max_retries")]
    #[builder(default = DEFAULT_MAX_CONFLICT_RETRIES)]
    pub max_retries: u32,

    /// Delay before the first retry; doubles with each further attempt.
    #[serde(with = "humantime_serde", default = "default_base_delay")]
    #[builder(default = DEFAULT_CONFLICT_BASE_DELAY)]
    pub base_delay: Duration,

    /// Upper bound on the exponential delay, before jitter.
    #[serde(with = "humantime_serde", default = "default_max_delay")]
    #[builder(default = DEFAULT_CONFLICT_MAX_DELAY)]
    pub max_delay: Duration,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_CONFLICT_RETRIES
}

fn default_base_delay() -> Duration {
    DEFAULT_CONFLICT_BASE_DELAY
}

fn default_max_delay() -> Duration {
    DEFAULT_CONFLICT_MAX_DELAY
}

impl Default for ConflictRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
        }
    }
}

/// Configuration for [`RedisBackend`](crate::RedisBackend).
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use playstat_storage_redis::RedisBackendConfig;
///
/// let config = RedisBackendConfig::builder()
///     .url("redis://localhost:6379/0")
///     .response_timeout(Duration::from_secs(2))
///     .build()?;
/// assert_eq!(config.member_set_key(), "__MEMS__");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisBackendConfig {
    /// Server URL, e.g. `redis://host:6379/0`.
    pub(crate) url: String,

    /// Connection timeout.
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub(crate) connect_timeout: Duration,

    /// Per-command response timeout.
    #[serde(with = "humantime_serde", default = "default_response_timeout")]
    pub(crate) response_timeout: Duration,

    /// Key of the set every written key is registered in.
    #[serde(default = "default_member_set_key")]
    pub(crate) member_set_key: String,

    /// Conflict-retry bounds.
    #[serde(default)]
    pub(crate) conflict_retry: ConflictRetryConfig,
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

fn default_response_timeout() -> Duration {
    DEFAULT_RESPONSE_TIMEOUT
}

fn default_member_set_key() -> String {
    DEFAULT_MEMBER_SET_KEY.to_owned()
}

#[bon::bon]
impl RedisBackendConfig {
    /// Creates a new configuration, validating all required fields.
    ///
    /// # Optional Fields
    ///
    /// * `connect_timeout` - Connection timeout (default: 5 seconds).
    /// * `response_timeout` - Per-command response timeout (default: 30 seconds).
    /// * `member_set_key` - Membership set key (default: `__MEMS__`).
    /// * `conflict_retry` - Conflict-retry bounds (default: 16 retries, 2 ms base delay
    ///   doubling up to 100 ms).
    ///
    /// # Errors
    ///
    /// Returns an error if the URL or the membership set key is empty, or if
    /// the retry base delay exceeds its cap.
    #[builder]
    pub fn new(
        #[builder(into)] url: String,
        #[builder(default = DEFAULT_CONNECT_TIMEOUT)] connect_timeout: Duration,
        #[builder(default = DEFAULT_RESPONSE_TIMEOUT)] response_timeout: Duration,
        #[builder(into, default = DEFAULT_MEMBER_SET_KEY.to_owned())] member_set_key: String,
        #[builder(default)] conflict_retry: ConflictRetryConfig,
    ) -> Result<Self> {
        let config =
            Self { url, connect_timeout, response_timeout, member_set_key, conflict_retry };
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants [`new`](Self::new) enforces.
    ///
    /// Deserialized configurations bypass the builder, so the backend
    /// validates again before connecting.
    ///
    /// # Errors
    ///
    /// Returns [`RedisStorageError::Config`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(RedisStorageError::Config("url cannot be empty".into()));
        }
        if self.member_set_key.is_empty() {
            return Err(RedisStorageError::Config("member_set_key cannot be empty".into()));
        }
        if self.conflict_retry.base_delay > self.conflict_retry.max_delay {
            return Err(RedisStorageError::Config(format!(
                "conflict_retry.base_delay ({:?}) must not exceed max_delay ({:?})",
                self.conflict_retry.base_delay, self.conflict_retry.max_delay
            )));
        }
        Ok(())
    }

    /// Returns the server URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the connection timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Returns the per-command response timeout.
    #[must_use]
    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    /// Returns the membership set key.
    #[must_use]
    pub fn member_set_key(&self) -> &str {
        &self.member_set_key
    }

    /// Returns the conflict-retry bounds.
    #[must_use]
    pub fn conflict_retry(&self) -> &ConflictRetryConfig {
        &self.conflict_retry
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = RedisBackendConfig::builder().url("redis://localhost").build().unwrap();
        assert_eq!(config.url(), "redis://localhost");
        assert_eq!(config.connect_timeout(), DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.response_timeout(), DEFAULT_RESPONSE_TIMEOUT);
        assert_eq!(config.member_set_key(), DEFAULT_MEMBER_SET_KEY);
        assert_eq!(config.conflict_retry().max_retries, DEFAULT_MAX_CONFLICT_RETRIES);
    }

    #[test]
    fn test_validation_empty_url() {
        let result = RedisBackendConfig::builder().url("  ").build();
        assert!(matches!(result, Err(RedisStorageError::Config(_))));
    }

    #[test]
    fn test_validation_empty_member_set_key() {
        let result =
            RedisBackendConfig::builder().url("redis://localhost").member_set_key("").build();
        assert!(matches!(result, Err(RedisStorageError::Config(_))));
    }

    #[test]
    fn test_conflict_retry_builder_partial_overrides() {
        let retry = ConflictRetryConfig::builder().max_retries(3).build();
        assert_eq!(retry.max_retries, 3);
        assert_eq!(retry.base_delay, DEFAULT_CONFLICT_BASE_DELAY);
        assert_eq!(retry.max_delay, DEFAULT_CONFLICT_MAX_DELAY);
    }

    #[test]
    fn test_validation_base_delay_above_cap() {
        let retry = ConflictRetryConfig::builder()
            .base_delay(Duration::from_millis(50))
            .max_delay(Duration::from_millis(10))
            .build();
        let result =
            RedisBackendConfig::builder().url("redis://localhost").conflict_retry(retry).build();
        assert!(matches!(result, Err(RedisStorageError::Config(_))));
    }

    #[test]
    fn test_config_deserialization_with_defaults() {
        let config: RedisBackendConfig =
            serde_json::from_str(r#"{"url": "redis://cache:6379/2"}"#).expect("valid json");
        assert_eq!(config.url(), "redis://cache:6379/2");
        assert_eq!(config.member_set_key(), DEFAULT_MEMBER_SET_KEY);
        assert_eq!(config.conflict_retry().base_delay, DEFAULT_CONFLICT_BASE_DELAY);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_deserialization_humantime() {
        let config: RedisBackendConfig = serde_json::from_str(
            r#"{
                "url": "redis://cache",
                "response_timeout": "250ms",
                "conflict_retry": {"max_retries": 4, "base_delay": "5ms", "max_delay": "1s"}
            }"#,
        )
        .expect("valid json");
        assert_eq!(config.response_timeout(), Duration::from_millis(250));
        assert_eq!(config.conflict_retry().max_retries, 4);
        assert_eq!(config.conflict_retry().base_delay, Duration::from_millis(5));
        assert_eq!(config.conflict_retry().max_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_config_rejects_unknown_fields() {
        let result: std::result::Result<RedisBackendConfig, _> =
            serde_json::from_str(r#"{"url": "redis://cache", "pool_size": 4}"#);
        assert!(result.is_err());
    }
}
