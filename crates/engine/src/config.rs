//! Backend selection.
//!
//! Deployments pick a storage variant in configuration; everything above the
//! storage layer holds the resulting `Arc<dyn StorageBackend>`.
//!
//! ```json
//! { "kind": "redis", "url": "redis://cache:6379/0", "response_timeout": "2s" }
//! ```

use std::sync::Arc;

use playstat_storage::{MemoryBackend, StorageBackend};
use playstat_storage_redis::{RedisBackend, RedisBackendConfig, RedisStorageError};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Which storage variant to run on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    /// Process-local store; contents vanish with the process.
    #[default]
    Memory,
    /// Shared Redis server.
    Redis(RedisBackendConfig),
}

impl BackendConfig {
    /// Opens the configured backend.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Config`] if the Redis configuration is invalid
    /// - [`EngineError::Storage`] if the Redis server cannot be reached
    #[tracing::instrument(skip(self), fields(kind = self.kind()))]
    pub async fn open(&self) -> Result<Arc<dyn StorageBackend>> {
        match self {
            Self::Memory => Ok(Arc::new(MemoryBackend::new())),
            Self::Redis(config) => {
                let backend = RedisBackend::new(config.clone()).await.map_err(|e| match e {
                    RedisStorageError::Config(message) => EngineError::Config(message),
                    other => EngineError::Storage(other.into()),
                })?;
                Ok(Arc::new(backend))
            },
        }
    }

    /// Returns the variant name used in configuration.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Redis(_) => "redis",
        }
    }
}
