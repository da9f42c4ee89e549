//! Response cache: key derivation, storage backends, and the adapter the engine uses.
//!
//! Cache failures never fail a request. [`CacheStore`] logs them and reports a miss
//! (on read) or carries on (on write).

mod key;
mod memory;
mod persistent;

pub use key::{derive_key, rolling_hash};
pub use memory::MemoryBackend;
pub use persistent::SledBackend;

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::config::{CacheConfig, StorageKind};

/// A cached payload and the time it was written, in milliseconds since the Unix epoch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: Value,
    pub timestamp: u64,
}

impl CacheEntry {
    /// An entry is valid while `now - timestamp < ttl`.
    ///
    /// Timestamps come from the wall clock (`SystemTime`), not from tokio's clock, so a
    /// paused test runtime does not age entries. An entry stamped later than `now_ms`
    /// means the clock stepped backwards since the write; its age is unknown and it is
    /// treated as stale.
    pub fn is_fresh(&self, now_ms: u64, ttl: Duration) -> bool {
        match now_ms.checked_sub(self.timestamp) {
            Some(age) => u128::from(age) < ttl.as_millis(),
            None => false,
        }
    }
}

/// Failures raised by a [`CacheBackend`].
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("malformed cache record: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("cache backend error: {0}")]
    Backend(#[from] sled::Error),
    #[error("cache capacity of {capacity} entries exceeded")]
    QuotaExceeded { capacity: usize },
    #[error("cache task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Key/value storage for cache entries.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;
    async fn set(&self, key: &str, entry: &CacheEntry) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
    async fn clear(&self) -> Result<(), CacheError>;
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Cache failures are recovered locally; this is their only trace.
#[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
fn report_failure(key: Option<&str>, what: &str, error: &CacheError) {
    #[cfg(feature = "tracing")]
    tracing::warn!(key, error = %error, "{what}");
}

/// Uniform cache access over the in-memory backend and an optional persistent one.
#[derive(Clone)]
pub struct CacheStore {
    memory: Arc<dyn CacheBackend>,
    persistent: Option<Arc<dyn CacheBackend>>,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("persistent", &self.persistent.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(None)
    }
}

impl CacheStore {
    pub fn new(persistent: Option<Arc<dyn CacheBackend>>) -> Self {
        Self {
            memory: Arc::new(MemoryBackend::new()),
            persistent,
        }
    }

    fn backend(&self, storage: StorageKind) -> Option<&Arc<dyn CacheBackend>> {
        match storage {
            StorageKind::Memory => Some(&self.memory),
            StorageKind::Persistent => {
                #[cfg(feature = "tracing")]
                if self.persistent.is_none() {
                    tracing::warn!("persistent cache requested but no backend is configured");
                }
                self.persistent.as_ref()
            }
        }
    }

    /// Fetch a fresh payload, purging the entry if it has expired or cannot be read.
    pub async fn get(&self, key: &str, config: &CacheConfig) -> Option<Value> {
        self.get_at(key, config, now_ms()).await
    }

    pub(crate) async fn get_at(&self, key: &str, config: &CacheConfig, now: u64) -> Option<Value> {
        let backend = self.backend(config.storage)?;
        match backend.get(key).await {
            Ok(Some(entry)) if entry.is_fresh(now, config.ttl) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(key, "cache hit");
                Some(entry.data)
            }
            Ok(Some(_)) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(key, "cache entry expired");
                Self::purge(backend, key).await;
                None
            }
            Ok(None) => None,
            Err(e) => {
                report_failure(Some(key), "cache read failed; treating as miss", &e);
                if matches!(e, CacheError::Malformed(_)) {
                    Self::purge(backend, key).await;
                }
                None
            }
        }
    }

    /// Store `data` under `key`. Failures are logged and otherwise ignored.
    pub async fn set(&self, key: &str, data: Value, config: &CacheConfig) {
        self.set_at(key, data, config, now_ms()).await;
    }

    pub(crate) async fn set_at(&self, key: &str, data: Value, config: &CacheConfig, now: u64) {
        let Some(backend) = self.backend(config.storage) else {
            return;
        };
        let entry = CacheEntry {
            data,
            timestamp: now,
        };
        if let Err(e) = backend.set(key, &entry).await {
            report_failure(Some(key), "cache write failed; response not cached", &e);
        }
    }

    /// Remove a single entry.
    pub async fn delete(&self, key: &str, storage: StorageKind) {
        if let Some(backend) = self.backend(storage) {
            Self::purge(backend, key).await;
        }
    }

    /// Empty every backend.
    pub async fn clear(&self) {
        if let Err(e) = self.memory.clear().await {
            report_failure(None, "failed to clear in-memory cache", &e);
        }
        if let Some(persistent) = &self.persistent
            && let Err(e) = persistent.clear().await
        {
            report_failure(None, "failed to clear persistent cache", &e);
        }
    }

    async fn purge(backend: &Arc<dyn CacheBackend>, key: &str) {
        if let Err(e) = backend.delete(key).await {
            report_failure(Some(key), "failed to purge cache entry", &e);
        }
    }
}
