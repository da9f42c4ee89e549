use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{CacheBackend, CacheEntry, CacheError};
use crate::core::client::constants::CACHE_NAMESPACE;

/// Durable cache backend on a `sled` tree. Entries are stored as JSON records.
///
/// The database may be shared with unrelated data: [`CacheBackend::clear`] only
/// removes keys under the crate's namespace prefix, and only those keys count towards
/// the capacity. sled I/O runs on the blocking pool.
#[derive(Debug, Clone)]
pub struct SledBackend {
    db: sled::Db,
    capacity: Option<usize>,
    stored: Arc<AtomicUsize>,
}

impl SledBackend {
    /// Open (or create) a database at `path`.
    ///
    /// # Errors
    /// Returns a backend error if sled cannot open the directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        Ok(Self::from_db(sled::open(path)?))
    }

    /// Wrap an open database. Existing namespaced entries are counted once here.
    pub fn from_db(db: sled::Db) -> Self {
        let stored = db
            .scan_prefix(CACHE_NAMESPACE)
            .keys()
            .filter(Result::is_ok)
            .count();
        Self {
            db,
            capacity: None,
            stored: Arc::new(AtomicUsize::new(stored)),
        }
    }

    /// Cap the number of namespaced entries. Writes of new keys beyond it fail with
    /// [`CacheError::QuotaExceeded`].
    #[must_use]
    pub const fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Number of namespaced entries currently stored.
    pub fn len(&self) -> usize {
        self.stored.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn counted(key: &[u8]) -> bool {
        key.starts_with(CACHE_NAMESPACE.as_bytes())
    }

    /// Claim a slot for a new key, atomically against the capacity.
    fn reserve(&self) -> Result<(), CacheError> {
        match self.capacity {
            Some(capacity) => self
                .stored
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                    (n < capacity).then_some(n + 1)
                })
                .map(|_| ())
                .map_err(|_| CacheError::QuotaExceeded { capacity }),
            None => {
                self.stored.fetch_add(1, Ordering::AcqRel);
                Ok(())
            }
        }
    }

    fn release(&self) {
        let _ = self
            .stored
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    fn insert_blocking(&self, key: &str, raw: Vec<u8>) -> Result<(), CacheError> {
        if !Self::counted(key.as_bytes()) {
            self.db.insert(key, raw)?;
            return Ok(());
        }
        let reserved = !self.db.contains_key(key)?;
        if reserved {
            self.reserve()?;
        }
        let previous = match self.db.insert(key, raw) {
            Ok(previous) => previous,
            Err(e) => {
                if reserved {
                    self.release();
                }
                return Err(e.into());
            }
        };
        match (reserved, previous.is_some()) {
            // another writer created the key between the check and the insert
            (true, true) => self.release(),
            // the key was removed between the check and the insert
            (false, false) => {
                self.stored.fetch_add(1, Ordering::AcqRel);
            }
            _ => {}
        }
        Ok(())
    }

    fn remove_blocking(&self, key: &[u8]) -> Result<(), CacheError> {
        if self.db.remove(key)?.is_some() && Self::counted(key) {
            self.release();
        }
        Ok(())
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, CacheError>
    where
        T: Send + 'static,
        F: FnOnce(&Self) -> Result<T, CacheError> + Send + 'static,
    {
        let this = self.clone();
        tokio::task::spawn_blocking(move || op(&this)).await?
    }
}

#[async_trait]
impl CacheBackend for SledBackend {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let key = key.to_string();
        let raw = self.blocking(move |this| Ok(this.db.get(key)?)).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, entry: &CacheEntry) -> Result<(), CacheError> {
        let raw = serde_json::to_vec(entry)?;
        let key = key.to_string();
        self.blocking(move |this| this.insert_blocking(&key, raw))
            .await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let key = key.to_string();
        self.blocking(move |this| this.remove_blocking(key.as_bytes()))
            .await
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.blocking(|this| {
            for key in this.db.scan_prefix(CACHE_NAMESPACE).keys() {
                this.remove_blocking(&key?)?;
            }
            Ok(())
        })
        .await
    }
}
