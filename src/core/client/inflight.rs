//! Bookkeeping for transport calls that are currently running.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// One running transport call.
#[derive(Debug, Clone)]
pub struct InFlightRequest {
    pub url: String,
    pub cancel: CancellationToken,
    pub started_at: Instant,
    seq: u64,
}

/// Active requests keyed by a per-call identifier, so identical URLs can coexist.
#[derive(Debug, Default)]
pub struct InFlightRegistry {
    entries: Mutex<HashMap<Uuid, InFlightRequest>>,
    next_seq: AtomicU64,
}

impl InFlightRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, InFlightRequest>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, id: Uuid, url: impl Into<String>, cancel: CancellationToken) {
        let url = url.into();
        #[cfg(feature = "tracing")]
        tracing::debug!(%id, %url, "registering in-flight request");
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(
            id,
            InFlightRequest {
                url,
                cancel,
                started_at: Instant::now(),
                seq,
            },
        );
    }

    pub fn deregister(&self, id: Uuid) {
        if let Some(_entry) = self.lock().remove(&id) {
            #[cfg(feature = "tracing")]
            tracing::debug!(%id, "deregistered in-flight request");
        }
    }

    /// Signal and remove one request. Returns whether it was found.
    pub fn cancel(&self, id: Uuid) -> bool {
        let entry = self.lock().remove(&id);
        match entry {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Signal and remove the oldest request whose URL matches. Returns whether one was found.
    pub fn cancel_by_url(&self, url: &str) -> bool {
        let mut entries = self.lock();
        let oldest = entries
            .iter()
            .filter(|(_, e)| e.url == url)
            .min_by_key(|(_, e)| e.seq)
            .map(|(id, _)| *id);
        match oldest.and_then(|id| entries.remove(&id)) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Signal and remove every request. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self.lock().drain().map(|(_, e)| e).collect();
        for entry in &drained {
            entry.cancel.cancel();
        }
        drained.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.lock().contains_key(&id)
    }
}

/// Registration that is removed from the registry when dropped, whichever way the
/// owning attempt exits.
#[derive(Debug)]
pub(crate) struct InFlightGuard {
    registry: Arc<InFlightRegistry>,
    id: Uuid,
    cancel: CancellationToken,
}

impl InFlightGuard {
    pub(crate) fn register(registry: &Arc<InFlightRegistry>, url: &str) -> Self {
        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        registry.register(id, url, cancel.clone());
        Self {
            registry: Arc::clone(registry),
            id,
            cancel,
        }
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.deregister(self.id);
    }
}
