//! Content-addressed snapshot cache using moka
//!
//! Content is immutable, so entries never go stale; the only eviction is the
//! capacity quota.

use crate::error::CacheError;
use crate::store::{KeyValueStore, CONTENT_PREFIX};
use ibgib_content::{ContentSnapshot, IbGibId};
use moka::future::Cache;
use std::sync::Arc;

/// Statistics for cache monitoring
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of entries held in memory
    pub entry_count: u64,
}

/// Content identifier → snapshot cache
///
/// - `put` is idempotent: storing identical content twice leaves one entry
/// - `get` checks memory, then the backing store (warming memory on a hit)
/// - the key is always recomputed from the document, never trusted from
///   the caller
#[derive(Debug, Clone)]
pub struct ContentCache {
    inner: Cache<IbGibId, Arc<ContentSnapshot>>,
    store: Option<Arc<dyn KeyValueStore>>,
}

impl ContentCache {
    /// Create memory-only cache with max capacity
    #[inline]
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::new(max_capacity),
            store: None,
        }
    }

    /// Create cache persisting through a backing store
    #[inline]
    #[must_use]
    pub fn with_store(max_capacity: u64, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            inner: Cache::new(max_capacity),
            store: Some(store),
        }
    }

    /// Store a snapshot under its derived identifier
    ///
    /// Returns `Ok(true)` if the snapshot was newly stored and `Ok(false)` if
    /// it was already cached.
    ///
    /// # Errors
    /// Returns [`CacheError::Validation`] for malformed snapshots, which are
    /// not stored
    pub async fn put(&self, snapshot: ContentSnapshot) -> Result<bool, CacheError> {
        if let Err(e) = snapshot.validate() {
            tracing::error!(ib = %snapshot.ib, error = %e, "rejecting malformed snapshot");
            return Err(e.into());
        }

        let id = snapshot.id();
        let snapshot = Arc::new(snapshot);
        let entry = self
            .inner
            .entry(id.clone())
            .or_insert_with(async { Arc::clone(&snapshot) })
            .await;
        if !entry.is_fresh() {
            tracing::trace!(id = %id, "snapshot already cached");
            return Ok(false);
        }

        if let Some(store) = &self.store {
            match serde_json::to_string(snapshot.as_ref()) {
                Ok(json) => {
                    if let Err(e) = store.set(&content_key(&id), json).await {
                        tracing::warn!(id = %id, error = %e, "failed to persist snapshot");
                    }
                }
                Err(e) => tracing::warn!(id = %id, error = %e, "failed to serialize snapshot"),
            }
        }

        tracing::debug!(id = %id, "snapshot cached");
        Ok(true)
    }

    /// Get snapshot by identifier
    #[must_use]
    pub async fn get(&self, id: &IbGibId) -> Option<Arc<ContentSnapshot>> {
        if let Some(hit) = self.inner.get(id).await {
            return Some(hit);
        }

        let store = self.store.as_ref()?;
        let json = match store.get(&content_key(id)).await {
            Ok(Some(json)) => json,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "failed to read persisted snapshot");
                return None;
            }
        };

        let snapshot: ContentSnapshot = match serde_json::from_str(&json) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "discarding unreadable persisted snapshot");
                return None;
            }
        };
        if snapshot.validate().is_err() || &snapshot.id() != id {
            tracing::warn!(id = %id, stored = %snapshot.id(), "persisted snapshot does not match its key");
            return None;
        }

        let snapshot = Arc::new(snapshot);
        self.inner.insert(id.clone(), Arc::clone(&snapshot)).await;
        Some(snapshot)
    }

    /// Check if a snapshot is cached (memory or store)
    #[inline]
    #[must_use]
    pub async fn exists(&self, id: &IbGibId) -> bool {
        self.get(id).await.is_some()
    }

    /// Temporal junction of a cached snapshot
    #[must_use]
    pub async fn temporal_junction(&self, id: &IbGibId) -> Option<IbGibId> {
        self.get(id).await.map(|s| s.temporal_junction())
    }

    /// Flush moka's pending maintenance so counts are exact
    pub async fn run_pending_tasks(&self) {
        self.inner.run_pending_tasks().await;
    }

    /// Get cache statistics
    #[inline]
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.inner.entry_count(),
        }
    }

    /// Get approximate entry count
    #[inline]
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

impl Default for ContentCache {
    /// Create cache with default capacity (10,000 entries)
    fn default() -> Self {
        Self::new(10_000)
    }
}

fn content_key(id: &IbGibId) -> String {
    format!("{CONTENT_PREFIX}{id}")
}
