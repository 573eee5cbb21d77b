//! Latest-pointer cache
//!
//! Redirects stale references to the most recent known successor in the
//! same timeline without re-fetching. Last write wins: every writer is
//! advancing the same timeline forward.

use crate::store::{KeyValueStore, LATEST_PREFIX};
use dashmap::DashMap;
use ibgib_content::IbGibId;
use std::sync::Arc;

/// Content identifier → latest known successor
#[derive(Debug, Clone, Default)]
pub struct LatestCache {
    inner: Arc<DashMap<IbGibId, IbGibId>>,
    store: Option<Arc<dyn KeyValueStore>>,
}

impl LatestCache {
    /// Create memory-only cache
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create cache persisting through a backing store
    #[inline]
    #[must_use]
    pub fn with_store(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            store: Some(store),
        }
    }

    /// Record `new_id` as the latest successor of `old_id`
    pub async fn set(&self, old_id: IbGibId, new_id: IbGibId) {
        tracing::debug!(old = %old_id, new = %new_id, "latest pointer advanced");
        if let Some(store) = &self.store {
            if let Err(e) = store.set(&latest_key(&old_id), new_id.to_string()).await {
                tracing::warn!(id = %old_id, error = %e, "failed to persist latest pointer");
            }
        }
        self.inner.insert(old_id, new_id);
    }

    /// Latest known successor of `id`
    #[must_use]
    pub async fn get(&self, id: &IbGibId) -> Option<IbGibId> {
        if let Some(hit) = self.inner.get(id) {
            return Some(hit.value().clone());
        }

        let store = self.store.as_ref()?;
        let raw = match store.get(&latest_key(id)).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "failed to read latest pointer");
                return None;
            }
        };
        match raw.parse::<IbGibId>() {
            Ok(latest) => {
                self.inner.insert(id.clone(), latest.clone());
                Some(latest)
            }
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "discarding malformed latest pointer");
                None
            }
        }
    }

    /// Latest known successor, or `id` itself
    #[must_use]
    pub async fn latest_or_self(&self, id: &IbGibId) -> IbGibId {
        self.get(id).await.unwrap_or_else(|| id.clone())
    }

    /// Number of pointers held in memory
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

fn latest_key(id: &IbGibId) -> String {
    format!("{LATEST_PREFIX}{id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::str::FromStr;

    fn id(s: &str) -> IbGibId {
        IbGibId::from_str(s).unwrap()
    }

    #[tokio::test]
    async fn set_and_get() {
        let cache = LatestCache::new();
        assert_eq!(cache.get(&id("x^1")).await, None);

        cache.set(id("x^1"), id("x^2")).await;
        assert_eq!(cache.get(&id("x^1")).await, Some(id("x^2")));
    }

    #[tokio::test]
    async fn last_write_wins() {
        let cache = LatestCache::new();
        cache.set(id("x^1"), id("x^2")).await;
        cache.set(id("x^1"), id("x^3")).await;
        assert_eq!(cache.get(&id("x^1")).await, Some(id("x^3")));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn latest_or_self_falls_back() {
        let cache = LatestCache::new();
        assert_eq!(cache.latest_or_self(&id("y^1")).await, id("y^1"));
    }

    #[tokio::test]
    async fn clones_share_state() {
        let cache = LatestCache::new();
        let writer = cache.clone();
        writer.set(id("x^1"), id("x^2")).await;
        assert_eq!(cache.get(&id("x^1")).await, Some(id("x^2")));
    }

    #[tokio::test]
    async fn concurrent_writers_leave_one_pointer() {
        let cache = LatestCache::new();
        let mut handles = Vec::new();
        for n in 2..12 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.set(id("x^1"), id(&format!("x^{n}"))).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&id("x^1")).await.is_some());
    }

    #[tokio::test]
    async fn persisted_pointer_survives_new_cache() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        LatestCache::with_store(Arc::clone(&store))
            .set(id("x^1"), id("x^2"))
            .await;

        let fresh = LatestCache::with_store(store);
        assert_eq!(fresh.get(&id("x^1")).await, Some(id("x^2")));
    }
}
