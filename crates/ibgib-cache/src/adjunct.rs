//! Adjunct cache
//!
//! Groups pending contributions (adjuncts) by the timeline they target. An
//! adjunct is content another identity attached to ours that has not been
//! linked back yet; it is cleared once acknowledged.

use dashmap::DashMap;
use ibgib_content::{ContentSnapshot, IbGibId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One pending contribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjunctInfo {
    /// The contribution itself
    pub adjunct_id: IbGibId,
    /// Timeline the contribution targets
    pub target_timeline_id: IbGibId,
    /// Timeline of the contribution
    pub adjunct_timeline_id: IbGibId,
    /// Snapshot of the contribution
    pub adjunct_snapshot: ContentSnapshot,
    /// Relation on the adjunct pointing at the target
    pub adjunct_relation_name: String,
    /// Relation the target will use once it links the adjunct
    pub target_relation_name: String,
}

/// Target timeline id → pending adjuncts
#[derive(Debug, Clone, Default)]
pub struct AdjunctCache {
    groups: Arc<DashMap<IbGibId, Vec<AdjunctInfo>>>,
}

impl AdjunctCache {
    /// Create empty cache
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an adjunct under its target timeline
    ///
    /// A duplicate `adjunct_id` for the same target is ignored with a warning.
    /// Returns whether the adjunct was added.
    pub fn add(&self, target_timeline_id: IbGibId, info: AdjunctInfo) -> bool {
        let mut group = self.groups.entry(target_timeline_id.clone()).or_default();
        if group.iter().any(|a| a.adjunct_id == info.adjunct_id) {
            tracing::warn!(
                target = %target_timeline_id,
                adjunct = %info.adjunct_id,
                "adjunct already cached"
            );
            return false;
        }
        tracing::debug!(target = %target_timeline_id, adjunct = %info.adjunct_id, "adjunct cached");
        group.push(info);
        true
    }

    /// All adjuncts for a target (empty if none)
    #[must_use]
    pub fn get_all(&self, target_timeline_id: &IbGibId) -> Vec<AdjunctInfo> {
        self.groups
            .get(target_timeline_id)
            .map(|g| g.value().clone())
            .unwrap_or_default()
    }

    /// Drop every adjunct for a target
    pub fn clear(&self, target_timeline_id: &IbGibId) {
        self.groups.remove(target_timeline_id);
    }

    /// Drop one adjunct; returns it if it was present
    pub fn remove(&self, target_timeline_id: &IbGibId, adjunct_id: &IbGibId) -> Option<AdjunctInfo> {
        let mut group = self.groups.get_mut(target_timeline_id)?;
        let idx = group.iter().position(|a| &a.adjunct_id == adjunct_id)?;
        let removed = group.remove(idx);
        let now_empty = group.is_empty();
        drop(group);
        if now_empty {
            self.groups.remove_if(target_timeline_id, |_, g| g.is_empty());
        }
        Some(removed)
    }

    /// Find an adjunct in any group
    ///
    /// Linear scan; the working set is small.
    #[must_use]
    pub fn find_by_adjunct_id(&self, adjunct_id: &IbGibId) -> Option<AdjunctInfo> {
        self.groups.iter().find_map(|group| {
            group
                .value()
                .iter()
                .find(|a| &a.adjunct_id == adjunct_id)
                .cloned()
        })
    }

    /// Total number of cached adjuncts
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.value().len()).sum()
    }

    /// Check if empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn id(s: &str) -> IbGibId {
        IbGibId::from_str(s).unwrap()
    }

    fn info(adjunct: &str, target: &str) -> AdjunctInfo {
        let adjunct_id = id(adjunct);
        AdjunctInfo {
            adjunct_id: adjunct_id.clone(),
            target_timeline_id: id(target),
            adjunct_timeline_id: adjunct_id.clone(),
            adjunct_snapshot: ContentSnapshot::new(adjunct_id.ib()).with_gib(adjunct_id.gib()),
            adjunct_relation_name: "adjunct_to".to_string(),
            target_relation_name: "comment".to_string(),
        }
    }

    #[test]
    fn add_and_get_all() {
        let cache = AdjunctCache::new();
        assert!(cache.add(id("t^1"), info("comment a^1", "t^1")));
        assert!(cache.add(id("t^1"), info("comment b^1", "t^1")));

        let all = cache.get_all(&id("t^1"));
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].adjunct_id, id("comment a^1"));
    }

    #[test]
    fn duplicate_adjunct_is_ignored() {
        let cache = AdjunctCache::new();
        assert!(cache.add(id("t^1"), info("comment a^1", "t^1")));
        assert!(!cache.add(id("t^1"), info("comment a^1", "t^1")));
        assert_eq!(cache.get_all(&id("t^1")).len(), 1);
    }

    #[test]
    fn same_adjunct_under_different_targets() {
        let cache = AdjunctCache::new();
        assert!(cache.add(id("t^1"), info("comment a^1", "t^1")));
        assert!(cache.add(id("u^1"), info("comment a^1", "u^1")));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn get_all_missing_is_empty() {
        let cache = AdjunctCache::new();
        assert!(cache.get_all(&id("nothing^0")).is_empty());
    }

    #[test]
    fn clear_target() {
        let cache = AdjunctCache::new();
        cache.add(id("t^1"), info("comment a^1", "t^1"));
        cache.add(id("u^1"), info("comment b^1", "u^1"));

        cache.clear(&id("t^1"));
        assert!(cache.get_all(&id("t^1")).is_empty());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn remove_single() {
        let cache = AdjunctCache::new();
        cache.add(id("t^1"), info("comment a^1", "t^1"));
        cache.add(id("t^1"), info("comment b^1", "t^1"));

        let removed = cache.remove(&id("t^1"), &id("comment a^1")).unwrap();
        assert_eq!(removed.adjunct_id, id("comment a^1"));
        assert_eq!(cache.len(), 1);
        assert!(cache.remove(&id("t^1"), &id("comment a^1")).is_none());

        cache.remove(&id("t^1"), &id("comment b^1"));
        assert!(cache.is_empty());
    }

    #[test]
    fn find_across_groups() {
        let cache = AdjunctCache::new();
        cache.add(id("t^1"), info("comment a^1", "t^1"));
        cache.add(id("u^1"), info("pic b^1", "u^1"));

        let found = cache.find_by_adjunct_id(&id("pic b^1")).unwrap();
        assert_eq!(found.target_timeline_id, id("u^1"));
        assert!(cache.find_by_adjunct_id(&id("pic z^9")).is_none());
    }
}
