//! Content resolution and the graph seam
//!
//! [`ContentResolver`] resolves identifiers cache first, falling back to the
//! fetcher; the cache key is always recomputed from the fetched document.
//! [`GraphResolver`] adapts it (and command dispatch) to the graph's
//! [`NodeResolver`] seam.

use crate::commands::CommandRegistry;
use crate::dispatch::CommandDispatch;
use crate::error::SyncError;
use crate::fetch::ContentFetcher;
use ibgib_cache::ContentCache;
use ibgib_content::{ContentCategory, ContentSnapshot, GibHasher, IbGibId};
use ibgib_graph::{GraphError, GraphNode, NodeKind, NodeResolver, VirtualSpec};
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

/// Relations offered as expanders on resolved content
const EXPANDABLE: [&str; 4] = ["comment", "pic", "link", "tag"];

/// Cache-first snapshot resolution
#[derive(Clone)]
pub struct ContentResolver {
    content: ContentCache,
    fetcher: Arc<dyn ContentFetcher>,
    hasher: GibHasher,
}

impl fmt::Debug for ContentResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentResolver")
            .field("content", &self.content)
            .finish_non_exhaustive()
    }
}

impl ContentResolver {
    #[must_use]
    pub fn new(content: ContentCache, fetcher: Arc<dyn ContentFetcher>, hasher: GibHasher) -> Self {
        Self { content, fetcher, hasher }
    }

    #[inline]
    #[must_use]
    pub fn content(&self) -> &ContentCache {
        &self.content
    }

    /// Resolve a snapshot
    ///
    /// Primitives (`<ib>^gib`) are built locally. Everything else comes from
    /// the content cache or, on a miss, the fetcher; fetched documents are
    /// hash-checked (mismatches are only logged) and cached.
    ///
    /// # Errors
    /// [`SyncError::Fetch`] if the fetch fails, [`SyncError::Cache`] if the
    /// fetched document is malformed
    pub async fn resolve(&self, id: &IbGibId) -> Result<Arc<ContentSnapshot>, SyncError> {
        if id.is_primitive() {
            return Ok(Arc::new(ContentSnapshot::new(id.ib()).with_gib(id.gib())));
        }
        if let Some(hit) = self.content.get(id).await {
            tracing::trace!(id = %id, "content cache hit");
            return Ok(hit);
        }

        let snapshot = self.fetcher.fetch(id).await?;
        let derived = snapshot.id();
        if &derived != id {
            tracing::warn!(requested = %id, derived = %derived, "fetched snapshot has a different id");
        }
        if !self.hasher.verify(&snapshot) {
            tracing::warn!(id = %derived, "caching snapshot despite hash mismatch");
        }

        self.content.put(snapshot).await?;
        match self.content.get(&derived).await {
            Some(snapshot) => Ok(snapshot),
            None => Err(SyncError::Validation(format!("snapshot {derived} vanished from cache"))),
        }
    }
}

/// [`NodeResolver`] backed by the content resolver and command dispatch
pub struct GraphResolver {
    content: ContentResolver,
    registry: Arc<CommandRegistry>,
    dispatch: OnceLock<Weak<CommandDispatch>>,
    affordance_expiry: Duration,
}

impl fmt::Debug for GraphResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphResolver")
            .field("commands", &self.registry.len())
            .field("bound", &self.dispatch.get().is_some())
            .field("affordance_expiry", &self.affordance_expiry)
            .finish_non_exhaustive()
    }
}

impl GraphResolver {
    #[must_use]
    pub fn new(content: ContentResolver, registry: Arc<CommandRegistry>, affordance_expiry: Duration) -> Self {
        Self {
            content,
            registry,
            dispatch: OnceLock::new(),
            affordance_expiry,
        }
    }

    /// Route command nodes to `dispatch`
    ///
    /// Returns `false` if a dispatch was already bound.
    pub fn bind_dispatch(&self, dispatch: &Arc<CommandDispatch>) -> bool {
        self.dispatch.set(Arc::downgrade(dispatch)).is_ok()
    }

    #[inline]
    #[must_use]
    pub fn content(&self) -> &ContentResolver {
        &self.content
    }
}

#[async_trait::async_trait]
impl NodeResolver for GraphResolver {
    async fn fetch(&self, id: &IbGibId) -> Result<Arc<ContentSnapshot>, GraphError> {
        self.content
            .resolve(id)
            .await
            .map_err(|e| GraphError::resolve(id.to_string(), e.to_string()))
    }

    async fn execute(&self, command: &GraphNode, source: Option<&GraphNode>) -> Result<(), GraphError> {
        let NodeKind::Command(name) = &command.kind else {
            return Err(GraphError::resolve(command.id.to_string(), "not a command node"));
        };
        let Some(source) = source else {
            return Err(GraphError::resolve(name.clone(), "command node has no source"));
        };
        let Some(dispatch) = self.dispatch.get().and_then(Weak::upgrade) else {
            return Err(GraphError::resolve(name.clone(), "command dispatch not available"));
        };

        let state = dispatch
            .exec(source.id, name)
            .await
            .map_err(|e| GraphError::resolve(name.clone(), e.to_string()))?;
        tracing::debug!(command = %name, source = %source.id, ?state, "command node executed");
        Ok(())
    }

    fn affordances(&self, snapshot: &ContentSnapshot) -> Vec<VirtualSpec> {
        let category = snapshot.category();
        if category == ContentCategory::Root {
            return Vec::new();
        }

        let commands = self
            .registry
            .applicable(category)
            .map(|c| VirtualSpec::command(c.name()).expire_after(self.affordance_expiry));
        let relations = EXPANDABLE
            .iter()
            .filter(|name| !snapshot.relation(name).is_empty())
            .map(|name| VirtualSpec::relation(*name).expire_after(self.affordance_expiry));
        commands.chain(relations).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MapFetcher {
        snapshots: HashMap<IbGibId, ContentSnapshot>,
        calls: Mutex<Vec<IbGibId>>,
    }

    #[async_trait::async_trait]
    impl ContentFetcher for MapFetcher {
        async fn fetch(&self, id: &IbGibId) -> Result<ContentSnapshot, FetchError> {
            self.calls.lock().push(id.clone());
            self.snapshots
                .get(id)
                .cloned()
                .ok_or_else(|| FetchError::NotFound(id.clone()))
        }
    }

    fn hashed(ib: &str) -> ContentSnapshot {
        let mut snapshot = ContentSnapshot::new(ib).with_data("text", serde_json::json!(ib));
        snapshot.gib = GibHasher::new().compute(&snapshot).unwrap();
        snapshot
    }

    fn resolver(snapshots: Vec<ContentSnapshot>) -> (ContentResolver, Arc<MapFetcher>) {
        let fetcher = Arc::new(MapFetcher {
            snapshots: snapshots.into_iter().map(|s| (s.id(), s)).collect(),
            ..MapFetcher::default()
        });
        let resolver = ContentResolver::new(
            ContentCache::new(100),
            Arc::clone(&fetcher) as Arc<dyn ContentFetcher>,
            GibHasher::new(),
        );
        (resolver, fetcher)
    }

    #[tokio::test]
    async fn fetches_once_then_serves_from_cache() {
        let comment = hashed("comment hi");
        let (resolver, fetcher) = resolver(vec![comment.clone()]);

        let first = resolver.resolve(&comment.id()).await.unwrap();
        let second = resolver.resolve(&comment.id()).await.unwrap();
        assert_eq!(*first, comment);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(fetcher.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn primitives_are_local() {
        let (resolver, fetcher) = resolver(Vec::new());
        let text: IbGibId = "hello^gib".parse().unwrap();

        let snapshot = resolver.resolve(&text).await.unwrap();
        assert_eq!(snapshot.id(), text);
        assert!(fetcher.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn fetch_failure_surfaces() {
        let (resolver, _) = resolver(Vec::new());
        let missing: IbGibId = "foo^abc".parse().unwrap();
        assert!(matches!(
            resolver.resolve(&missing).await,
            Err(SyncError::Fetch(FetchError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn cache_key_comes_from_document() {
        let comment = hashed("comment hi");
        let alias: IbGibId = "alias^123".parse().unwrap();
        let (resolver, _) = resolver(Vec::new());
        let fetcher = Arc::new(MapFetcher {
            snapshots: HashMap::from([(alias.clone(), comment.clone())]),
            ..MapFetcher::default()
        });
        let resolver = ContentResolver::new(resolver.content().clone(), fetcher, GibHasher::new());

        let resolved = resolver.resolve(&alias).await.unwrap();
        assert_eq!(resolved.id(), comment.id());
        assert!(resolver.content().exists(&comment.id()).await);
        assert!(!resolver.content().exists(&alias).await);
    }

    #[test]
    fn affordances_follow_category_and_relations() {
        let (content, _) = resolver(Vec::new());
        let graph = GraphResolver::new(content, Arc::new(CommandRegistry::builtin()), Duration::from_secs(5));

        let bare = hashed("comment hi");
        assert_eq!(graph.affordances(&bare).len(), 7);

        let commented = bare.with_relation("comment", vec!["comment reply^1".parse().unwrap()]);
        let specs = graph.affordances(&commented);
        assert_eq!(specs.len(), 8);
        assert_eq!(specs.last().unwrap().kind, NodeKind::relation("comment"));
        assert!(specs.iter().all(|s| s.expiry == Some(Duration::from_secs(5))));

        assert!(graph.affordances(&ContentSnapshot::root()).is_empty());
    }

    #[tokio::test]
    async fn unbound_dispatch_fails_command() {
        let (content, _) = resolver(Vec::new());
        let graph = GraphResolver::new(content, Arc::new(CommandRegistry::builtin()), Duration::from_secs(5));
        let source = GraphNode::real(Arc::new(hashed("comment hi")));
        let command = GraphNode::virtual_node(NodeKind::command("fork"), None).with_source(source.id);

        let err = graph.execute(&command, Some(&source)).await.unwrap_err();
        assert!(err.to_string().contains("dispatch not available"));
    }
}
