//! Virtual-node lifecycle
//!
//! `absent → virtual → {real, absent}`. A virtual node is confirmed (content
//! fetched and swapped in place, command executed, relation expanded),
//! expires after a timeout, or waits indefinitely.
//!
//! Every in-flight operation runs under a [`RequestToken`]. After each
//! suspension point the node must still exist and still carry that token,
//! otherwise the result is discarded.

use crate::error::GraphError;
use crate::link::GraphLink;
use crate::node::{
    ConfirmMode, GraphNode, NodeId, NodeKind, NodeShape, NodeState, RequestToken, VirtualPhase,
    VirtualToken,
};
use crate::view::GraphView;
use futures::future::BoxFuture;
use ibgib_content::{ContentSnapshot, IbGibId};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Seam between the graph and the rest of the system
#[async_trait::async_trait]
pub trait NodeResolver: Send + Sync {
    /// Resolve content, cache first
    async fn fetch(&self, id: &IbGibId) -> Result<Arc<ContentSnapshot>, GraphError>;

    /// Run the action behind a command node
    async fn execute(&self, command: &GraphNode, source: Option<&GraphNode>) -> Result<(), GraphError>;

    /// Follow-on virtual nodes offered for resolved content
    fn affordances(&self, snapshot: &ContentSnapshot) -> Vec<VirtualSpec>;
}

/// Parameters for [`NodeLifecycle::add_virtual`]
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualSpec {
    pub kind: NodeKind,
    pub content_ref: Option<IbGibId>,
    pub source: Option<NodeId>,
    pub shape: NodeShape,
    pub auto_confirm: bool,
    pub expiry: Option<Duration>,
}

impl VirtualSpec {
    #[must_use]
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            content_ref: None,
            source: None,
            shape: NodeShape::Circle,
            auto_confirm: false,
            expiry: None,
        }
    }

    /// Placeholder for content
    #[must_use]
    pub fn content(id: IbGibId) -> Self {
        Self {
            content_ref: Some(id),
            ..Self::new(NodeKind::Content)
        }
    }

    /// Placeholder for content not known yet (speculative)
    #[must_use]
    pub fn speculative() -> Self {
        Self::new(NodeKind::Content)
    }

    /// Action affordance
    #[must_use]
    pub fn command(name: impl Into<String>) -> Self {
        Self {
            shape: NodeShape::Square,
            ..Self::new(NodeKind::command(name))
        }
    }

    /// Relation expander
    #[must_use]
    pub fn relation(name: impl Into<String>) -> Self {
        Self {
            shape: NodeShape::Diamond,
            ..Self::new(NodeKind::relation(name))
        }
    }

    /// Link from `source`
    #[must_use]
    pub fn from(mut self, source: NodeId) -> Self {
        self.source = Some(source);
        self
    }

    #[must_use]
    pub fn with_shape(mut self, shape: NodeShape) -> Self {
        self.shape = shape;
        self
    }

    #[must_use]
    pub fn auto_confirm(mut self) -> Self {
        self.auto_confirm = true;
        self
    }

    #[must_use]
    pub fn expire_after(mut self, expiry: Duration) -> Self {
        self.expiry = Some(expiry);
        self
    }
}

/// Why a confirm did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotFound,
    AlreadyReal,
    /// An operation is already in flight
    Busy,
}

/// Result of a confirmation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// Content resolved; node is real
    Confirmed,
    /// Command ran; node removed
    Executed,
    /// Relation expanded with this many new members
    Expanded(usize),
    Skipped(SkipReason),
    /// Node was removed or re-requested while in flight
    Stale,
    /// Node is errored (or back to pending) with this reason
    Failed(String),
}

struct Timer {
    seq: u64,
    handle: JoinHandle<()>,
}

struct LifecycleInner {
    view: GraphView,
    resolver: Arc<dyn NodeResolver>,
    timers: Mutex<HashMap<NodeId, Timer>>,
    timer_seq: AtomicU64,
    show_affordances: bool,
}

/// Drives virtual nodes on one view
#[derive(Clone)]
pub struct NodeLifecycle {
    inner: Arc<LifecycleInner>,
}

impl fmt::Debug for NodeLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeLifecycle")
            .field("view", &self.inner.view)
            .field("pending_timers", &self.pending_timers())
            .finish_non_exhaustive()
    }
}

impl NodeLifecycle {
    #[must_use]
    pub fn new(view: GraphView, resolver: Arc<dyn NodeResolver>) -> Self {
        Self::with_affordances(view, resolver, true)
    }

    /// Control whether confirmed content gets follow-on affordances
    #[must_use]
    pub fn with_affordances(view: GraphView, resolver: Arc<dyn NodeResolver>, show_affordances: bool) -> Self {
        Self {
            inner: Arc::new(LifecycleInner {
                view,
                resolver,
                timers: Mutex::new(HashMap::new()),
                timer_seq: AtomicU64::new(0),
                show_affordances,
            }),
        }
    }

    #[inline]
    #[must_use]
    pub fn view(&self) -> &GraphView {
        &self.inner.view
    }

    /// Add a virtual node
    ///
    /// Linked from `spec.source` when given. Then either confirmed right away
    /// (`auto_confirm`), scheduled for removal (`expiry`), or left waiting.
    ///
    /// # Errors
    /// [`GraphError::DanglingLink`] if the source is not in the view
    pub async fn add_virtual(&self, spec: VirtualSpec) -> Result<NodeId, GraphError> {
        let mut node = GraphNode::virtual_node(spec.kind, spec.content_ref).with_shape(spec.shape);
        let mut links = Vec::new();
        if let Some(source) = spec.source {
            node = node.with_source(source);
            links.push(GraphLink::new(source, node.id));
        }
        let id = node.id;
        let token = node.virtual_token();
        self.inner.view.add(vec![node], &links, true)?;
        tracing::debug!(node = %id, "virtual node added");

        if spec.auto_confirm {
            let outcome = self.confirm(id).await;
            tracing::debug!(node = %id, ?outcome, "auto-confirmed");
        } else if let (Some(expiry), Some(token)) = (spec.expiry, token) {
            self.schedule_expiry(id, token, expiry);
        }
        Ok(id)
    }

    /// Confirm a virtual node
    ///
    /// A no-op for real nodes and for nodes with an operation in flight.
    /// Errored nodes are retried.
    pub fn confirm(&self, id: NodeId) -> BoxFuture<'_, ConfirmOutcome> {
        Box::pin(async move {
            let begun = self.inner.view.update_node(id, |n| {
                if n.is_real() {
                    Err(SkipReason::AlreadyReal)
                } else {
                    n.begin(VirtualPhase::Confirming).ok_or(SkipReason::Busy)
                }
            });
            let token = match begun {
                None => return ConfirmOutcome::Skipped(SkipReason::NotFound),
                Some(Err(reason)) => {
                    tracing::debug!(node = %id, ?reason, "confirm skipped");
                    return ConfirmOutcome::Skipped(reason);
                }
                Some(Ok(token)) => token,
            };
            self.cancel_expiry(id);

            let Some(node) = self.inner.view.node(id) else {
                return ConfirmOutcome::Stale;
            };
            match node.kind.confirm_mode() {
                ConfirmMode::Fetch => self.confirm_content(node, token).await,
                ConfirmMode::Execute => self.confirm_command(node, token).await,
                ConfirmMode::Expand => self.confirm_relation(node, token).await,
            }
        })
    }

    async fn confirm_content(&self, node: GraphNode, token: RequestToken) -> ConfirmOutcome {
        let Some(content_ref) = node.content_ref.clone() else {
            tracing::error!(node = %node.id, "confirm on node without content reference");
            self.settle(node.id, token, VirtualPhase::Pending);
            return ConfirmOutcome::Failed("missing content reference".to_string());
        };

        let fetched = self.inner.resolver.fetch(&content_ref).await;
        if !self.is_current(node.id, token) {
            tracing::debug!(node = %node.id, %token, "discarding stale fetch");
            return ConfirmOutcome::Stale;
        }

        let snapshot = match fetched {
            Ok(snapshot) => snapshot,
            Err(e) => return self.fail(node.id, token, &e),
        };

        let mut real = node;
        real.state = NodeState::Real;
        real.content_ref = Some(snapshot.id());
        real.snapshot = Some(Arc::clone(&snapshot));
        let id = real.id;
        if let Err(e) = self.inner.view.replace(real, true) {
            tracing::warn!(node = %id, error = %e, "confirmed node vanished");
            return ConfirmOutcome::Stale;
        }
        tracing::info!(node = %id, content = %snapshot.id(), "virtual node confirmed");

        self.add_affordances(id, &snapshot).await;
        ConfirmOutcome::Confirmed
    }

    async fn confirm_command(&self, node: GraphNode, token: RequestToken) -> ConfirmOutcome {
        let source = node.source.and_then(|s| self.inner.view.node(s));
        let executed = self.inner.resolver.execute(&node, source.as_ref()).await;
        if !self.is_current(node.id, token) {
            tracing::debug!(node = %node.id, %token, "discarding stale command result");
            return ConfirmOutcome::Stale;
        }

        match executed {
            Ok(()) => {
                if let Err(e) = self.inner.view.remove(node.id, true) {
                    tracing::warn!(node = %node.id, error = %e, "command node already gone");
                }
                ConfirmOutcome::Executed
            }
            Err(e) => self.fail(node.id, token, &e),
        }
    }

    async fn confirm_relation(&self, node: GraphNode, token: RequestToken) -> ConfirmOutcome {
        let name = node.kind.name().unwrap_or_default().to_string();
        let snapshot = node
            .source
            .and_then(|s| self.inner.view.node(s))
            .and_then(|s| s.snapshot);
        let Some(snapshot) = snapshot else {
            tracing::error!(node = %node.id, relation = %name, "relation node without resolved source");
            self.settle(node.id, token, VirtualPhase::Pending);
            return ConfirmOutcome::Failed("relation source not resolved".to_string());
        };

        let shown: HashSet<IbGibId> = self.inner.view.read(|data| {
            data.children_of(node.id)
                .into_iter()
                .filter_map(|child| data.node(child).and_then(|n| n.content_ref.clone()))
                .collect()
        });

        let mut added = 0;
        for member in snapshot.relation(&name) {
            if shown.contains(member) {
                continue;
            }
            match self.add_virtual(VirtualSpec::content(member.clone()).from(node.id)).await {
                Ok(_) => added += 1,
                Err(e) => tracing::warn!(node = %node.id, member = %member, error = %e, "member not added"),
            }
        }

        if !self.is_current(node.id, token) {
            return ConfirmOutcome::Stale;
        }
        let mut expanded = node;
        expanded.state = NodeState::Real;
        let id = expanded.id;
        if let Err(e) = self.inner.view.replace(expanded, true) {
            tracing::warn!(node = %id, error = %e, "expanded node vanished");
            return ConfirmOutcome::Stale;
        }
        tracing::debug!(node = %id, relation = %name, added, "relation expanded");
        ConfirmOutcome::Expanded(added)
    }

    async fn add_affordances(&self, source: NodeId, snapshot: &ContentSnapshot) {
        if !self.inner.show_affordances {
            return;
        }
        for spec in self.inner.resolver.affordances(snapshot) {
            if let Err(e) = self.add_virtual(spec.from(source)).await {
                tracing::warn!(node = %source, error = %e, "affordance not added");
            }
        }
    }

    fn fail(&self, id: NodeId, token: RequestToken, error: &GraphError) -> ConfirmOutcome {
        let reason = error.to_string();
        tracing::warn!(node = %id, error = %reason, "virtual node errored");
        self.settle(id, token, VirtualPhase::Errored { reason: reason.clone() });
        ConfirmOutcome::Failed(reason)
    }

    fn settle(&self, id: NodeId, token: RequestToken, phase: VirtualPhase) -> bool {
        self.inner
            .view
            .update_node(id, |n| n.settle(token, phase))
            .unwrap_or(false)
    }

    /// Check if `token` is still the node's current request
    #[must_use]
    pub fn is_current(&self, id: NodeId, token: RequestToken) -> bool {
        self.inner
            .view
            .node(id)
            .is_some_and(|n| n.request() == Some(token))
    }

    /// Start a command round trip on a speculative node
    ///
    /// Returns `None` if the node is missing, real, or busy.
    pub fn begin_request(&self, id: NodeId) -> Option<RequestToken> {
        let token = self
            .inner
            .view
            .update_node(id, |n| n.begin(VirtualPhase::Submitting))
            .flatten()?;
        self.cancel_expiry(id);
        Some(token)
    }

    /// Point a speculative node at its content and confirm it
    ///
    /// Stale if the node is gone or `token` is no longer current.
    pub async fn resolve(&self, id: NodeId, token: RequestToken, content: IbGibId) -> ConfirmOutcome {
        let pointed = self
            .inner
            .view
            .update_node(id, |n| {
                if n.request() != Some(token) {
                    return false;
                }
                n.content_ref = Some(content);
                n.settle(token, VirtualPhase::Pending)
            })
            .unwrap_or(false);
        if !pointed {
            tracing::debug!(node = %id, %token, "discarding stale resolution");
            return ConfirmOutcome::Stale;
        }
        self.confirm(id).await
    }

    /// Remove a speculative node that turned out to have no direct effect
    pub fn discard(&self, id: NodeId, token: RequestToken) -> bool {
        if !self.is_current(id, token) {
            tracing::debug!(node = %id, %token, "discard ignored for stale token");
            return false;
        }
        self.cancel_expiry(id);
        self.inner.view.remove(id, true).is_ok()
    }

    /// Tag a speculative node as errored
    pub fn mark_errored(&self, id: NodeId, token: RequestToken, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let marked = self.settle(id, token, VirtualPhase::Errored { reason: reason.clone() });
        if marked {
            tracing::warn!(node = %id, %reason, "speculative node errored");
        } else {
            tracing::debug!(node = %id, %token, "error for stale request ignored");
        }
        marked
    }

    /// Remove any node, cancelling its timer
    ///
    /// # Errors
    /// [`GraphError::NodeNotFound`]
    pub fn remove(&self, id: NodeId) -> Result<(), GraphError> {
        self.cancel_expiry(id);
        self.inner.view.remove(id, true).map(|_| ())
    }

    /// User interaction: keep the node, cancel its expiry
    pub fn touch(&self, id: NodeId) -> bool {
        self.cancel_expiry(id)
    }

    /// Cancel a pending expiry; returns whether one existed
    pub fn cancel_expiry(&self, id: NodeId) -> bool {
        match self.inner.timers.lock().remove(&id) {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Number of scheduled expiries
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.inner.timers.lock().len()
    }

    fn schedule_expiry(&self, id: NodeId, token: VirtualToken, expiry: Duration) {
        let seq = self.inner.timer_seq.fetch_add(1, Ordering::Relaxed);
        let weak: Weak<LifecycleInner> = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(expiry).await;
            if let Some(inner) = weak.upgrade() {
                inner.expire(id, token, seq);
            }
        });

        let previous = self.inner.timers.lock().insert(id, Timer { seq, handle });
        if let Some(previous) = previous {
            previous.handle.abort();
        }
    }
}

impl LifecycleInner {
    fn expire(&self, id: NodeId, token: VirtualToken, seq: u64) {
        {
            let mut timers = self.timers.lock();
            if timers.get(&id).map(|t| t.seq) != Some(seq) {
                return;
            }
            timers.remove(&id);
        }

        // Only an untouched pending placeholder expires
        let expirable = self.view.node(id).is_some_and(|n| {
            n.virtual_token() == Some(token) && matches!(n.phase(), Some(VirtualPhase::Pending))
        });
        if !expirable {
            return;
        }
        match self.view.remove(id, true) {
            Ok(_) => tracing::debug!(node = %id, "virtual node expired"),
            Err(e) => tracing::debug!(node = %id, error = %e, "expired node already gone"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ibgib_content::rel8n;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn id(s: &str) -> IbGibId {
        IbGibId::from_str(s).unwrap()
    }

    #[derive(Default)]
    struct StubResolver {
        snapshots: Mutex<HashMap<IbGibId, Arc<ContentSnapshot>>>,
        delay: Option<Duration>,
        executed: Mutex<Vec<String>>,
        fail_execute: bool,
        affordances: Vec<VirtualSpec>,
    }

    impl StubResolver {
        fn with(snapshot: ContentSnapshot) -> Self {
            let resolver = Self::default();
            resolver.insert(snapshot);
            resolver
        }

        fn insert(&self, snapshot: ContentSnapshot) {
            self.snapshots.lock().insert(snapshot.id(), Arc::new(snapshot));
        }
    }

    #[async_trait::async_trait]
    impl NodeResolver for StubResolver {
        async fn fetch(&self, id: &IbGibId) -> Result<Arc<ContentSnapshot>, GraphError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.snapshots
                .lock()
                .get(id)
                .cloned()
                .ok_or_else(|| GraphError::resolve(id.to_string(), "not found"))
        }

        async fn execute(&self, command: &GraphNode, _source: Option<&GraphNode>) -> Result<(), GraphError> {
            let name = command.kind.name().unwrap_or_default().to_string();
            if self.fail_execute {
                return Err(GraphError::resolve(name, "refused"));
            }
            self.executed.lock().push(name);
            Ok(())
        }

        fn affordances(&self, _snapshot: &ContentSnapshot) -> Vec<VirtualSpec> {
            self.affordances.clone()
        }
    }

    fn lifecycle(resolver: StubResolver) -> NodeLifecycle {
        NodeLifecycle::new(GraphView::new(), Arc::new(resolver))
    }

    fn foo() -> ContentSnapshot {
        ContentSnapshot::new("foo").with_gib("abc")
    }

    #[tokio::test(start_paused = true)]
    async fn unconfirmed_node_expires() {
        let lc = lifecycle(StubResolver::default());
        let node = lc
            .add_virtual(VirtualSpec::content(id("foo^abc")).expire_after(Duration::from_millis(100)))
            .await
            .unwrap();
        assert_eq!(lc.pending_timers(), 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!lc.view().contains(node));
        assert_eq!(lc.pending_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn confirmed_node_survives_expiry() {
        let lc = lifecycle(StubResolver::with(foo()));
        let node = lc
            .add_virtual(VirtualSpec::content(id("foo^abc")).expire_after(Duration::from_millis(100)))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(lc.confirm(node).await, ConfirmOutcome::Confirmed);
        assert_eq!(lc.pending_timers(), 0);

        tokio::time::sleep(Duration::from_millis(140)).await;
        let confirmed = lc.view().node(node).unwrap();
        assert!(confirmed.is_real());
        assert_eq!(confirmed.snapshot.unwrap().id(), id("foo^abc"));
    }

    #[tokio::test(start_paused = true)]
    async fn touch_cancels_expiry() {
        let lc = lifecycle(StubResolver::default());
        let node = lc
            .add_virtual(VirtualSpec::content(id("foo^abc")).expire_after(Duration::from_millis(100)))
            .await
            .unwrap();

        assert!(lc.touch(node));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(lc.view().contains(node));
    }

    #[tokio::test(start_paused = true)]
    async fn second_confirm_while_busy_is_skipped() {
        let resolver = StubResolver {
            delay: Some(Duration::from_millis(50)),
            ..StubResolver::with(foo())
        };
        let lc = lifecycle(resolver);
        let node = lc.add_virtual(VirtualSpec::content(id("foo^abc"))).await.unwrap();

        let (first, second) = tokio::join!(lc.confirm(node), async {
            tokio::task::yield_now().await;
            lc.confirm(node).await
        });
        assert_eq!(first, ConfirmOutcome::Confirmed);
        assert_eq!(second, ConfirmOutcome::Skipped(SkipReason::Busy));
        assert_eq!(lc.confirm(node).await, ConfirmOutcome::Skipped(SkipReason::AlreadyReal));
    }

    #[tokio::test]
    async fn confirm_without_content_fails_quietly() {
        let lc = lifecycle(StubResolver::default());
        let node = lc.add_virtual(VirtualSpec::speculative()).await.unwrap();

        let outcome = lc.confirm(node).await;
        assert!(matches!(outcome, ConfirmOutcome::Failed(_)));
        assert_eq!(lc.view().node(node).unwrap().phase(), Some(&VirtualPhase::Pending));
    }

    #[tokio::test]
    async fn fetch_failure_marks_errored_then_retries() {
        let resolver = Arc::new(StubResolver::default());
        let lc = NodeLifecycle::new(GraphView::new(), Arc::clone(&resolver) as Arc<dyn NodeResolver>);
        let node = lc.add_virtual(VirtualSpec::content(id("foo^abc"))).await.unwrap();

        assert!(matches!(lc.confirm(node).await, ConfirmOutcome::Failed(_)));
        assert!(lc.view().node(node).unwrap().is_errored());
        assert!(lc.view().node(node).unwrap().render_hint().errored);

        resolver.insert(foo());
        assert_eq!(lc.confirm(node).await, ConfirmOutcome::Confirmed);
    }

    #[tokio::test(start_paused = true)]
    async fn removal_during_fetch_is_stale() {
        let resolver = StubResolver {
            delay: Some(Duration::from_millis(50)),
            ..StubResolver::with(foo())
        };
        let lc = lifecycle(resolver);
        let node = lc.add_virtual(VirtualSpec::content(id("foo^abc"))).await.unwrap();

        let (outcome, ()) = tokio::join!(lc.confirm(node), async {
            tokio::task::yield_now().await;
            lc.remove(node).unwrap();
        });
        assert_eq!(outcome, ConfirmOutcome::Stale);
        assert!(!lc.view().contains(node));
    }

    #[tokio::test]
    async fn command_node_executes_and_leaves() {
        let lc = lifecycle(StubResolver::with(foo()));
        let src = GraphNode::real(Arc::new(foo()));
        let src_id = src.id;
        lc.view().add(vec![src], &[], true).unwrap();

        let cmd = lc.add_virtual(VirtualSpec::command("fork").from(src_id)).await.unwrap();
        assert_eq!(lc.confirm(cmd).await, ConfirmOutcome::Executed);
        assert!(!lc.view().contains(cmd));
        assert_eq!(lc.view().link_count(), 0);
    }

    #[tokio::test]
    async fn failed_command_stays_errored() {
        let resolver = StubResolver {
            fail_execute: true,
            ..StubResolver::default()
        };
        let lc = lifecycle(resolver);
        let cmd = lc.add_virtual(VirtualSpec::command("fork")).await.unwrap();

        assert!(matches!(lc.confirm(cmd).await, ConfirmOutcome::Failed(_)));
        assert!(lc.view().node(cmd).unwrap().is_errored());
    }

    #[tokio::test]
    async fn relation_expands_members_once() {
        let lc = lifecycle(StubResolver::default());
        let src_snapshot = foo().with_relation("comment", vec![id("comment a^1"), id("comment b^1")]);
        let src = GraphNode::real(Arc::new(src_snapshot));
        let src_id = src.id;
        lc.view().add(vec![src], &[], true).unwrap();

        let rel = lc.add_virtual(VirtualSpec::relation("comment").from(src_id)).await.unwrap();
        assert_eq!(lc.confirm(rel).await, ConfirmOutcome::Expanded(2));
        assert!(lc.view().node(rel).unwrap().is_real());
        assert_eq!(lc.view().find_by_content(&id("comment a^1")).len(), 1);
        assert!(lc.view().check_integrity().is_ok());
    }

    #[tokio::test]
    async fn confirmed_content_gets_affordances() {
        let resolver = StubResolver {
            affordances: vec![VirtualSpec::command("fork"), VirtualSpec::relation(rel8n::PAST)],
            ..StubResolver::with(foo())
        };
        let lc = lifecycle(resolver);
        let node = lc
            .add_virtual(VirtualSpec::content(id("foo^abc")).auto_confirm())
            .await
            .unwrap();

        assert!(lc.view().node(node).unwrap().is_real());
        let children = lc.view().read(|d| d.children_of(node));
        assert_eq!(children.len(), 2);
        assert_eq!(lc.view().link_count(), 2);
    }

    #[tokio::test]
    async fn speculative_round_trip() {
        let lc = lifecycle(StubResolver::with(ContentSnapshot::new("bar").with_gib("def")));
        let node = lc.add_virtual(VirtualSpec::speculative()).await.unwrap();

        let token = lc.begin_request(node).unwrap();
        assert!(lc.begin_request(node).is_none());
        assert_eq!(lc.resolve(node, token, id("bar^def")).await, ConfirmOutcome::Confirmed);
        assert_eq!(lc.view().node(node).unwrap().content_ref, Some(id("bar^def")));
    }

    #[tokio::test]
    async fn stale_token_is_ignored() {
        let lc = lifecycle(StubResolver::default());
        let node = lc.add_virtual(VirtualSpec::speculative()).await.unwrap();

        let old = lc.begin_request(node).unwrap();
        assert!(lc.mark_errored(node, old, "timeout"));
        let _new = lc.begin_request(node).unwrap();

        assert_eq!(lc.resolve(node, old, id("bar^def")).await, ConfirmOutcome::Stale);
        assert!(!lc.discard(node, old));
        assert!(lc.view().contains(node));
    }

    #[tokio::test]
    async fn copied_overlay_sees_errored_phase() {
        let lc = lifecycle(StubResolver::default());
        let overlay = lc.view().attach_child(false);
        let node = lc.add_virtual(VirtualSpec::speculative()).await.unwrap();

        let token = lc.begin_request(node).unwrap();
        assert!(lc.mark_errored(node, token, "socket closed"));
        assert!(matches!(
            overlay.node(node).unwrap().state,
            NodeState::Virtual {
                phase: VirtualPhase::Errored { .. },
                ..
            }
        ));
    }
}
