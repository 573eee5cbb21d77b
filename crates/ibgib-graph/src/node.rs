//! Graph nodes
//!
//! A node is either real (backed by resolved content) or virtual (a
//! speculative placeholder). Behavior differs per [`NodeKind`] rather than
//! per type: content nodes fetch on confirm, command nodes execute, relation
//! nodes expand.

use ibgib_content::{ContentSnapshot, IbGibId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use ulid::Ulid;
use uuid::Uuid;

/// Graph-local node identifier
///
/// Stable across the virtual → real transition; the content a node shows is
/// tracked separately in [`GraphNode::content_ref`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(Ulid);

impl NodeId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Distinguishes a virtual node from a resolved node in the same slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VirtualToken(Uuid);

impl VirtualToken {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for VirtualToken {
    fn default() -> Self {
        Self::new()
    }
}

static NEXT_REQUEST: AtomicU64 = AtomicU64::new(1);

/// Monotonic token correlating an in-flight operation with its node
///
/// A response is applied only while the node still carries the token that
/// was current when the request started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestToken(u64);

impl RequestToken {
    pub(crate) fn next() -> Self {
        Self(NEXT_REQUEST.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a node represents
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// A content snapshot
    Content,
    /// An action affordance (`fork`, `comment`, ...)
    Command(String),
    /// A named relation of the source node's snapshot
    Relation(String),
}

/// How confirmation proceeds for a kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmMode {
    /// Fetch content and replace in place
    Fetch,
    /// Run the action, then drop the node
    Execute,
    /// Add the relation's members
    Expand,
}

impl NodeKind {
    #[must_use]
    pub fn command(name: impl Into<String>) -> Self {
        Self::Command(name.into())
    }

    #[must_use]
    pub fn relation(name: impl Into<String>) -> Self {
        Self::Relation(name.into())
    }

    #[must_use]
    pub fn confirm_mode(&self) -> ConfirmMode {
        match self {
            Self::Content => ConfirmMode::Fetch,
            Self::Command(_) => ConfirmMode::Execute,
            Self::Relation(_) => ConfirmMode::Expand,
        }
    }

    /// Command or relation name
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Content => None,
            Self::Command(name) | Self::Relation(name) => Some(name),
        }
    }
}

/// Progress of a virtual node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VirtualPhase {
    /// Waiting for confirmation or expiry
    Pending,
    /// Command round trip in flight
    Submitting,
    /// Content fetch or command execution in flight
    Confirming,
    /// Last operation failed; confirm again to retry
    Errored { reason: String },
}

impl VirtualPhase {
    /// Check if an operation is in flight
    #[inline]
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Submitting | Self::Confirming)
    }
}

/// Real or virtual
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeState {
    Real,
    Virtual {
        token: VirtualToken,
        phase: VirtualPhase,
        /// Token of the current or most recent operation
        request: Option<RequestToken>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NodeShape {
    #[default]
    Circle,
    Square,
    Diamond,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Everything an external renderer needs to draw a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderHint {
    pub shape: NodeShape,
    pub label: String,
    pub is_virtual: bool,
    pub busy: bool,
    pub errored: bool,
}

/// One displayed node
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub state: NodeState,
    /// Content shown (or to be shown) by this node
    pub content_ref: Option<IbGibId>,
    /// Resolved snapshot; only set on real content nodes
    pub snapshot: Option<Arc<ContentSnapshot>>,
    /// Node this one was derived from
    pub source: Option<NodeId>,
    pub shape: NodeShape,
    pub position: Option<Position>,
    pub pinned: bool,
}

impl GraphNode {
    /// Real content node for a resolved snapshot
    #[must_use]
    pub fn real(snapshot: Arc<ContentSnapshot>) -> Self {
        Self {
            id: NodeId::new(),
            kind: NodeKind::Content,
            state: NodeState::Real,
            content_ref: Some(snapshot.id()),
            snapshot: Some(snapshot),
            source: None,
            shape: NodeShape::Circle,
            position: None,
            pinned: false,
        }
    }

    /// Virtual node in the `Pending` phase
    #[must_use]
    pub fn virtual_node(kind: NodeKind, content_ref: Option<IbGibId>) -> Self {
        Self {
            id: NodeId::new(),
            kind,
            state: NodeState::Virtual {
                token: VirtualToken::new(),
                phase: VirtualPhase::Pending,
                request: None,
            },
            content_ref,
            snapshot: None,
            source: None,
            shape: NodeShape::Circle,
            position: None,
            pinned: false,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: NodeId) -> Self {
        self.source = Some(source);
        self
    }

    #[must_use]
    pub fn with_shape(mut self, shape: NodeShape) -> Self {
        self.shape = shape;
        self
    }

    #[must_use]
    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    #[inline]
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        matches!(self.state, NodeState::Virtual { .. })
    }

    #[inline]
    #[must_use]
    pub fn is_real(&self) -> bool {
        matches!(self.state, NodeState::Real)
    }

    #[must_use]
    pub fn phase(&self) -> Option<&VirtualPhase> {
        match &self.state {
            NodeState::Virtual { phase, .. } => Some(phase),
            NodeState::Real => None,
        }
    }

    #[must_use]
    pub fn virtual_token(&self) -> Option<VirtualToken> {
        match &self.state {
            NodeState::Virtual { token, .. } => Some(*token),
            NodeState::Real => None,
        }
    }

    /// Token of the current or most recent operation on a virtual node
    #[must_use]
    pub fn request(&self) -> Option<RequestToken> {
        match &self.state {
            NodeState::Virtual { request, .. } => *request,
            NodeState::Real => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_errored(&self) -> bool {
        matches!(self.phase(), Some(VirtualPhase::Errored { .. }))
    }

    /// Move a virtual node into an in-flight phase under a fresh token
    ///
    /// Returns `None` for real nodes and nodes already busy.
    pub(crate) fn begin(&mut self, next: VirtualPhase) -> Option<RequestToken> {
        match &mut self.state {
            NodeState::Virtual { phase, request, .. } if !phase.is_busy() => {
                let token = RequestToken::next();
                *phase = next;
                *request = Some(token);
                Some(token)
            }
            _ => None,
        }
    }

    /// Set the phase if `token` is still current
    pub(crate) fn settle(&mut self, token: RequestToken, next: VirtualPhase) -> bool {
        match &mut self.state {
            NodeState::Virtual { phase, request, .. } if *request == Some(token) => {
                *phase = next;
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn render_hint(&self) -> RenderHint {
        let label = match &self.kind {
            NodeKind::Content => self
                .content_ref
                .as_ref()
                .map_or_else(|| "?".to_string(), |id| id.ib().to_string()),
            NodeKind::Command(name) | NodeKind::Relation(name) => name.clone(),
        };
        RenderHint {
            shape: self.shape,
            label,
            is_virtual: self.is_virtual(),
            busy: self.phase().is_some_and(VirtualPhase::is_busy),
            errored: self.is_errored(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn request_tokens_are_monotonic() {
        let a = RequestToken::next();
        let b = RequestToken::next();
        assert!(b > a);
    }

    #[test]
    fn begin_and_settle() {
        let mut node = GraphNode::virtual_node(NodeKind::Content, None);
        let token = node.begin(VirtualPhase::Confirming).unwrap();
        assert_eq!(node.request(), Some(token));

        // Busy nodes cannot start a second operation
        assert!(node.begin(VirtualPhase::Submitting).is_none());

        let stale = RequestToken::next();
        assert!(!node.settle(stale, VirtualPhase::Pending));
        assert!(node.settle(
            token,
            VirtualPhase::Errored {
                reason: "timeout".to_string()
            }
        ));
        assert!(node.is_errored());

        // Errored nodes can be retried
        assert!(node.begin(VirtualPhase::Confirming).is_some());
    }

    #[test]
    fn real_nodes_never_begin() {
        let snapshot = Arc::new(ContentSnapshot::new("foo").with_gib("abc"));
        let mut node = GraphNode::real(snapshot);
        assert!(node.begin(VirtualPhase::Confirming).is_none());
        assert_eq!(node.content_ref, Some(IbGibId::from_str("foo^abc").unwrap()));
    }

    #[test]
    fn render_hints() {
        let cmd = GraphNode::virtual_node(NodeKind::command("fork"), None).with_shape(NodeShape::Square);
        let hint = cmd.render_hint();
        assert_eq!(hint.label, "fork");
        assert_eq!(hint.shape, NodeShape::Square);
        assert!(hint.is_virtual);
        assert!(!hint.busy);

        let content = GraphNode::virtual_node(
            NodeKind::Content,
            Some(IbGibId::from_str("comment hi^1").unwrap()),
        );
        assert_eq!(content.render_hint().label, "comment hi");
    }

    #[test]
    fn confirm_modes() {
        assert_eq!(NodeKind::Content.confirm_mode(), ConfirmMode::Fetch);
        assert_eq!(NodeKind::command("fork").confirm_mode(), ConfirmMode::Execute);
        assert_eq!(NodeKind::relation("past").confirm_mode(), ConfirmMode::Expand);
        assert_eq!(NodeKind::relation("past").name(), Some("past"));
    }
}
