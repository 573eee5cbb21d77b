//! Directed links between displayed nodes

use crate::node::NodeId;
use serde::{Deserialize, Serialize};

/// `from → to`; both endpoints must be present in the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphLink {
    pub from: NodeId,
    pub to: NodeId,
}

impl GraphLink {
    #[inline]
    #[must_use]
    pub fn new(from: NodeId, to: NodeId) -> Self {
        Self { from, to }
    }

    /// Check if `id` is either endpoint
    #[inline]
    #[must_use]
    pub fn touches(&self, id: NodeId) -> bool {
        self.from == id || self.to == id
    }
}
