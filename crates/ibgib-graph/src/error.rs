//! Graph error types

use crate::node::NodeId;

/// Graph mutation and resolution errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// Node id already present
    #[error("node {0} already present")]
    DuplicateNode(NodeId),

    /// Node id not present
    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    /// Link endpoint missing
    #[error("link {from} -> {to} references a missing node")]
    DanglingLink {
        /// Link start
        from: NodeId,
        /// Link end
        to: NodeId,
    },

    /// Link from a node to itself
    #[error("self link on {0}")]
    SelfLink(NodeId),

    /// Structural invariant broken
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// Content or action could not be resolved
    #[error("could not resolve {what}: {reason}")]
    Resolve {
        /// What was being resolved
        what: String,
        /// Cause
        reason: String,
    },
}

impl GraphError {
    /// Create resolution error
    pub fn resolve(what: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Resolve {
            what: what.into(),
            reason: reason.into(),
        }
    }
}
