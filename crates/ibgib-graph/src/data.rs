//! Node/link collection
//!
//! Plain data with the two structural invariants enforced on every
//! mutation:
//! - at most one node per [`NodeId`]
//! - every link's endpoints are present (removal cascades)

use crate::error::GraphError;
use crate::link::GraphLink;
use crate::node::{GraphNode, NodeId};
use ibgib_content::IbGibId;
use indexmap::{IndexMap, IndexSet};
use std::collections::HashSet;

/// One mutation, applied as a unit
#[derive(Debug, Clone, PartialEq)]
pub enum GraphChange {
    /// Add nodes and links; links may reference nodes in the same batch
    Add {
        nodes: Vec<GraphNode>,
        links: Vec<GraphLink>,
    },
    /// Remove a node and every link touching it
    Remove { node: NodeId },
    /// Swap a node in place, keeping its id and links
    Replace { node: Box<GraphNode> },
}

/// Change notification for renderers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphEvent {
    Added {
        nodes: Vec<NodeId>,
        links: Vec<GraphLink>,
    },
    Removed {
        node: NodeId,
        /// Links dropped with the node
        links: Vec<GraphLink>,
    },
    Replaced {
        node: NodeId,
    },
}

/// Nodes in insertion order plus links
#[derive(Debug, Clone, Default)]
pub struct GraphData {
    nodes: IndexMap<NodeId, GraphNode>,
    links: IndexSet<GraphLink>,
}

impl GraphData {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a change and describe its effect
    ///
    /// # Errors
    /// Returns the first violated invariant; nothing is applied in that case
    pub fn apply(&mut self, change: &GraphChange) -> Result<GraphEvent, GraphError> {
        match change {
            GraphChange::Add { nodes, links } => {
                let ids = nodes.iter().map(|n| n.id).collect();
                self.add(nodes.clone(), links)?;
                Ok(GraphEvent::Added {
                    nodes: ids,
                    links: links.clone(),
                })
            }
            GraphChange::Remove { node } => self.remove(*node).map(|links| GraphEvent::Removed {
                node: *node,
                links,
            }),
            GraphChange::Replace { node } => self
                .replace((**node).clone())
                .map(|_| GraphEvent::Replaced { node: node.id }),
        }
    }

    /// Add nodes and links
    ///
    /// Links already present are skipped.
    ///
    /// # Errors
    /// [`GraphError::DuplicateNode`], [`GraphError::DanglingLink`] or
    /// [`GraphError::SelfLink`]; the graph is left untouched
    pub fn add(&mut self, nodes: Vec<GraphNode>, links: &[GraphLink]) -> Result<(), GraphError> {
        let mut incoming = HashSet::with_capacity(nodes.len());
        for node in &nodes {
            if self.nodes.contains_key(&node.id) || !incoming.insert(node.id) {
                return Err(GraphError::DuplicateNode(node.id));
            }
        }
        for link in links {
            if link.from == link.to {
                return Err(GraphError::SelfLink(link.from));
            }
            let present = |id: &NodeId| self.nodes.contains_key(id) || incoming.contains(id);
            if !present(&link.from) || !present(&link.to) {
                return Err(GraphError::DanglingLink {
                    from: link.from,
                    to: link.to,
                });
            }
        }

        for node in nodes {
            self.nodes.insert(node.id, node);
        }
        self.links.extend(links.iter().copied());
        Ok(())
    }

    /// Remove a node; returns the links removed with it
    ///
    /// # Errors
    /// [`GraphError::NodeNotFound`]
    pub fn remove(&mut self, id: NodeId) -> Result<Vec<GraphLink>, GraphError> {
        if self.nodes.shift_remove(&id).is_none() {
            return Err(GraphError::NodeNotFound(id));
        }
        let removed: Vec<GraphLink> = self.links.iter().filter(|l| l.touches(id)).copied().collect();
        self.links.retain(|l| !l.touches(id));
        Ok(removed)
    }

    /// Replace a node with the same id; returns the previous node
    ///
    /// # Errors
    /// [`GraphError::NodeNotFound`]
    pub fn replace(&mut self, node: GraphNode) -> Result<GraphNode, GraphError> {
        match self.nodes.get_mut(&node.id) {
            Some(slot) => Ok(std::mem::replace(slot, node)),
            None => Err(GraphError::NodeNotFound(node.id)),
        }
    }

    /// Mutate a node in place
    pub fn update<R>(&mut self, id: NodeId, f: impl FnOnce(&mut GraphNode) -> R) -> Option<R> {
        self.nodes.get_mut(&id).map(f)
    }

    /// Add a single link between present nodes; returns false if it existed
    ///
    /// # Errors
    /// [`GraphError::DanglingLink`] or [`GraphError::SelfLink`]
    pub fn link(&mut self, link: GraphLink) -> Result<bool, GraphError> {
        if link.from == link.to {
            return Err(GraphError::SelfLink(link.from));
        }
        if !self.nodes.contains_key(&link.from) || !self.nodes.contains_key(&link.to) {
            return Err(GraphError::DanglingLink {
                from: link.from,
                to: link.to,
            });
        }
        Ok(self.links.insert(link))
    }

    #[inline]
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(&id)
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn links(&self) -> impl Iterator<Item = &GraphLink> {
        self.links.iter()
    }

    /// Links touching a node
    #[must_use]
    pub fn links_of(&self, id: NodeId) -> Vec<GraphLink> {
        self.links.iter().filter(|l| l.touches(id)).copied().collect()
    }

    /// Nodes showing the given content
    #[must_use]
    pub fn find_by_content(&self, content: &IbGibId) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|n| n.content_ref.as_ref() == Some(content))
            .map(|n| n.id)
            .collect()
    }

    /// Nodes derived from `source`
    #[must_use]
    pub fn children_of(&self, source: NodeId) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|n| n.source == Some(source))
            .map(|n| n.id)
            .collect()
    }

    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    #[must_use]
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Verify structural invariants
    ///
    /// # Errors
    /// [`GraphError::Integrity`] describing the first violation
    pub fn check_integrity(&self) -> Result<(), GraphError> {
        for (key, node) in &self.nodes {
            if *key != node.id {
                return Err(GraphError::Integrity(format!(
                    "node stored under {key} carries id {}",
                    node.id
                )));
            }
        }
        for link in &self.links {
            if !self.nodes.contains_key(&link.from) || !self.nodes.contains_key(&link.to) {
                return Err(GraphError::Integrity(format!(
                    "orphan link {} -> {}",
                    link.from, link.to
                )));
            }
        }
        Ok(())
    }
}
