//! Graph views
//!
//! A view is a handle onto [`GraphData`] that can be attached to a parent
//! view (for example an overlay menu working on the same dataset). At attach
//! time the child either shares the parent's data by reference or takes a
//! deep copy; that choice is fixed for the lifetime of the attachment.
//!
//! A propagated mutation walks the attachment tree from the originating view
//! and applies the change once per distinct data allocation. Views that share
//! an allocation already mutated only receive the change event.

use crate::data::{GraphChange, GraphData, GraphEvent};
use crate::error::GraphError;
use crate::link::GraphLink;
use crate::node::{GraphNode, NodeId};
use ibgib_content::IbGibId;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

static NEXT_VIEW: AtomicU64 = AtomicU64::new(1);

type SharedData = Arc<RwLock<GraphData>>;

struct ViewInner {
    id: u64,
    data: SharedData,
    share_data_reference: bool,
    parent: Mutex<Weak<ViewInner>>,
    children: Mutex<Vec<GraphView>>,
    events: broadcast::Sender<GraphEvent>,
}

/// Cloneable handle onto one view
#[derive(Clone)]
pub struct GraphView {
    inner: Arc<ViewInner>,
}

impl fmt::Debug for GraphView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.inner.data.read();
        f.debug_struct("GraphView")
            .field("id", &self.inner.id)
            .field("nodes", &data.node_count())
            .field("links", &data.link_count())
            .field("share_data_reference", &self.inner.share_data_reference)
            .finish()
    }
}

impl Default for GraphView {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphView {
    /// Root view over empty data
    #[must_use]
    pub fn new() -> Self {
        Self::with_data(GraphData::new())
    }

    /// Root view over existing data
    #[must_use]
    pub fn with_data(data: GraphData) -> Self {
        Self::build(Arc::new(RwLock::new(data)), true)
    }

    fn build(data: SharedData, share_data_reference: bool) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(ViewInner {
                id: NEXT_VIEW.fetch_add(1, Ordering::Relaxed),
                data,
                share_data_reference,
                parent: Mutex::new(Weak::new()),
                children: Mutex::new(Vec::new()),
                events,
            }),
        }
    }

    /// Create and attach a child view
    ///
    /// With `share_data_reference` the child mutates the parent's data
    /// directly; otherwise it works on a deep copy taken now.
    #[must_use]
    pub fn attach_child(&self, share_data_reference: bool) -> GraphView {
        let data = if share_data_reference {
            Arc::clone(&self.inner.data)
        } else {
            Arc::new(RwLock::new(self.inner.data.read().clone()))
        };
        let child = Self::build(data, share_data_reference);
        *child.inner.parent.lock() = Arc::downgrade(&self.inner);
        self.inner.children.lock().push(child.clone());
        tracing::debug!(
            parent = self.inner.id,
            child = child.inner.id,
            share_data_reference,
            "view attached"
        );
        child
    }

    /// Detach from the parent, if any
    pub fn detach(&self) {
        let parent = std::mem::take(&mut *self.inner.parent.lock());
        if let Some(parent) = parent.upgrade() {
            parent.children.lock().retain(|c| !c.ptr_eq(self));
            tracing::debug!(parent = parent.id, child = self.inner.id, "view detached");
        }
    }

    #[must_use]
    pub fn parent(&self) -> Option<GraphView> {
        self.inner.parent.lock().upgrade().map(|inner| GraphView { inner })
    }

    #[must_use]
    pub fn children(&self) -> Vec<GraphView> {
        self.inner.children.lock().clone()
    }

    /// How this view was attached
    #[inline]
    #[must_use]
    pub fn shares_data_reference(&self) -> bool {
        self.inner.share_data_reference
    }

    /// Check if two views operate on the same data allocation
    #[must_use]
    pub fn shares_data_with(&self, other: &GraphView) -> bool {
        Arc::ptr_eq(&self.inner.data, &other.inner.data)
    }

    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &GraphView) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Change events for this view
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GraphEvent> {
        self.inner.events.subscribe()
    }

    /// Add nodes and links
    ///
    /// # Errors
    /// Invariant violations on this view's own data; failures on other views
    /// reached by propagation are logged
    pub fn add(&self, nodes: Vec<GraphNode>, links: &[GraphLink], propagate: bool) -> Result<(), GraphError> {
        self.commit(
            &GraphChange::Add {
                nodes,
                links: links.to_vec(),
            },
            propagate,
        )
        .map(|_| ())
    }

    /// Remove a node with its links; returns the links removed here
    ///
    /// # Errors
    /// [`GraphError::NodeNotFound`] if absent from this view
    pub fn remove(&self, id: NodeId, propagate: bool) -> Result<Vec<GraphLink>, GraphError> {
        match self.commit(&GraphChange::Remove { node: id }, propagate)? {
            GraphEvent::Removed { links, .. } => Ok(links),
            _ => Ok(Vec::new()),
        }
    }

    /// Replace a node in place
    ///
    /// # Errors
    /// [`GraphError::NodeNotFound`] if absent from this view
    pub fn replace(&self, node: GraphNode, propagate: bool) -> Result<(), GraphError> {
        self.commit(&GraphChange::Replace { node: Box::new(node) }, propagate)
            .map(|_| ())
    }

    /// Mutate a node in this view's data
    ///
    /// The updated node is copied into every other connected allocation that
    /// holds it, once per allocation; each view seeing the change gets
    /// `Replaced`.
    pub fn update_node<R>(&self, id: NodeId, f: impl FnOnce(&mut GraphNode) -> R) -> Option<R> {
        let (result, updated) = {
            let mut data = self.inner.data.write();
            let result = data.update(id, f)?;
            (result, data.node(id).cloned())
        };
        let Some(updated) = updated else {
            return Some(result);
        };

        let mut mirrored: Vec<(SharedData, bool)> = vec![(Arc::clone(&self.inner.data), true)];
        for view in self.reachable() {
            let known = mirrored
                .iter()
                .find(|(data, _)| Arc::ptr_eq(data, &view.inner.data))
                .map(|(_, holds)| *holds);
            let holds = match known {
                Some(holds) => holds,
                None => {
                    let holds = view.inner.data.write().replace(updated.clone()).is_ok();
                    if !holds {
                        tracing::trace!(view = view.inner.id, node = %id, "node not held by view");
                    }
                    mirrored.push((Arc::clone(&view.inner.data), holds));
                    holds
                }
            };
            if holds {
                view.emit(GraphEvent::Replaced { node: id });
            }
        }
        Some(result)
    }

    fn commit(&self, change: &GraphChange, propagate: bool) -> Result<GraphEvent, GraphError> {
        let views = if propagate { self.reachable() } else { vec![self.clone()] };

        // One entry per data allocation: its outcome, shared by every view on it
        let mut applied: Vec<(SharedData, Option<GraphEvent>)> = Vec::new();
        let mut own = None;

        for view in &views {
            let known = applied
                .iter()
                .find(|(data, _)| Arc::ptr_eq(data, &view.inner.data))
                .map(|(_, event)| event.clone());

            let event = match known {
                Some(event) => event,
                None => {
                    let result = view.inner.data.write().apply(change);
                    match result {
                        Ok(event) => {
                            applied.push((Arc::clone(&view.inner.data), Some(event.clone())));
                            Some(event)
                        }
                        Err(e) if view.ptr_eq(self) => return Err(e),
                        Err(e) => {
                            tracing::warn!(view = view.inner.id, error = %e, "propagated change not applied");
                            applied.push((Arc::clone(&view.inner.data), None));
                            None
                        }
                    }
                }
            };

            if let Some(event) = event {
                if view.ptr_eq(self) {
                    own = Some(event.clone());
                }
                view.emit(event);
            }
        }

        own.ok_or_else(|| GraphError::Integrity("change produced no event on its own view".to_string()))
    }

    fn emit(&self, event: GraphEvent) {
        // No receivers is fine; renderers subscribe on demand
        let _ = self.inner.events.send(event);
    }

    /// Every view connected through attachments, starting with this one
    fn reachable(&self) -> Vec<GraphView> {
        let mut seen = vec![self.clone()];
        let mut queue = VecDeque::from([self.clone()]);
        while let Some(view) = queue.pop_front() {
            let mut next = view.children();
            next.extend(view.parent());
            for candidate in next {
                if !seen.iter().any(|s| s.ptr_eq(&candidate)) {
                    seen.push(candidate.clone());
                    queue.push_back(candidate);
                }
            }
        }
        seen
    }

    /// Node by id
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<GraphNode> {
        self.inner.data.read().node(id).cloned()
    }

    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.inner.data.read().contains(id)
    }

    /// Run a closure against the data under a read lock
    pub fn read<R>(&self, f: impl FnOnce(&GraphData) -> R) -> R {
        f(&self.inner.data.read())
    }

    /// Copy of the current data
    #[must_use]
    pub fn snapshot(&self) -> GraphData {
        self.inner.data.read().clone()
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.inner.data.read().node_count()
    }

    #[must_use]
    pub fn link_count(&self) -> usize {
        self.inner.data.read().link_count()
    }

    #[must_use]
    pub fn find_by_content(&self, content: &IbGibId) -> Vec<NodeId> {
        self.inner.data.read().find_by_content(content)
    }

    /// Verify structural invariants
    ///
    /// # Errors
    /// [`GraphError::Integrity`]
    pub fn check_integrity(&self) -> Result<(), GraphError> {
        self.inner.data.read().check_integrity()
    }
}
