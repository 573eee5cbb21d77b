//! ibGib Graph Model
//!
//! The in-memory node/link graph showing the currently displayed subset of
//! the content graph.
//!
//! # Layers
//!
//! - [`GraphData`]: nodes and links with exclusivity and cascade removal
//! - [`GraphView`]: shared or cloned views with parent/child propagation and
//!   change events for an external renderer
//! - [`NodeLifecycle`]: virtual nodes, expiry timers, confirmation and
//!   request correlation, talking to the outside through [`NodeResolver`]
//!
//! # Example
//!
//! ```rust,ignore
//! use ibgib_graph::{GraphView, NodeLifecycle, VirtualSpec};
//! use std::time::Duration;
//!
//! let lifecycle = NodeLifecycle::new(GraphView::new(), resolver);
//! let node = lifecycle
//!     .add_virtual(VirtualSpec::content(id).expire_after(Duration::from_secs(5)))
//!     .await?;
//! lifecycle.confirm(node).await;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod data;
mod error;
mod lifecycle;
mod link;
mod node;
mod view;

pub use data::{GraphChange, GraphData, GraphEvent};
pub use error::GraphError;
pub use lifecycle::{ConfirmOutcome, NodeLifecycle, NodeResolver, SkipReason, VirtualSpec};
pub use link::GraphLink;
pub use node::{
    ConfirmMode, GraphNode, NodeId, NodeKind, NodeShape, NodeState, Position, RenderHint,
    RequestToken, VirtualPhase, VirtualToken,
};
pub use view::GraphView;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
