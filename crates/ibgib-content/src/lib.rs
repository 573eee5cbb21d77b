//! ibGib Content Model
//!
//! Immutable, content-addressed snapshots and the identifiers that name them.
//!
//! # Core Concepts
//!
//! - [`IbGibId`]: `"<ib>^<gib>"` token naming exactly one immutable snapshot
//! - [`ContentSnapshot`]: label, data payload and relation map
//! - [`Rel8ns`]: named, ordered relation lists (`past`, `ancestor`, `dna`, `identity`, ...)
//! - [`GibHasher`]: recomputes and checks the `gib` of a snapshot
//! - [`ContentCategory`]: coarse classification derived from the label
//!
//! # Example
//!
//! ```rust,ignore
//! use ibgib_content::{ContentSnapshot, IbGibId};
//!
//! let snapshot: ContentSnapshot = serde_json::from_str(json)?;
//! snapshot.validate()?;
//!
//! // Subscriptions use the stable anchor of the timeline
//! let anchor: IbGibId = snapshot.temporal_junction();
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod category;
mod hash;
mod id;
mod snapshot;

pub use category::ContentCategory;
pub use hash::{GibHasher, HashError};
pub use id::{IbGibId, IdError, ROOT_ID};
pub use snapshot::{rel8n, ContentSnapshot, Rel8ns, SnapshotError};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
