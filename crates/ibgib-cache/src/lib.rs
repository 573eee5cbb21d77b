//! ibGib Caches
//!
//! Client-side caches consulted and populated by command dispatch, event bus
//! handlers and the background sync queue.
//!
//! # Caches
//!
//! - [`ContentCache`]: content identifier → immutable snapshot (idempotent put)
//! - [`LatestCache`]: content identifier → most recent known successor
//! - [`AdjunctCache`]: pending contributions grouped by target timeline
//!
//! Content and latest-pointer caches can persist through a [`KeyValueStore`]
//! (`json_<id>` and `lc_<id>` keys). Absence of a key is a miss, never an
//! error, and store failures are logged and swallowed.
//!
//! # Example
//!
//! ```rust,ignore
//! use ibgib_cache::{ContentCache, FileStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(FileStore::open("/tmp/ibgib").await?);
//! let cache = ContentCache::with_store(10_000, store);
//!
//! cache.put(snapshot.clone()).await?;
//! assert!(cache.exists(&snapshot.id()).await);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod adjunct;
pub mod content;
pub mod error;
pub mod latest;
pub mod store;

pub use adjunct::{AdjunctCache, AdjunctInfo};
pub use content::{CacheStats, ContentCache};
pub use error::{CacheError, StoreError};
pub use latest::LatestCache;
pub use store::{FileStore, KeyValueStore, MemoryStore};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the caches
    pub use crate::adjunct::{AdjunctCache, AdjunctInfo};
    pub use crate::content::ContentCache;
    pub use crate::error::CacheError;
    pub use crate::latest::LatestCache;
    pub use crate::store::{KeyValueStore, MemoryStore};
    pub use ibgib_content::{ContentSnapshot, IbGibId};
}
