//! ibGib Sync
//!
//! Top of the client stack: command dispatch, background sync queues,
//! content resolution and the session that wires them to the graph.
//!
//! # Architecture
//!
//! ```text
//! SyncSession
//!   ├─ ContentResolver ── ContentCache ── ContentFetcher (HTTP)
//!   ├─ NodeLifecycle / GraphView ── GraphResolver
//!   ├─ CommandDispatch ── CommandBus, LatestCache, AdjunctCache, EventBus
//!   ├─ SyncQueue (batch_refresh), SyncQueue (get_adjuncts)
//!   └─ inbox task ◀── EventBus pushes, local broadcasts, queue results
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use ibgib_sync::{Services, SyncConfig, SyncSession, CommandInput, ExecState};
//!
//! # async fn example(services: Services) -> Result<(), ibgib_sync::SyncError> {
//! let session = SyncSession::start(SyncConfig::default(), services).await?;
//! let node = session.open(&"foo^abc".parse()?).await?;
//!
//! // Fork adds a speculative node that turns real on acknowledgement
//! let state = session.dispatch().exec(node, "fork").await?;
//!
//! // Comment opens a detail interaction first
//! session.dispatch().exec(node, "comment").await?;
//! let report = session
//!     .dispatch()
//!     .submit(CommandInput::new().with("comment_text", "hello"))
//!     .await?;
//! report.require_direct()?;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod commands;
mod config;
mod dispatch;
mod error;
mod fetch;
mod queue;
mod resolver;
mod session;
pub mod telemetry;

pub use commands::{Command, CommandInput, CommandOutcome, CommandRegistry};
pub use config::SyncConfig;
pub use dispatch::{CommandDispatch, CommandReport, ExecState};
pub use error::{FetchError, SyncError};
pub use fetch::{ContentFetcher, HttpContentFetcher, MemoryFetcher};
pub use queue::{FlushOutcome, SyncCallback, SyncKind, SyncQueue, SyncResult};
pub use resolver::{ContentResolver, GraphResolver};
pub use session::{Services, SyncSession};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
