//! ibGib Event and Command Buses
//!
//! Real-time plumbing between the client and the server.
//!
//! # Components
//!
//! - [`EventBus`]: local pub/sub keyed by temporal junction id, multiplexed
//!   over one reference-counted server channel per id
//! - [`ChannelTransport`]: seam for joining and leaving push channels
//! - [`CommandBus`]: seam for request/acknowledge commands
//! - [`PushMessage`] / [`CommandMessage`]: wire envelopes
//!
//! # Example
//!
//! ```rust,ignore
//! use ibgib_bus::{EventBus, PushHandler};
//! use std::sync::Arc;
//!
//! let bus = EventBus::new(transport, content_cache);
//! let handler: PushHandler = Arc::new(|msg| println!("{}", msg.name()));
//! let cid = bus.connect(None, timeline_id, handler).await?;
//! // ...
//! bus.disconnect(Some(&cid)).await;
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod error;
mod event_bus;
mod message;
mod transport;

pub use error::BusError;
pub use event_bus::{ConnectionId, ConnectionInfo, EventBus, PushHandler};
pub use message::{
    push_name, AdjunctsData, CommandMessage, CommandMetadata, NewAdjunctData, PushEvent,
    PushMessage, PushMetadata, UpdateData, COMMAND_TYPE,
};
pub use transport::{ChannelTransport, CommandBus};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
