//! Transport seams
//!
//! The persistent duplex connection to the server is abstracted behind two
//! traits: [`ChannelTransport`] for per-topic push channels and
//! [`CommandBus`] for request/acknowledge commands.

use crate::error::BusError;
use crate::message::{CommandMessage, PushMessage};
use ibgib_content::IbGibId;
use serde_json::Value;
use tokio::sync::mpsc;

/// Per-topic push channels
#[async_trait::async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Join the channel for `topic`; messages arrive on the returned receiver
    /// in server-send order
    async fn join(&self, topic: &IbGibId) -> Result<mpsc::Receiver<PushMessage>, BusError>;

    /// Leave the channel for `topic`
    async fn leave(&self, topic: &IbGibId) -> Result<(), BusError>;
}

/// Request/acknowledge command channel
///
/// `Ok` carries the success payload, `Err(BusError::Rejected)` the error
/// payload; success and error are told apart by the acknowledgement, not by
/// payload shape.
#[async_trait::async_trait]
pub trait CommandBus: Send + Sync {
    /// Send one command and wait for its acknowledgement
    async fn send(&self, message: CommandMessage) -> Result<Value, BusError>;
}
