//! Error types for the event and command buses

use ibgib_content::IbGibId;
use serde_json::Value;

/// Bus errors
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// Joining a channel failed
    #[error("failed to join channel {topic}: {reason}")]
    JoinFailed {
        /// Topic that could not be joined
        topic: IbGibId,
        /// Transport-supplied reason
        reason: String,
    },

    /// Server acknowledged a command with an error
    #[error("command '{name}' rejected: {payload}")]
    Rejected {
        /// Command name
        name: String,
        /// Error payload from the server
        payload: Value,
    },

    /// Transport-level failure (disconnected, timed out, ...)
    #[error("transport error: {0}")]
    Transport(String),

    /// Message did not match its declared shape
    #[error("malformed message: {0}")]
    MalformedMessage(String),
}

impl BusError {
    /// Create join failure
    pub fn join_failed(topic: IbGibId, reason: impl Into<String>) -> Self {
        Self::JoinFailed {
            topic,
            reason: reason.into(),
        }
    }

    /// Create rejection
    pub fn rejected(name: impl Into<String>, payload: Value) -> Self {
        Self::Rejected {
            name: name.into(),
            payload,
        }
    }
}
