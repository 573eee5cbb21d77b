//! Error types for the sync layer
//!
//! Errors are recovered as close to their origin as possible:
//! - cache failures are logged and swallowed
//! - command failures become an errored node
//! - re-entrancy is reported as an outcome, not an error
//!
//! What remains reaches the caller as [`SyncError`].

use ibgib_bus::BusError;
use ibgib_cache::CacheError;
use ibgib_content::IbGibId;
use ibgib_graph::GraphError;

/// Content fetch errors
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Request could not be made or completed
    #[error("request for {id} failed: {source}")]
    Http {
        /// Requested content
        id: IbGibId,
        /// Client error
        #[source]
        source: reqwest::Error,
    },

    /// Server answered with a non-success status
    #[error("request for {id} returned {status}")]
    Status {
        /// Requested content
        id: IbGibId,
        /// HTTP status code
        status: u16,
    },

    /// Body was not a snapshot document
    #[error("response for {id} is not a snapshot: {reason}")]
    Decode {
        /// Requested content
        id: IbGibId,
        /// Parse failure
        reason: String,
    },

    /// Base path cannot carry path segments
    #[error("invalid base path: {0}")]
    InvalidBase(String),

    /// Nothing known for this id
    #[error("content not found: {0}")]
    NotFound(IbGibId),
}

impl FetchError {
    /// Check if a later attempt could succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { .. } => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Decode { .. } | Self::InvalidBase(_) | Self::NotFound(_) => false,
        }
    }
}

/// Main sync error type
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Malformed input (missing identifier, bad payload, ...)
    #[error("validation failed: {0}")]
    Validation(String),

    /// Channel, fetch or command-bus failure
    #[error("network error: {0}")]
    Network(String),

    /// Mutation of content the current identity does not own; the
    /// contribution stays a pending adjunct
    #[error("not authorized to mutate {0}; contribution left as adjunct")]
    Unauthorized(IbGibId),

    /// Unknown command name
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// `submit` without an open command
    #[error("no command is open")]
    NoOpenCommand,

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Content fetch failed
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Cache rejected input
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Graph invariant violated
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),
}

impl SyncError {
    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Fetch(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<BusError> for SyncError {
    fn from(e: BusError) -> Self {
        match e {
            BusError::MalformedMessage(reason) => Self::Validation(reason),
            other => Self::Network(other.to_string()),
        }
    }
}
