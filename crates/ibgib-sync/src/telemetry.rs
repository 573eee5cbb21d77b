//! Tracing subscriber setup for the binary

use crate::error::SyncError;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Install the global subscriber
///
/// `RUST_LOG` wins over `default_level`. Logs go to stderr so command
/// output on stdout stays machine-readable.
///
/// # Errors
/// [`SyncError::Config`] if the level does not parse or a subscriber is
/// already installed
pub fn init_tracing(default_level: &str, json: bool) -> Result<(), SyncError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_level)
            .map_err(|e| SyncError::Config(format!("invalid log level '{default_level}': {e}")))?,
    };

    let layer: Box<dyn Layer<Registry> + Send + Sync> = if json {
        Box::new(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
    } else {
        Box::new(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
    };

    Registry::default()
        .with(layer)
        .with(filter)
        .try_init()
        .map_err(|e| SyncError::Config(format!("tracing already initialized: {e}")))
}
