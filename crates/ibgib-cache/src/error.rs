//! Error types for the caches

use ibgib_content::SnapshotError;
use std::path::PathBuf;

/// Errors from a backing key-value store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// IO error on a file-backed store
    #[error("io error at {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Stored value was not valid UTF-8
    #[error("stored value for '{0}' is not valid utf-8")]
    Encoding(String),
}

impl StoreError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Malformed snapshot rejected on put
    #[error("validation error: {0}")]
    Validation(#[from] SnapshotError),

    /// Persisted document could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backing store failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
