//! Content hashing
//!
//! Recomputes the `gib` of a snapshot from its label, relations and data.
//! The check runs on the client with a fixed salt, so it guards against
//! corruption, not against a hostile server.

use crate::snapshot::ContentSnapshot;
use sha2::{Digest, Sha256};

/// Computes and verifies snapshot hashes
///
/// `gib = hex(sha256(salt ‖ ib ‖ hex(sha256(rel8ns)) ‖ hex(sha256(data))))`
/// with relations and data serialized as JSON with sorted keys.
#[derive(Debug, Clone, Default)]
pub struct GibHasher {
    salt: String,
}

impl GibHasher {
    /// Hasher without salt
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hasher with a fixed salt prefix
    #[inline]
    #[must_use]
    pub fn with_salt(salt: impl Into<String>) -> Self {
        Self { salt: salt.into() }
    }

    /// Compute the hash a snapshot should carry
    ///
    /// # Errors
    /// Returns error if relations or data cannot be serialized
    pub fn compute(&self, snapshot: &ContentSnapshot) -> Result<String, HashError> {
        let rel8ns_hash = sha256_hex(&serde_json::to_vec(&snapshot.rel8ns)?);
        let data_hash = sha256_hex(&serde_json::to_vec(&snapshot.data)?);

        let mut hasher = Sha256::new();
        hasher.update(self.salt.as_bytes());
        hasher.update(snapshot.ib.as_bytes());
        hasher.update(rel8ns_hash.as_bytes());
        hasher.update(data_hash.as_bytes());
        Ok(hex::encode_upper(hasher.finalize()))
    }

    /// Check that a snapshot's `gib` matches its content
    ///
    /// Primitives (`<ib>^gib`) carry no hash and always pass.
    #[must_use]
    pub fn verify(&self, snapshot: &ContentSnapshot) -> bool {
        if snapshot.gib == "gib" {
            return true;
        }
        match self.compute(snapshot) {
            Ok(expected) if expected.eq_ignore_ascii_case(&snapshot.gib) => true,
            Ok(expected) => {
                tracing::warn!(
                    id = %snapshot.id(),
                    expected = %expected,
                    "content hash mismatch"
                );
                false
            }
            Err(e) => {
                tracing::warn!(id = %snapshot.id(), error = %e, "content hash not computable");
                false
            }
        }
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode_upper(Sha256::digest(bytes))
}

/// Errors that can occur when hashing content
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
