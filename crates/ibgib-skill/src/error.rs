//! Skill errors

/// Errors while handling a skill request
#[derive(Debug, thiserror::Error)]
pub enum SkillError {
    /// Body is not a request envelope
    #[error("malformed request: {0}")]
    Parse(#[from] serde_json::Error),

    /// Envelope parsed but the request type is not handled
    #[error("unsupported request type: {0}")]
    Unsupported(String),
}
