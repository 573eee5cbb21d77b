//! Request envelope

use serde::Deserialize;

/// Incoming envelope
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SkillRequest {
    #[serde(default)]
    pub version: Option<String>,
    pub request: RequestBody,
}

/// Request body, tagged by `type`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum RequestBody {
    /// Skill opened without an intent
    LaunchRequest {
        #[serde(rename = "requestId", default)]
        request_id: Option<String>,
    },
    /// Spoken intent
    IntentRequest {
        #[serde(rename = "requestId", default)]
        request_id: Option<String>,
        intent: Intent,
    },
    /// Session closed by the platform
    SessionEndedRequest {
        #[serde(rename = "requestId", default)]
        request_id: Option<String>,
        #[serde(default)]
        reason: Option<String>,
    },
    /// Anything else
    #[serde(other)]
    Unknown,
}

/// Matched intent
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Intent {
    pub name: String,
}

impl RequestBody {
    /// Request type name for logs
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LaunchRequest { .. } => "LaunchRequest",
            Self::IntentRequest { .. } => "IntentRequest",
            Self::SessionEndedRequest { .. } => "SessionEndedRequest",
            Self::Unknown => "Unknown",
        }
    }
}
