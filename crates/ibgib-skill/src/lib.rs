//! ibGib voice skill
//!
//! Single-turn request/response: a platform envelope comes in, a canned
//! plain-text reply goes out. No session state is kept between turns.
//!
//! # Example
//!
//! ```rust,ignore
//! let reply = ibgib_skill::handle_json(r#"{
//!     "version": "1.0",
//!     "request": { "type": "IntentRequest", "intent": { "name": "ThankYouIntent" } }
//! }"#)?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod error;
mod intent;
mod request;
mod response;

pub use error::SkillError;
pub use intent::{KnownIntent, WELCOME};
pub use request::{Intent, RequestBody, SkillRequest};
pub use response::{OutputSpeech, ResponseBody, SkillResponse};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Answer one request
///
/// # Errors
/// [`SkillError::Unsupported`] for request types the skill does not know
pub fn handle(request: &SkillRequest) -> Result<SkillResponse, SkillError> {
    let response = match &request.request {
        RequestBody::LaunchRequest { .. } => SkillResponse::speak(WELCOME, false),
        RequestBody::IntentRequest { intent, .. } => {
            let known = KnownIntent::from_name(&intent.name);
            if known == KnownIntent::Fallback {
                tracing::warn!(intent = %intent.name, "unrecognized intent");
            }
            SkillResponse::speak(known.speech(), known.ends_session())
        }
        RequestBody::SessionEndedRequest { reason, .. } => {
            tracing::debug!(?reason, "skill session ended");
            SkillResponse::silent()
        }
        RequestBody::Unknown => return Err(SkillError::Unsupported(request.request.kind().to_string())),
    };
    tracing::debug!(kind = request.request.kind(), "skill request handled");
    Ok(response)
}

/// Parse, answer and serialize
///
/// # Errors
/// [`SkillError::Parse`] for malformed envelopes, or anything
/// [`handle`] reports
pub fn handle_json(body: &str) -> Result<String, SkillError> {
    let request: SkillRequest = serde_json::from_str(body)?;
    let response = handle(&request)?;
    Ok(serde_json::to_string(&response)?)
}
