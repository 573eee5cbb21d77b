//! Response envelope

use serde::Serialize;

const RESPONSE_VERSION: &str = "1.0";

/// Outgoing envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkillResponse {
    pub version: String,
    pub response: ResponseBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_speech: Option<OutputSpeech>,
    pub should_end_session: bool,
}

/// Plain-text speech
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputSpeech {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl SkillResponse {
    /// Speak `text`, optionally ending the session
    #[must_use]
    pub fn speak(text: impl Into<String>, end_session: bool) -> Self {
        Self {
            version: RESPONSE_VERSION.to_string(),
            response: ResponseBody {
                output_speech: Some(OutputSpeech {
                    kind: "PlainText".to_string(),
                    text: text.into(),
                }),
                should_end_session: end_session,
            },
        }
    }

    /// Say nothing and end the session
    #[must_use]
    pub fn silent() -> Self {
        Self {
            version: RESPONSE_VERSION.to_string(),
            response: ResponseBody {
                output_speech: None,
                should_end_session: true,
            },
        }
    }

    /// Spoken text, if any
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.response.output_speech.as_ref().map(|s| s.text.as_str())
    }
}
