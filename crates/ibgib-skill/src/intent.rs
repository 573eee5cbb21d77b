//! Intent table

/// Intents the skill answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownIntent {
    OpenIbGib,
    ThankYou,
    Help,
    Stop,
    Cancel,
    /// Unrecognized intent name
    Fallback,
}

impl KnownIntent {
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "OpenIbGibIntent" => Self::OpenIbGib,
            "ThankYouIntent" => Self::ThankYou,
            "AMAZON.HelpIntent" => Self::Help,
            "AMAZON.StopIntent" => Self::Stop,
            "AMAZON.CancelIntent" => Self::Cancel,
            _ => Self::Fallback,
        }
    }

    /// Canned reply
    #[must_use]
    pub fn speech(self) -> &'static str {
        match self {
            Self::OpenIbGib => "Opening ib gib. What would you like to look at?",
            Self::ThankYou => "You're welcome.",
            Self::Help => "You can say open ib gib, or say stop to exit.",
            Self::Stop | Self::Cancel => "Goodbye.",
            Self::Fallback => "Sorry, I didn't catch that. You can say open ib gib.",
        }
    }

    /// Whether the reply closes the session
    #[must_use]
    pub fn ends_session(self) -> bool {
        matches!(self, Self::ThankYou | Self::Stop | Self::Cancel)
    }
}

/// Greeting for a launch without intent
pub const WELCOME: &str = "Welcome to ib gib. You can say open ib gib.";
