//! `link`: attach a hyperlink

use super::{contribution, Command, CommandInput, CommandOutcome};
use crate::error::SyncError;
use ibgib_content::IbGibId;
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, Default)]
pub struct LinkCommand;

impl Command for LinkCommand {
    fn name(&self) -> &'static str {
        "link"
    }

    fn opens_detail(&self) -> bool {
        true
    }

    fn speculative(&self) -> bool {
        true
    }

    fn payload(&self, target: &IbGibId, input: &CommandInput) -> Result<Value, SyncError> {
        let text = input.require_str("link_text")?.trim();
        if text.chars().any(char::is_whitespace) {
            return Err(SyncError::Validation(format!("link '{text}' contains whitespace")));
        }
        Ok(json!({ "src_ib_gib": target, "link_text": text }))
    }

    fn interpret(&self, target: &IbGibId, response: &Value) -> Result<CommandOutcome, SyncError> {
        contribution(target, response, "link_id")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_text_is_trimmed_and_checked() {
        let target = IbGibId::root();
        let payload = LinkCommand
            .payload(&target, &CommandInput::new().with("link_text", " https://ibgib.com "))
            .unwrap();
        assert_eq!(payload["link_text"], "https://ibgib.com");

        let spaced = CommandInput::new().with("link_text", "not a link");
        assert!(LinkCommand.payload(&target, &spaced).is_err());
    }
}
