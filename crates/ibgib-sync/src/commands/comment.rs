//! `comment`: attach a text comment

use super::{contribution, Command, CommandInput, CommandOutcome};
use crate::error::SyncError;
use ibgib_content::IbGibId;
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, Default)]
pub struct CommentCommand;

impl Command for CommentCommand {
    fn name(&self) -> &'static str {
        "comment"
    }

    fn opens_detail(&self) -> bool {
        true
    }

    fn speculative(&self) -> bool {
        true
    }

    fn payload(&self, target: &IbGibId, input: &CommandInput) -> Result<Value, SyncError> {
        let text = input.require_str("comment_text")?;
        Ok(json!({ "src_ib_gib": target, "comment_text": text }))
    }

    fn interpret(&self, target: &IbGibId, response: &Value) -> Result<CommandOutcome, SyncError> {
        contribution(target, response, "comment_id")
    }
}
