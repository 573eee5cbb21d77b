//! `info`: show details of the target; nothing is sent

use super::{Command, CommandInput, CommandOutcome};
use crate::error::SyncError;
use ibgib_content::{ContentCategory, IbGibId};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default)]
pub struct InfoCommand;

impl Command for InfoCommand {
    fn name(&self) -> &'static str {
        "info"
    }

    fn applies_to(&self, category: ContentCategory) -> bool {
        category != ContentCategory::Root
    }

    fn opens_detail(&self) -> bool {
        true
    }

    fn submits(&self) -> bool {
        false
    }

    fn payload(&self, _target: &IbGibId, _input: &CommandInput) -> Result<Value, SyncError> {
        Err(SyncError::Validation("info has nothing to submit".to_string()))
    }

    fn interpret(&self, _target: &IbGibId, _response: &Value) -> Result<CommandOutcome, SyncError> {
        Ok(CommandOutcome::default())
    }
}
