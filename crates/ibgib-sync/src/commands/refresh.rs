//! `refresh`: ask for the latest snapshot of the target's timeline

use super::{response_id, Command, CommandInput, CommandOutcome};
use crate::error::SyncError;
use ibgib_content::IbGibId;
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, Default)]
pub struct RefreshCommand;

impl Command for RefreshCommand {
    fn name(&self) -> &'static str {
        "refresh"
    }

    fn payload(&self, target: &IbGibId, _input: &CommandInput) -> Result<Value, SyncError> {
        Ok(json!({ "ib_gib": target }))
    }

    fn interpret(&self, target: &IbGibId, response: &Value) -> Result<CommandOutcome, SyncError> {
        let latest = response_id(response, "latest_id")?;
        let mutated = (&latest != target).then(|| (target.clone(), latest));
        Ok(CommandOutcome {
            mutated,
            ..CommandOutcome::default()
        })
    }
}
