//! `fork`: copy content into a new timeline owned by the current identity

use super::{response_id, Command, CommandInput, CommandOutcome};
use crate::error::SyncError;
use ibgib_content::IbGibId;
use serde_json::{json, Value};

/// Forks the target; the new timeline appears as a speculative node
#[derive(Debug, Clone, Copy, Default)]
pub struct ForkCommand;

impl Command for ForkCommand {
    fn name(&self) -> &'static str {
        "fork"
    }

    fn speculative(&self) -> bool {
        true
    }

    fn payload(&self, target: &IbGibId, input: &CommandInput) -> Result<Value, SyncError> {
        let dest_ib = input
            .str_field("dest_ib")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| target.ib());
        if dest_ib.contains('^') {
            return Err(SyncError::Validation(format!("dest_ib '{dest_ib}' contains '^'")));
        }
        Ok(json!({ "src_ib_gib": target, "dest_ib": dest_ib }))
    }

    fn interpret(&self, _target: &IbGibId, response: &Value) -> Result<CommandOutcome, SyncError> {
        Ok(CommandOutcome {
            created: Some(response_id(response, "forked_id")?),
            ..CommandOutcome::default()
        })
    }
}
