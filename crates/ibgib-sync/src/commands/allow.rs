//! `allow`: accept a pending adjunct into the target's timeline

use super::{response_id, Command, CommandInput, CommandOutcome};
use crate::error::SyncError;
use ibgib_content::IbGibId;
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, Default)]
pub struct AllowCommand;

impl Command for AllowCommand {
    fn name(&self) -> &'static str {
        "allow"
    }

    fn opens_detail(&self) -> bool {
        true
    }

    fn payload(&self, target: &IbGibId, input: &CommandInput) -> Result<Value, SyncError> {
        let adjunct: IbGibId = input
            .require_str("adjunct_ib_gib")?
            .parse()
            .map_err(|e| SyncError::Validation(format!("adjunct_ib_gib: {e}")))?;
        Ok(json!({ "ib_gib": target, "adjunct_ib_gib": adjunct }))
    }

    fn interpret(&self, target: &IbGibId, response: &Value) -> Result<CommandOutcome, SyncError> {
        let new_id = response_id(response, "new_ib_gib")?;
        let acknowledged = response_id(response, "adjunct_ib_gib").ok();
        Ok(CommandOutcome {
            mutated: Some((target.clone(), new_id)),
            acknowledged,
            ..CommandOutcome::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn allow_round_trip_fields() {
        let target: IbGibId = "foo^abc".parse().unwrap();
        let input = CommandInput::new().with("adjunct_ib_gib", "comment hi^1");
        let payload = AllowCommand.payload(&target, &input).unwrap();
        assert_eq!(payload, json!({ "ib_gib": "foo^abc", "adjunct_ib_gib": "comment hi^1" }));

        let outcome = AllowCommand
            .interpret(&target, &json!({ "new_ib_gib": "foo^abd", "adjunct_ib_gib": "comment hi^1" }))
            .unwrap();
        assert_eq!(outcome.mutated, Some((target, "foo^abd".parse().unwrap())));
        assert_eq!(outcome.acknowledged, Some("comment hi^1".parse().unwrap()));
    }
}
