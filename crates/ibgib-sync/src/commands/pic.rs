//! `pic`: attach an image

use super::{contribution, Command, CommandInput, CommandOutcome};
use crate::error::SyncError;
use ibgib_content::IbGibId;
use serde_json::{json, Value};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, Copy, Default)]
pub struct PicCommand;

impl Command for PicCommand {
    fn name(&self) -> &'static str {
        "pic"
    }

    fn opens_detail(&self) -> bool {
        true
    }

    fn speculative(&self) -> bool {
        true
    }

    fn payload(&self, target: &IbGibId, input: &CommandInput) -> Result<Value, SyncError> {
        let filename = input.require_str("filename")?;
        let data_hex = input.require_str("data_hex")?;
        if data_hex.len() % 2 != 0 || !data_hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(SyncError::Validation("data_hex is not hex-encoded".to_string()));
        }
        let content_type = input.str_field("content_type").unwrap_or(DEFAULT_CONTENT_TYPE);
        Ok(json!({
            "src_ib_gib": target,
            "filename": filename,
            "content_type": content_type,
            "data_hex": data_hex,
        }))
    }

    fn interpret(&self, target: &IbGibId, response: &Value) -> Result<CommandOutcome, SyncError> {
        contribution(target, response, "pic_id")
    }
}
