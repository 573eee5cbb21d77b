//! Wire messages
//!
//! Command-bus messages travel client → server; push messages travel
//! server → client on a topic keyed by temporal junction id.

use crate::error::BusError;
use chrono::{DateTime, Utc};
use ibgib_content::IbGibId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Metadata type tag for commands
pub const COMMAND_TYPE: &str = "cmd";

/// Push message names
pub mod push_name {
    /// A timeline advanced
    pub const UPDATE: &str = "update";
    /// Batch of pending adjuncts
    pub const ADJUNCTS: &str = "adjuncts";
    /// A single new adjunct
    pub const NEW_ADJUNCT: &str = "new_adjunct";
}

/// Metadata attached to every command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandMetadata {
    /// Command name (`fork`, `comment`, `batch_refresh`, ...)
    pub name: String,
    /// Always [`COMMAND_TYPE`]
    #[serde(rename = "type")]
    pub kind: String,
    /// Client timestamp
    pub local_time: DateTime<Utc>,
}

/// Client → server command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandMessage {
    /// Command-specific fields
    pub data: Value,
    /// Routing metadata
    pub metadata: CommandMetadata,
}

impl CommandMessage {
    /// Build a command stamped with the current time
    #[must_use]
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            data,
            metadata: CommandMetadata {
                name: name.into(),
                kind: COMMAND_TYPE.to_string(),
                local_time: Utc::now(),
            },
        }
    }

    /// Command name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

/// Metadata of a push message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMetadata {
    /// Message name (see [`push_name`])
    pub name: String,
    /// Topic the message was published on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_junction_id: Option<IbGibId>,
    /// Any other server-supplied metadata
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Server → client notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    /// Message-specific fields
    pub data: Value,
    /// Routing metadata
    pub metadata: PushMetadata,
}

/// Payload of an `update` push
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateData {
    /// Snapshot that was superseded
    pub old_id: IbGibId,
    /// Its successor
    pub new_id: IbGibId,
}

/// Payload of an `adjuncts` push
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AdjunctsData {
    /// Target id → adjunct ids
    #[serde(default)]
    pub adjunct_ids: BTreeMap<IbGibId, Vec<IbGibId>>,
}

/// Payload of a `new_adjunct` push
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAdjunctData {
    /// The new contribution
    pub adjunct_ib_gib: IbGibId,
}

/// Decoded push message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    /// A timeline advanced
    Update(UpdateData),
    /// Batch of pending adjuncts
    Adjuncts(AdjunctsData),
    /// A single new adjunct
    NewAdjunct(NewAdjunctData),
}

impl PushMessage {
    /// Build an `update` message for a topic
    #[must_use]
    pub fn update(old_id: IbGibId, new_id: IbGibId, temp_junction_id: IbGibId) -> Self {
        Self {
            data: serde_json::json!({ "old_id": old_id, "new_id": new_id }),
            metadata: PushMetadata {
                name: push_name::UPDATE.to_string(),
                temp_junction_id: Some(temp_junction_id),
                extra: Map::new(),
            },
        }
    }

    /// Build an `adjuncts` message
    #[must_use]
    pub fn adjuncts(adjunct_ids: BTreeMap<IbGibId, Vec<IbGibId>>) -> Self {
        Self {
            data: serde_json::json!({ "adjunct_ids": adjunct_ids }),
            metadata: PushMetadata {
                name: push_name::ADJUNCTS.to_string(),
                temp_junction_id: None,
                extra: Map::new(),
            },
        }
    }

    /// Build a `new_adjunct` message
    #[must_use]
    pub fn new_adjunct(adjunct_ib_gib: IbGibId) -> Self {
        Self {
            data: serde_json::json!({ "adjunct_ib_gib": adjunct_ib_gib }),
            metadata: PushMetadata {
                name: push_name::NEW_ADJUNCT.to_string(),
                temp_junction_id: None,
                extra: Map::new(),
            },
        }
    }

    /// Message name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Decode the payload according to the message name
    ///
    /// # Errors
    /// Returns [`BusError::MalformedMessage`] for unknown names or payloads
    /// that do not match the name
    pub fn event(&self) -> Result<PushEvent, BusError> {
        let malformed = |e: serde_json::Error| BusError::MalformedMessage(format!("{}: {e}", self.name()));
        match self.name() {
            push_name::UPDATE => serde_json::from_value(self.data.clone())
                .map(PushEvent::Update)
                .map_err(malformed),
            push_name::ADJUNCTS => serde_json::from_value(self.data.clone())
                .map(PushEvent::Adjuncts)
                .map_err(malformed),
            push_name::NEW_ADJUNCT => serde_json::from_value(self.data.clone())
                .map(PushEvent::NewAdjunct)
                .map_err(malformed),
            other => Err(BusError::MalformedMessage(format!("unknown push message '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn id(s: &str) -> IbGibId {
        IbGibId::from_str(s).unwrap()
    }

    #[test]
    fn command_wire_shape() {
        let msg = CommandMessage::new("fork", serde_json::json!({ "src_ib_gib": "foo^abc" }));
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["data"]["src_ib_gib"], "foo^abc");
        assert_eq!(json["metadata"]["name"], "fork");
        assert_eq!(json["metadata"]["type"], "cmd");
        assert!(json["metadata"]["local_time"].is_string());
    }

    #[test]
    fn decode_update_from_wire() {
        let json = r#"{
            "data": {"old_id": "x^1", "new_id": "x^2"},
            "metadata": {"name": "update", "temp_junction_id": "x^1", "src": "server"}
        }"#;
        let msg: PushMessage = serde_json::from_str(json).unwrap();

        assert_eq!(msg.metadata.temp_junction_id, Some(id("x^1")));
        assert_eq!(msg.metadata.extra["src"], "server");
        assert_eq!(
            msg.event().unwrap(),
            PushEvent::Update(UpdateData {
                old_id: id("x^1"),
                new_id: id("x^2"),
            })
        );
    }

    #[test]
    fn decode_adjuncts() {
        let mut ids = BTreeMap::new();
        ids.insert(id("t^1"), vec![id("comment a^1")]);
        let msg = PushMessage::adjuncts(ids.clone());

        match msg.event().unwrap() {
            PushEvent::Adjuncts(data) => assert_eq!(data.adjunct_ids, ids),
            other => panic!("expected adjuncts, got {other:?}"),
        }
    }

    #[test]
    fn decode_new_adjunct() {
        let msg = PushMessage::new_adjunct(id("comment a^1"));
        assert_eq!(
            msg.event().unwrap(),
            PushEvent::NewAdjunct(NewAdjunctData {
                adjunct_ib_gib: id("comment a^1"),
            })
        );
    }

    #[test]
    fn decode_rejects_unknown_name() {
        let mut msg = PushMessage::new_adjunct(id("comment a^1"));
        msg.metadata.name = "mystery".to_string();
        assert!(matches!(msg.event(), Err(BusError::MalformedMessage(_))));
    }

    #[test]
    fn decode_rejects_mismatched_payload() {
        let mut msg = PushMessage::new_adjunct(id("comment a^1"));
        msg.metadata.name = push_name::UPDATE.to_string();
        assert!(matches!(msg.event(), Err(BusError::MalformedMessage(_))));
    }
}
