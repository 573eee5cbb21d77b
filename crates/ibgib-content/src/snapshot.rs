//! Immutable content snapshots
//!
//! A [`ContentSnapshot`] is created server-side by a mutation, fork or
//! append and is never mutated on the client. Its identity is recomputed
//! from the document itself (`ib^gib`), never taken from a request path.

use crate::category::ContentCategory;
use crate::id::{IbGibId, IdError};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Reserved relation names
pub mod rel8n {
    /// Prior snapshots in the same timeline, root first
    pub const PAST: &str = "past";
    /// Structural lineage
    pub const ANCESTOR: &str = "ancestor";
    /// Construction provenance
    pub const DNA: &str = "dna";
    /// Attribution
    pub const IDENTITY: &str = "identity";
    /// Target an adjunct was contributed to
    pub const ADJUNCT_TO: &str = "adjunct_to";
}

/// Named, ordered relation lists
///
/// Blank entries in the wire form are skipped on deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Rel8ns(BTreeMap<String, Vec<IbGibId>>);

impl Rel8ns {
    /// Empty relation map
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Members of a relation (empty if absent)
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> &[IbGibId] {
        self.0.get(name).map_or(&[], Vec::as_slice)
    }

    /// Replace a relation's members
    pub fn set(&mut self, name: impl Into<String>, members: Vec<IbGibId>) {
        self.0.insert(name.into(), members);
    }

    /// Append one member to a relation
    pub fn push(&mut self, name: impl Into<String>, member: IbGibId) {
        self.0.entry(name.into()).or_default().push(member);
    }

    /// Relation names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of relations
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if there are no relations
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for Rel8ns {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<BTreeMap<String, Vec<String>>>::deserialize(deserializer)?;
        let mut rel8ns = BTreeMap::new();
        for (name, members) in raw.unwrap_or_default() {
            let mut ids = Vec::with_capacity(members.len());
            for member in members {
                match member.parse::<IbGibId>() {
                    Ok(id) => ids.push(id),
                    Err(IdError::Blank) => {}
                    Err(e) => return Err(serde::de::Error::custom(e)),
                }
            }
            rel8ns.insert(name, ids);
        }
        Ok(Self(rel8ns))
    }
}

/// One immutable snapshot of content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentSnapshot {
    /// Free-form label
    pub ib: String,
    /// Content hash
    pub gib: String,
    /// Data payload
    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: Map<String, Value>,
    /// Relation map
    #[serde(default)]
    pub rel8ns: Rel8ns,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

impl ContentSnapshot {
    /// Start a snapshot with a label and no hash
    #[must_use]
    pub fn new(ib: impl Into<String>) -> Self {
        Self {
            ib: ib.into(),
            gib: String::new(),
            data: Map::new(),
            rel8ns: Rel8ns::new(),
        }
    }

    /// The root sentinel snapshot
    #[must_use]
    pub fn root() -> Self {
        Self::new("ib").with_gib("gib")
    }

    /// With hash component
    #[inline]
    #[must_use]
    pub fn with_gib(mut self, gib: impl Into<String>) -> Self {
        self.gib = gib.into();
        self
    }

    /// With one data field
    #[inline]
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// With one relation
    #[inline]
    #[must_use]
    pub fn with_relation(mut self, name: impl Into<String>, members: Vec<IbGibId>) -> Self {
        self.rel8ns.set(name, members);
        self
    }

    /// Identifier derived from the document
    ///
    /// Not checked; call [`validate`](Self::validate) before trusting it.
    #[must_use]
    pub fn id(&self) -> IbGibId {
        IbGibId::unchecked(self.ib.clone(), self.gib.clone())
    }

    /// Check structural invariants
    ///
    /// # Errors
    /// Returns error if the label or hash is missing or malformed
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.gib.is_empty() {
            return Err(SnapshotError::MissingGib(self.ib.clone()));
        }
        IbGibId::new(self.ib.clone(), self.gib.clone())?;
        Ok(())
    }

    /// Members of a relation (empty if absent)
    #[inline]
    #[must_use]
    pub fn relation(&self, name: &str) -> &[IbGibId] {
        self.rel8ns.get(name)
    }

    /// Prior snapshots in this timeline, root first
    #[inline]
    #[must_use]
    pub fn past(&self) -> &[IbGibId] {
        self.rel8ns.get(rel8n::PAST)
    }

    /// Stable anchor of this snapshot's timeline
    ///
    /// The first non-root entry of `past`, or this snapshot itself when the
    /// timeline has no history yet.
    #[must_use]
    pub fn temporal_junction(&self) -> IbGibId {
        self.past()
            .iter()
            .find(|id| !id.is_root())
            .cloned()
            .unwrap_or_else(|| self.id())
    }

    /// Category derived from the label
    #[inline]
    #[must_use]
    pub fn category(&self) -> ContentCategory {
        ContentCategory::from_ib(&self.ib)
    }

    /// Whether this is the root sentinel
    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.ib == "ib" && self.gib == "gib"
    }
}

/// Errors for malformed snapshots
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotError {
    /// Hash component missing
    #[error("snapshot '{0}' has no gib")]
    MissingGib(String),

    /// Label/identifier malformed
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
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
    fn deserialize_wire_form() {
        let json = r#"{
            "ib": "comment hi",
            "gib": "ABC",
            "data": {"text": "hi"},
            "rel8ns": {"past": ["ib^gib", "comment hi^000"], "dna": []}
        }"#;
        let snapshot: ContentSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.id(), id("comment hi^ABC"));
        assert_eq!(snapshot.past(), &[IbGibId::root(), id("comment hi^000")]);
        assert_eq!(snapshot.data["text"], "hi");
    }

    #[test]
    fn deserialize_null_data_and_missing_rel8ns() {
        let json = r#"{"ib": "ib", "gib": "gib", "data": null}"#;
        let snapshot: ContentSnapshot = serde_json::from_str(json).unwrap();
        assert!(snapshot.data.is_empty());
        assert!(snapshot.rel8ns.is_empty());
        assert!(snapshot.is_root());
    }

    #[test]
    fn deserialize_skips_blank_relation_entries() {
        let json = r#"{"ib": "x", "gib": "1", "rel8ns": {"past": ["", "x^0"]}}"#;
        let snapshot: ContentSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.past(), &[id("x^0")]);
    }

    #[test]
    fn deserialize_rejects_malformed_relation_entry() {
        let json = r#"{"ib": "x", "gib": "1", "rel8ns": {"past": ["garbage"]}}"#;
        let result: Result<ContentSnapshot, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn validate_requires_gib() {
        let snapshot = ContentSnapshot::new("comment");
        assert_eq!(
            snapshot.validate(),
            Err(SnapshotError::MissingGib("comment".to_string()))
        );
    }

    #[test]
    fn validate_rejects_separator_in_ib() {
        let snapshot = ContentSnapshot::new("a^b").with_gib("c");
        assert!(matches!(snapshot.validate(), Err(SnapshotError::InvalidId(_))));
    }

    #[test]
    fn temporal_junction_skips_root() {
        let snapshot = ContentSnapshot::new("x")
            .with_gib("3")
            .with_relation(rel8n::PAST, vec![IbGibId::root(), id("x^1"), id("x^2")]);
        assert_eq!(snapshot.temporal_junction(), id("x^1"));
    }

    #[test]
    fn temporal_junction_without_history_is_self() {
        let only_root = ContentSnapshot::new("x")
            .with_gib("1")
            .with_relation(rel8n::PAST, vec![IbGibId::root()]);
        assert_eq!(only_root.temporal_junction(), id("x^1"));

        let no_past = ContentSnapshot::new("y").with_gib("1");
        assert_eq!(no_past.temporal_junction(), id("y^1"));
    }

    #[test]
    fn relation_absent_is_empty() {
        let snapshot = ContentSnapshot::new("x").with_gib("1");
        assert!(snapshot.relation("comment").is_empty());
    }
}
