//! Command set
//!
//! Each command is a small policy object: which content it applies to,
//! whether it opens a detail interaction, whether it adds a speculative node
//! before its round trip, how it builds the command-bus payload and how it
//! reads the acknowledgement.

mod allow;
mod comment;
mod fork;
mod info;
mod link;
mod pic;
mod refresh;

pub use allow::AllowCommand;
pub use comment::CommentCommand;
pub use fork::ForkCommand;
pub use info::InfoCommand;
pub use link::LinkCommand;
pub use pic::PicCommand;
pub use refresh::RefreshCommand;

use crate::error::SyncError;
use ibgib_content::{ContentCategory, IbGibId};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// A user action on a graph node
pub trait Command: Send + Sync + fmt::Debug {
    /// Registry key and command-bus name
    fn name(&self) -> &'static str;

    /// Whether the command is offered for content of this category
    fn applies_to(&self, category: ContentCategory) -> bool {
        category.is_user_content()
    }

    /// Opens a detail interaction instead of submitting right away
    fn opens_detail(&self) -> bool {
        false
    }

    /// Adds a virtual node for the expected result before the round trip
    fn speculative(&self) -> bool {
        false
    }

    /// Sends anything over the command bus
    fn submits(&self) -> bool {
        true
    }

    /// Command-bus payload for `target`
    ///
    /// # Errors
    /// [`SyncError::Validation`] when required input is missing
    fn payload(&self, target: &IbGibId, input: &CommandInput) -> Result<Value, SyncError>;

    /// Read the success acknowledgement
    ///
    /// # Errors
    /// [`SyncError::Validation`] when the response lacks the expected fields
    fn interpret(&self, target: &IbGibId, response: &Value) -> Result<CommandOutcome, SyncError>;
}

/// User-supplied fields for a command (detail form contents)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandInput(Map<String, Value>);

impl CommandInput {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With one field
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// String field, if present
    #[must_use]
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Non-blank string field
    ///
    /// # Errors
    /// [`SyncError::Validation`] if missing or blank
    pub fn require_str(&self, key: &str) -> Result<&str, SyncError> {
        self.str_field(key)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| SyncError::Validation(format!("missing field '{key}'")))
    }
}

/// What a command round trip changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    /// New content the speculative node resolves to
    pub created: Option<IbGibId>,
    /// Timeline advanced from `.0` to `.1`
    pub mutated: Option<(IbGibId, IbGibId)>,
    /// Contribution left pending on content we do not own
    pub adjunct: Option<IbGibId>,
    /// Pending adjunct that is now linked
    pub acknowledged: Option<IbGibId>,
}

impl CommandOutcome {
    /// Whether the round trip had a direct effect on the target
    #[inline]
    #[must_use]
    pub fn is_direct(&self) -> bool {
        self.adjunct.is_none()
    }
}

/// Commands by name, in registration order
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    commands: IndexMap<&'static str, Arc<dyn Command>>,
}

impl CommandRegistry {
    /// Empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in command
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ForkCommand));
        registry.register(Arc::new(CommentCommand));
        registry.register(Arc::new(LinkCommand));
        registry.register(Arc::new(PicCommand));
        registry.register(Arc::new(RefreshCommand));
        registry.register(Arc::new(AllowCommand));
        registry.register(Arc::new(InfoCommand));
        registry
    }

    /// Add or replace a command
    pub fn register(&mut self, command: Arc<dyn Command>) {
        let name = command.name();
        if self.commands.insert(name, command).is_some() {
            tracing::debug!(command = name, "command replaced in registry");
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.commands.get(name).cloned()
    }

    /// Commands offered for a category
    pub fn applicable(&self, category: ContentCategory) -> impl Iterator<Item = &Arc<dyn Command>> + '_ {
        self.commands.values().filter(move |c| c.applies_to(category))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.commands.keys().copied()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Required identifier field of a response
pub(crate) fn response_id(response: &Value, key: &str) -> Result<IbGibId, SyncError> {
    optional_response_id(response, key)?
        .ok_or_else(|| SyncError::Validation(format!("response missing '{key}'")))
}

/// Optional identifier field of a response; blank counts as absent
pub(crate) fn optional_response_id(response: &Value, key: &str) -> Result<Option<IbGibId>, SyncError> {
    match response.get(key).and_then(Value::as_str).map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s
            .parse::<IbGibId>()
            .map(Some)
            .map_err(|e| SyncError::Validation(format!("response field '{key}': {e}"))),
    }
}

/// Outcome of adding a contribution (comment, link, pic) to `target`
///
/// The server reports `new_src_ib_gib` only when it could link the
/// contribution directly; otherwise the contribution is an adjunct.
pub(crate) fn contribution(target: &IbGibId, response: &Value, key: &str) -> Result<CommandOutcome, SyncError> {
    let created = response_id(response, key)?;
    match optional_response_id(response, "new_src_ib_gib")? {
        Some(new_src) => Ok(CommandOutcome {
            created: Some(created),
            mutated: Some((target.clone(), new_src)),
            ..CommandOutcome::default()
        }),
        None => Ok(CommandOutcome {
            adjunct: Some(created),
            ..CommandOutcome::default()
        }),
    }
}
