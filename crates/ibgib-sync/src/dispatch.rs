//! Command dispatch
//!
//! `exec(target, command)` runs one command against a graph node. At most
//! one command is open (detail interaction) at a time; executing another
//! closes it first, even when the new one is then rejected.
//!
//! A round trip is:
//! 1. build the payload (validation errors stop here, nothing is added)
//! 2. add a speculative node linked from the target and start a request
//! 3. send over the command bus
//! 4. apply the outcome: resolve or discard the speculative node, advance
//!    latest pointers, broadcast locally, acknowledge adjuncts
//!
//! A failed round trip leaves the speculative node errored.

use crate::commands::{Command, CommandInput, CommandOutcome, CommandRegistry};
use crate::error::SyncError;
use ibgib_bus::{CommandBus, CommandMessage, EventBus};
use ibgib_cache::{AdjunctCache, LatestCache};
use ibgib_content::{ContentCategory, IbGibId};
use ibgib_graph::{ConfirmOutcome, GraphError, NodeId, NodeLifecycle, RequestToken, VirtualSpec};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Result of [`CommandDispatch::exec`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecState {
    /// Waiting for [`CommandDispatch::submit`]
    DetailOpened {
        command: &'static str,
        target: NodeId,
    },
    /// Round trip done
    Completed(CommandReport),
}

/// Summary of a completed round trip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReport {
    pub command: &'static str,
    /// Content the command ran against
    pub target: IbGibId,
    /// Speculative node added for the round trip
    pub speculative: Option<NodeId>,
    /// How that node ended up
    pub confirmation: Option<ConfirmOutcome>,
    pub outcome: CommandOutcome,
}

impl CommandReport {
    /// Fail if the contribution was left as an adjunct
    ///
    /// # Errors
    /// [`SyncError::Unauthorized`] when the target was not mutated directly
    pub fn require_direct(&self) -> Result<&CommandOutcome, SyncError> {
        if self.outcome.is_direct() {
            Ok(&self.outcome)
        } else {
            Err(SyncError::Unauthorized(self.target.clone()))
        }
    }
}

#[derive(Debug, Clone)]
struct OpenCommand {
    command: Arc<dyn Command>,
    node: NodeId,
    target: IbGibId,
}

/// Runs commands against graph nodes
pub struct CommandDispatch {
    registry: Arc<CommandRegistry>,
    bus: Arc<dyn CommandBus>,
    lifecycle: NodeLifecycle,
    latest: LatestCache,
    adjuncts: AdjunctCache,
    events: Arc<EventBus>,
    current: Mutex<Option<OpenCommand>>,
}

impl fmt::Debug for CommandDispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDispatch")
            .field("commands", &self.registry.len())
            .field("current", &self.current())
            .finish_non_exhaustive()
    }
}

impl CommandDispatch {
    #[must_use]
    pub fn new(
        registry: Arc<CommandRegistry>,
        bus: Arc<dyn CommandBus>,
        lifecycle: NodeLifecycle,
        latest: LatestCache,
        adjuncts: AdjunctCache,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            registry,
            bus,
            lifecycle,
            latest,
            adjuncts,
            events,
            current: Mutex::new(None),
        }
    }

    #[inline]
    #[must_use]
    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Open command name and its target node
    #[must_use]
    pub fn current(&self) -> Option<(&'static str, NodeId)> {
        self.current.lock().as_ref().map(|c| (c.command.name(), c.node))
    }

    /// Close the open command, returning its name
    pub fn close(&self) -> Option<&'static str> {
        let closed = self.current.lock().take()?;
        tracing::debug!(command = closed.command.name(), node = %closed.node, "command closed");
        Some(closed.command.name())
    }

    /// Run `name` against the node `target`
    ///
    /// # Errors
    /// - [`SyncError::UnknownCommand`] for unregistered names
    /// - [`SyncError::Graph`] if the target is not in the graph
    /// - [`SyncError::Validation`] if the target has no content or the command
    ///   does not apply to it, or the payload cannot be built
    /// - [`SyncError::Network`] if the round trip failed (the speculative
    ///   node is left errored)
    pub async fn exec(&self, target: NodeId, name: &str) -> Result<ExecState, SyncError> {
        if let Some(previous) = self.close() {
            tracing::debug!(previous, next = name, "closing open command");
        }

        let command = self
            .registry
            .get(name)
            .ok_or_else(|| SyncError::UnknownCommand(name.to_string()))?;
        let open = self.open_command(command, target)?;

        if open.command.opens_detail() {
            let state = ExecState::DetailOpened {
                command: open.command.name(),
                target,
            };
            *self.current.lock() = Some(open);
            tracing::debug!(command = name, node = %target, "command detail opened");
            return Ok(state);
        }

        self.run(&open, &CommandInput::new()).await.map(ExecState::Completed)
    }

    /// Submit the open command with the user's input
    ///
    /// The command is closed whether or not the round trip succeeds.
    ///
    /// # Errors
    /// [`SyncError::NoOpenCommand`], or anything [`exec`](Self::exec) reports
    /// for the round trip
    pub async fn submit(&self, input: CommandInput) -> Result<CommandReport, SyncError> {
        let open = self.current.lock().take().ok_or(SyncError::NoOpenCommand)?;
        if !open.command.submits() {
            tracing::debug!(command = open.command.name(), "command has nothing to submit");
            return Ok(CommandReport {
                command: open.command.name(),
                target: open.target,
                speculative: None,
                confirmation: None,
                outcome: CommandOutcome::default(),
            });
        }
        self.run(&open, &input).await
    }

    fn open_command(&self, command: Arc<dyn Command>, node: NodeId) -> Result<OpenCommand, SyncError> {
        let target_node = self
            .lifecycle
            .view()
            .node(node)
            .ok_or(GraphError::NodeNotFound(node))?;
        let target = target_node
            .content_ref
            .clone()
            .ok_or_else(|| SyncError::Validation(format!("node {node} has no content")))?;

        let category = target_node
            .snapshot
            .as_ref()
            .map_or_else(|| ContentCategory::of(&target), |s| s.category());
        if !command.applies_to(category) {
            return Err(SyncError::Validation(format!(
                "{} does not apply to {category:?} content",
                command.name()
            )));
        }
        Ok(OpenCommand { command, node, target })
    }

    async fn run(&self, open: &OpenCommand, input: &CommandInput) -> Result<CommandReport, SyncError> {
        let command = &open.command;
        let payload = command.payload(&open.target, input)?;

        let speculative = if command.speculative() {
            self.begin_speculative(open.node).await?
        } else {
            None
        };

        tracing::info!(command = command.name(), target = %open.target, "sending command");
        let response = match self.bus.send(CommandMessage::new(command.name(), payload)).await {
            Ok(response) => response,
            Err(e) => {
                let err = SyncError::from(e);
                self.fail(command.name(), speculative, &err);
                return Err(err);
            }
        };
        let outcome = match command.interpret(&open.target, &response) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.fail(command.name(), speculative, &err);
                return Err(err);
            }
        };

        let confirmation = self.apply(&outcome, speculative).await;
        Ok(CommandReport {
            command: command.name(),
            target: open.target.clone(),
            speculative: speculative.map(|(node, _)| node),
            confirmation,
            outcome,
        })
    }

    async fn begin_speculative(&self, source: NodeId) -> Result<Option<(NodeId, RequestToken)>, SyncError> {
        let node = self
            .lifecycle
            .add_virtual(VirtualSpec::speculative().from(source))
            .await?;
        match self.lifecycle.begin_request(node) {
            Some(token) => Ok(Some((node, token))),
            None => {
                tracing::warn!(node = %node, "speculative node busy before its request");
                Ok(None)
            }
        }
    }

    fn fail(&self, command: &str, speculative: Option<(NodeId, RequestToken)>, err: &SyncError) {
        tracing::warn!(command, error = %err, "command failed");
        if let Some((node, token)) = speculative {
            self.lifecycle.mark_errored(node, token, err.to_string());
        }
    }

    async fn apply(
        &self,
        outcome: &CommandOutcome,
        speculative: Option<(NodeId, RequestToken)>,
    ) -> Option<ConfirmOutcome> {
        if let Some((old, new)) = &outcome.mutated {
            self.latest.set(old.clone(), new.clone()).await;
            self.events.broadcast_local(old.clone(), new.clone()).await;
        }

        if let Some(adjunct) = &outcome.acknowledged {
            match self.adjuncts.find_by_adjunct_id(adjunct) {
                Some(info) => {
                    self.adjuncts.remove(&info.target_timeline_id, adjunct);
                    tracing::debug!(adjunct = %adjunct, "adjunct acknowledged");
                }
                None => tracing::debug!(adjunct = %adjunct, "acknowledged adjunct was not pending"),
            }
        }

        let (node, token) = speculative?;
        match (&outcome.created, &outcome.adjunct) {
            (Some(created), None) => Some(self.lifecycle.resolve(node, token, created.clone()).await),
            (_, Some(adjunct)) => {
                if self.lifecycle.discard(node, token) {
                    tracing::info!(adjunct = %adjunct, "contribution left as adjunct, speculative node discarded");
                }
                None
            }
            (None, None) => {
                self.lifecycle.discard(node, token);
                None
            }
        }
    }
}
