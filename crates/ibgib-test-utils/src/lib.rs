//! Testing utilities for the ibGib sync workspace
//!
//! In-memory stand-ins for the server connection plus snapshot fixtures.

#![allow(missing_docs)]

use ibgib_bus::{BusError, ChannelTransport, CommandBus, CommandMessage, PushMessage};
use ibgib_content::{rel8n, ContentSnapshot, GibHasher, IbGibId};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::mpsc;

pub fn id(s: &str) -> IbGibId {
    IbGibId::from_str(s).unwrap()
}

/// Snapshot with an explicit hash
pub fn snapshot(ib: &str, gib: &str) -> ContentSnapshot {
    ContentSnapshot::new(ib).with_gib(gib)
}

/// Give `snapshot` the hash its content computes to (unsalted)
pub fn hashed(snapshot: ContentSnapshot) -> ContentSnapshot {
    let gib = GibHasher::new().compute(&snapshot).unwrap();
    snapshot.with_gib(gib)
}

/// Successor of `prev` in the same timeline, with an explicit hash
pub fn successor(prev: &ContentSnapshot, gib: &str) -> ContentSnapshot {
    let mut past = prev.past().to_vec();
    if past.is_empty() {
        past.push(IbGibId::root());
    }
    past.push(prev.id());
    ContentSnapshot {
        gib: gib.to_string(),
        ..prev.clone()
    }
    .with_relation(rel8n::PAST, past)
}

/// Adjunct contribution addressed at `target`
pub fn adjunct(ib: &str, gib: &str, target: &IbGibId) -> ContentSnapshot {
    snapshot(ib, gib).with_relation(rel8n::ADJUNCT_TO, vec![target.clone()])
}

/// Channel transport backed by mpsc channels
///
/// Every join opens a fresh channel; [`push`](Self::push) delivers to the
/// latest one for a topic.
#[derive(Debug, Default)]
pub struct FakeTransport {
    senders: Mutex<HashMap<IbGibId, mpsc::Sender<PushMessage>>>,
    joins: Mutex<Vec<IbGibId>>,
    leaves: Mutex<Vec<IbGibId>>,
    refused: Mutex<HashSet<IbGibId>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse future joins of `topic`
    pub fn fail_joins(&self, topic: &IbGibId) {
        self.refused.lock().insert(topic.clone());
    }

    /// Deliver `message` on `topic`; false if nobody joined it
    pub async fn push(&self, topic: &IbGibId, message: PushMessage) -> bool {
        let sender = self.senders.lock().get(topic).cloned();
        match sender {
            Some(sender) => sender.send(message).await.is_ok(),
            None => false,
        }
    }

    pub fn is_joined(&self, topic: &IbGibId) -> bool {
        self.senders.lock().contains_key(topic)
    }

    pub fn joins(&self) -> Vec<IbGibId> {
        self.joins.lock().clone()
    }

    pub fn join_count(&self, topic: &IbGibId) -> usize {
        self.joins.lock().iter().filter(|t| *t == topic).count()
    }

    pub fn leaves(&self) -> Vec<IbGibId> {
        self.leaves.lock().clone()
    }
}

#[async_trait::async_trait]
impl ChannelTransport for FakeTransport {
    async fn join(&self, topic: &IbGibId) -> Result<mpsc::Receiver<PushMessage>, BusError> {
        if self.refused.lock().contains(topic) {
            return Err(BusError::join_failed(topic.clone(), "refused by test"));
        }
        let (tx, rx) = mpsc::channel(32);
        self.senders.lock().insert(topic.clone(), tx);
        self.joins.lock().push(topic.clone());
        Ok(rx)
    }

    async fn leave(&self, topic: &IbGibId) -> Result<(), BusError> {
        self.senders.lock().remove(topic);
        self.leaves.lock().push(topic.clone());
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Scripted {
    Ok(Value),
    Rejected(Value),
    Transport(String),
}

/// Command bus answering from per-command scripts
///
/// Responses for a command are consumed in order; the last one keeps
/// answering. Unscripted commands fail with a transport error.
#[derive(Debug, Default)]
pub struct FakeCommandBus {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    sent: Mutex<Vec<CommandMessage>>,
    delay: Mutex<Option<Duration>>,
}

impl FakeCommandBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self, name: &str, response: Scripted) {
        self.scripts.lock().entry(name.to_string()).or_default().push_back(response);
    }

    /// Answer `name` with a success payload
    pub fn respond(&self, name: &str, payload: Value) {
        self.script(name, Scripted::Ok(payload));
    }

    /// Answer `name` with an error acknowledgement
    pub fn reject(&self, name: &str, payload: Value) {
        self.script(name, Scripted::Rejected(payload));
    }

    /// Fail `name` as if the connection dropped
    pub fn fail(&self, name: &str, reason: &str) {
        self.script(name, Scripted::Transport(reason.to_string()));
    }

    /// Wait this long before every answer
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn sent(&self) -> Vec<CommandMessage> {
        self.sent.lock().clone()
    }

    /// Payloads sent for one command
    pub fn sent_named(&self, name: &str) -> Vec<Value> {
        self.sent
            .lock()
            .iter()
            .filter(|m| m.name() == name)
            .map(|m| m.data.clone())
            .collect()
    }

    fn next(&self, name: &str) -> Option<Scripted> {
        let mut scripts = self.scripts.lock();
        let queue = scripts.get_mut(name)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait::async_trait]
impl CommandBus for FakeCommandBus {
    async fn send(&self, message: CommandMessage) -> Result<Value, BusError> {
        let name = message.name().to_string();
        self.sent.lock().push(message);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match self.next(&name) {
            Some(Scripted::Ok(payload)) => Ok(payload),
            Some(Scripted::Rejected(payload)) => Err(BusError::rejected(name, payload)),
            Some(Scripted::Transport(reason)) => Err(BusError::Transport(reason)),
            None => Err(BusError::Transport(format!("no response scripted for '{name}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn last_script_keeps_answering() {
        let bus = FakeCommandBus::new();
        bus.respond("refresh", json!({ "n": 1 }));
        bus.respond("refresh", json!({ "n": 2 }));

        for expected in [1, 2, 2] {
            let got = bus.send(CommandMessage::new("refresh", json!({}))).await.unwrap();
            assert_eq!(got["n"], expected);
        }
        assert_eq!(bus.sent_named("refresh").len(), 3);
        assert!(bus.send(CommandMessage::new("fork", json!({}))).await.is_err());
    }

    #[tokio::test]
    async fn transport_delivers_to_joined_topic() {
        let transport = FakeTransport::new();
        let topic = id("foo^A1");
        assert!(!transport.push(&topic, PushMessage::new_adjunct(id("comment^C1"))).await);

        let mut rx = transport.join(&topic).await.unwrap();
        assert!(transport.push(&topic, PushMessage::new_adjunct(id("comment^C1"))).await);
        assert_eq!(rx.recv().await.unwrap().name(), "new_adjunct");

        transport.leave(&topic).await.unwrap();
        assert!(!transport.is_joined(&topic));
        assert_eq!(transport.join_count(&topic), 1);
    }

    #[test]
    fn successor_extends_past() {
        let first = snapshot("foo", "A1");
        let second = successor(&first, "A2");
        assert_eq!(second.past(), &[IbGibId::root(), id("foo^A1")]);
        assert_eq!(second.temporal_junction(), id("foo^A1"));
        assert_eq!(successor(&second, "A3").temporal_junction(), id("foo^A1"));
    }

    #[test]
    fn hashed_snapshot_verifies() {
        let snap = hashed(snapshot("comment hi", "").with_data("text", json!("hi")));
        assert!(GibHasher::new().verify(&snap));
    }
}
