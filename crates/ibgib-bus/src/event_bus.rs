//! Reference-counted event bus
//!
//! Multiplexes local subscribers over one server channel per temporal
//! junction id:
//! - the channel for an id is joined when its first subscriber connects
//! - it is left when its last subscriber disconnects
//! - each channel has one pump task delivering messages in arrival order
//!
//! No reordering or deduplication happens here; handlers see exactly what
//! the server sent.

use crate::error::BusError;
use crate::message::PushMessage;
use crate::transport::ChannelTransport;
use dashmap::DashMap;
use ibgib_cache::ContentCache;
use ibgib_content::IbGibId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Callback invoked for every push on a subscribed topic
pub type PushHandler = Arc<dyn Fn(&PushMessage) + Send + Sync>;

/// Subscription identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generate a fresh id
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow as str
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One local subscription
#[derive(Clone)]
pub struct ConnectionInfo {
    /// Subscription id
    pub connection_id: ConnectionId,
    /// Temporal junction id subscribed to
    pub subscribed_id: IbGibId,
    handler: PushHandler,
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("connection_id", &self.connection_id)
            .field("subscribed_id", &self.subscribed_id)
            .finish_non_exhaustive()
    }
}

type Connections = DashMap<ConnectionId, ConnectionInfo>;

/// Pub/sub multiplexer over per-id server channels
pub struct EventBus {
    transport: Arc<dyn ChannelTransport>,
    content: ContentCache,
    connections: Arc<Connections>,
    /// Open channels and their pump tasks; also serializes connect/disconnect
    channels: Mutex<HashMap<IbGibId, JoinHandle<()>>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("connections", &self.connections.len())
            .finish_non_exhaustive()
    }
}

impl EventBus {
    /// Create bus over a transport
    ///
    /// The content cache resolves temporal junctions for local broadcasts.
    #[must_use]
    pub fn new(transport: Arc<dyn ChannelTransport>, content: ContentCache) -> Self {
        Self {
            transport,
            content,
            connections: Arc::new(DashMap::new()),
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe `handler` to pushes for `id`
    ///
    /// A connection id that is already registered is a warned no-op: the new
    /// handler is ignored and the existing subscription is kept. When no id is
    /// given one is generated.
    ///
    /// # Errors
    /// Returns [`BusError::JoinFailed`] if the channel had to be opened and the
    /// transport refused; nothing is registered in that case
    pub async fn connect(
        &self,
        connection_id: Option<ConnectionId>,
        id: IbGibId,
        handler: PushHandler,
    ) -> Result<ConnectionId, BusError> {
        let connection_id = connection_id.unwrap_or_default();
        let mut channels = self.channels.lock().await;

        if let Some(existing) = self.connections.get(&connection_id) {
            tracing::warn!(
                connection_id = %connection_id,
                subscribed = %existing.subscribed_id,
                requested = %id,
                "connection already registered, ignoring new handler"
            );
            return Ok(connection_id);
        }

        if !channels.contains_key(&id) {
            let rx = match self.transport.join(&id).await {
                Ok(rx) => rx,
                Err(e) => {
                    tracing::error!(topic = %id, error = %e, "channel join failed");
                    return Err(e);
                }
            };
            channels.insert(id.clone(), self.spawn_pump(id.clone(), rx));
            tracing::info!(topic = %id, "channel opened");
        }

        self.connections.insert(
            connection_id.clone(),
            ConnectionInfo {
                connection_id: connection_id.clone(),
                subscribed_id: id,
                handler,
            },
        );
        tracing::debug!(connection_id = %connection_id, "connected");
        Ok(connection_id)
    }

    /// Remove one subscription, or every subscription when `None`
    ///
    /// A channel is left only when no subscription references it anymore.
    pub async fn disconnect(&self, connection_id: Option<&ConnectionId>) {
        match connection_id {
            Some(connection_id) => self.disconnect_one(connection_id).await,
            None => self.disconnect_all().await,
        }
    }

    async fn disconnect_one(&self, connection_id: &ConnectionId) {
        let mut channels = self.channels.lock().await;

        let Some((_, info)) = self.connections.remove(connection_id) else {
            tracing::debug!(connection_id = %connection_id, "disconnect of unknown connection");
            return;
        };

        let still_referenced = self
            .connections
            .iter()
            .any(|c| c.subscribed_id == info.subscribed_id);
        if still_referenced {
            return;
        }

        if let Some(pump) = channels.remove(&info.subscribed_id) {
            pump.abort();
            self.leave(&info.subscribed_id).await;
        }
    }

    async fn disconnect_all(&self) {
        let mut channels = self.channels.lock().await;
        self.connections.clear();
        for (topic, pump) in channels.drain() {
            pump.abort();
            self.leave(&topic).await;
        }
        tracing::info!("event bus torn down");
    }

    async fn leave(&self, topic: &IbGibId) {
        match self.transport.leave(topic).await {
            Ok(()) => tracing::info!(topic = %topic, "channel closed"),
            Err(e) => tracing::warn!(topic = %topic, error = %e, "channel leave failed"),
        }
    }

    /// Deliver an `update` to local subscribers of `old_id`'s timeline
    ///
    /// No server round trip. Returns the number of handlers reached.
    pub async fn broadcast_local(&self, old_id: IbGibId, new_id: IbGibId) -> usize {
        let topic = self
            .content
            .temporal_junction(&old_id)
            .await
            .unwrap_or_else(|| old_id.clone());
        let message = PushMessage::update(old_id, new_id, topic.clone());
        let reached = deliver(&self.connections, &topic, &message);
        tracing::debug!(topic = %topic, reached, "local update broadcast");
        reached
    }

    /// Number of registered subscriptions
    #[inline]
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of open channels
    pub async fn channel_count(&self) -> usize {
        self.channels.lock().await.len()
    }

    /// Check if the channel for `id` is open
    pub async fn is_channel_open(&self, id: &IbGibId) -> bool {
        self.channels.lock().await.contains_key(id)
    }

    /// Subscription info by id
    #[must_use]
    pub fn connection(&self, connection_id: &ConnectionId) -> Option<ConnectionInfo> {
        self.connections.get(connection_id).map(|c| c.value().clone())
    }

    fn spawn_pump(&self, topic: IbGibId, mut rx: mpsc::Receiver<PushMessage>) -> JoinHandle<()> {
        let connections = Arc::clone(&self.connections);
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let reached = deliver(&connections, &topic, &message);
                tracing::trace!(topic = %topic, name = message.name(), reached, "push delivered");
            }
            tracing::debug!(topic = %topic, "channel stream ended");
        })
    }
}

/// Invoke every handler subscribed to `topic`, outside the map's locks
fn deliver(connections: &Connections, topic: &IbGibId, message: &PushMessage) -> usize {
    let handlers: Vec<PushHandler> = connections
        .iter()
        .filter(|c| &c.subscribed_id == topic)
        .map(|c| Arc::clone(&c.handler))
        .collect();
    for handler in &handlers {
        handler(message);
    }
    handlers.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{PushEvent, UpdateData};
    use ibgib_content::{rel8n, ContentSnapshot};
    use std::str::FromStr;
    use std::sync::Mutex as StdMutex;

    fn id(s: &str) -> IbGibId {
        IbGibId::from_str(s).unwrap()
    }

    #[derive(Default)]
    struct CountingTransport {
        joins: StdMutex<Vec<IbGibId>>,
        leaves: StdMutex<Vec<IbGibId>>,
        senders: StdMutex<HashMap<IbGibId, mpsc::Sender<PushMessage>>>,
        refuse: bool,
    }

    impl CountingTransport {
        fn sender(&self, topic: &IbGibId) -> mpsc::Sender<PushMessage> {
            self.senders.lock().unwrap()[topic].clone()
        }
    }

    #[async_trait::async_trait]
    impl ChannelTransport for CountingTransport {
        async fn join(&self, topic: &IbGibId) -> Result<mpsc::Receiver<PushMessage>, BusError> {
            if self.refuse {
                return Err(BusError::join_failed(topic.clone(), "refused"));
            }
            self.joins.lock().unwrap().push(topic.clone());
            let (tx, rx) = mpsc::channel(16);
            self.senders.lock().unwrap().insert(topic.clone(), tx);
            Ok(rx)
        }

        async fn leave(&self, topic: &IbGibId) -> Result<(), BusError> {
            self.leaves.lock().unwrap().push(topic.clone());
            Ok(())
        }
    }

    fn recorder() -> (PushHandler, Arc<StdMutex<Vec<PushMessage>>>) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: PushHandler = Arc::new(move |m: &PushMessage| sink.lock().unwrap().push(m.clone()));
        (handler, seen)
    }

    fn bus(transport: &Arc<CountingTransport>) -> EventBus {
        EventBus::new(
            Arc::clone(transport) as Arc<dyn ChannelTransport>,
            ContentCache::new(100),
        )
    }

    #[tokio::test]
    async fn one_channel_for_many_connections() {
        let transport = Arc::new(CountingTransport::default());
        let bus = bus(&transport);
        let topic = id("x^1");

        let mut cids = Vec::new();
        for n in 0..3 {
            let (handler, _) = recorder();
            let cid = bus
                .connect(Some(ConnectionId::from(format!("c{n}"))), topic.clone(), handler)
                .await
                .unwrap();
            cids.push(cid);
        }
        assert_eq!(transport.joins.lock().unwrap().len(), 1);
        assert_eq!(bus.connection_count(), 3);

        bus.disconnect(Some(&cids[0])).await;
        bus.disconnect(Some(&cids[1])).await;
        assert!(transport.leaves.lock().unwrap().is_empty());
        assert!(bus.is_channel_open(&topic).await);

        bus.disconnect(Some(&cids[2])).await;
        assert_eq!(transport.leaves.lock().unwrap().as_slice(), &[topic.clone()]);
        assert!(!bus.is_channel_open(&topic).await);
    }

    #[tokio::test]
    async fn duplicate_connect_keeps_first_handler() {
        let transport = Arc::new(CountingTransport::default());
        let bus = bus(&transport);
        let (first, first_seen) = recorder();
        let (second, second_seen) = recorder();

        let cid = ConnectionId::from("dup");
        bus.connect(Some(cid.clone()), id("x^1"), first).await.unwrap();
        let again = bus.connect(Some(cid.clone()), id("x^1"), second).await.unwrap();
        assert_eq!(again, cid);
        assert_eq!(bus.connection_count(), 1);

        bus.broadcast_local(id("x^1"), id("x^2")).await;
        assert_eq!(first_seen.lock().unwrap().len(), 1);
        assert!(second_seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn generated_connection_id() {
        let transport = Arc::new(CountingTransport::default());
        let bus = bus(&transport);
        let (handler, _) = recorder();

        let cid = bus.connect(None, id("x^1"), handler).await.unwrap();
        assert!(!cid.as_str().is_empty());
        assert_eq!(bus.connection(&cid).unwrap().subscribed_id, id("x^1"));
    }

    #[tokio::test]
    async fn join_failure_registers_nothing() {
        let transport = Arc::new(CountingTransport {
            refuse: true,
            ..CountingTransport::default()
        });
        let bus = bus(&transport);
        let (handler, _) = recorder();

        let result = bus.connect(None, id("x^1"), handler).await;
        assert!(matches!(result, Err(BusError::JoinFailed { .. })));
        assert_eq!(bus.connection_count(), 0);
        assert_eq!(bus.channel_count().await, 0);
    }

    #[tokio::test]
    async fn pushes_reach_subscribers_in_order() {
        let transport = Arc::new(CountingTransport::default());
        let bus = bus(&transport);
        let topic = id("x^1");

        let (tx_seen, mut rx_seen) = mpsc::unbounded_channel();
        let handler: PushHandler = Arc::new(move |m: &PushMessage| {
            let _ = tx_seen.send(m.clone());
        });
        let (other, other_seen) = recorder();
        bus.connect(None, topic.clone(), handler).await.unwrap();
        bus.connect(None, id("y^1"), other).await.unwrap();

        let sender = transport.sender(&topic);
        for n in 2..5 {
            sender
                .send(PushMessage::update(id("x^1"), id(&format!("x^{n}")), topic.clone()))
                .await
                .unwrap();
        }

        for n in 2..5 {
            let message = rx_seen.recv().await.unwrap();
            assert_eq!(
                message.event().unwrap(),
                PushEvent::Update(UpdateData {
                    old_id: id("x^1"),
                    new_id: id(&format!("x^{n}")),
                })
            );
        }
        assert!(other_seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn broadcast_local_uses_temporal_junction() {
        let transport = Arc::new(CountingTransport::default());
        let content = ContentCache::new(100);
        let bus = EventBus::new(
            Arc::clone(&transport) as Arc<dyn ChannelTransport>,
            content.clone(),
        );

        // old^1 sits in a timeline anchored at old^0
        content
            .put(
                ContentSnapshot::new("old")
                    .with_gib("1")
                    .with_relation(rel8n::PAST, vec![IbGibId::root(), id("old^0")]),
            )
            .await
            .unwrap();

        let (handler, seen) = recorder();
        bus.connect(None, id("old^0"), handler).await.unwrap();

        let reached = bus.broadcast_local(id("old^1"), id("new^2")).await;
        assert_eq!(reached, 1);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].data["old_id"], "old^1");
        assert_eq!(seen[0].data["new_id"], "new^2");
        assert_eq!(seen[0].metadata.temp_junction_id, Some(id("old^0")));

        // delivered locally, the transport only saw the original join
        assert_eq!(*transport.joins.lock().unwrap(), vec![id("old^0")]);
        assert!(transport.leaves.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn disconnect_all_leaves_every_channel() {
        let transport = Arc::new(CountingTransport::default());
        let bus = bus(&transport);
        for topic in ["a^1", "b^1"] {
            let (handler, _) = recorder();
            bus.connect(None, id(topic), handler).await.unwrap();
        }

        bus.disconnect(None).await;
        assert_eq!(bus.connection_count(), 0);
        assert_eq!(bus.channel_count().await, 0);
        assert_eq!(transport.leaves.lock().unwrap().len(), 2);
    }
}
