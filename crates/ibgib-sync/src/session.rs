//! Sync session
//!
//! Composition root. Owns the caches, the event bus, the root graph view
//! with its lifecycle, command dispatch and both sync queues, and runs one
//! inbox task applying pushes to the graph.
//!
//! Pushes reach the inbox from three places: channel subscriptions, local
//! broadcasts after a command mutated a timeline, and sync queue results.
//!
//! A second task watches the view for removed nodes and leaves the channel of
//! any timeline no real node shows any more.

use crate::commands::CommandRegistry;
use crate::config::SyncConfig;
use crate::dispatch::CommandDispatch;
use crate::error::SyncError;
use crate::fetch::ContentFetcher;
use crate::queue::{SyncKind, SyncQueue, SyncResult};
use crate::resolver::{ContentResolver, GraphResolver};
use ibgib_bus::{
    AdjunctsData, ChannelTransport, CommandBus, ConnectionId, EventBus, NewAdjunctData, PushEvent, PushHandler,
    PushMessage, UpdateData,
};
use ibgib_cache::{AdjunctCache, AdjunctInfo, CacheError, ContentCache, FileStore, KeyValueStore, LatestCache};
use ibgib_content::{rel8n, ContentSnapshot, GibHasher, IbGibId};
use ibgib_graph::{GraphEvent, GraphView, NodeId, NodeLifecycle, VirtualSpec};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Connections to the outside world
#[derive(Clone)]
pub struct Services {
    pub command_bus: Arc<dyn CommandBus>,
    pub transport: Arc<dyn ChannelTransport>,
    pub fetcher: Arc<dyn ContentFetcher>,
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}

/// One client session over a graph
pub struct SyncSession {
    config: SyncConfig,
    content: ContentCache,
    latest: LatestCache,
    adjuncts: AdjunctCache,
    resolver: ContentResolver,
    events: Arc<EventBus>,
    lifecycle: NodeLifecycle,
    dispatch: Arc<CommandDispatch>,
    refresh: Arc<SyncQueue>,
    adjunct_queue: Arc<SyncQueue>,
    inbox: mpsc::UnboundedSender<PushMessage>,
    subscriptions: tokio::sync::Mutex<HashMap<IbGibId, ConnectionId>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for SyncSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncSession")
            .field("nodes", &self.lifecycle.view().node_count())
            .field("events", &self.events)
            .field("refresh", &self.refresh)
            .field("adjuncts", &self.adjunct_queue)
            .finish_non_exhaustive()
    }
}

impl SyncSession {
    /// Wire up a session and start its background tasks
    ///
    /// # Errors
    /// [`SyncError::Cache`] if the persistence directory cannot be opened
    pub async fn start(config: SyncConfig, services: Services) -> Result<Arc<Self>, SyncError> {
        let (content, latest) = match &config.persist_dir {
            Some(dir) => {
                let store: Arc<dyn KeyValueStore> =
                    Arc::new(FileStore::open(dir.clone()).await.map_err(CacheError::from)?);
                tracing::info!(dir = %dir.display(), "persisting caches");
                (
                    ContentCache::with_store(config.content_cache_capacity, Arc::clone(&store)),
                    LatestCache::with_store(store),
                )
            }
            None => (ContentCache::new(config.content_cache_capacity), LatestCache::new()),
        };
        let adjuncts = AdjunctCache::new();

        let resolver = ContentResolver::new(
            content.clone(),
            services.fetcher,
            GibHasher::with_salt(config.hash_salt.clone()),
        );
        let registry = Arc::new(CommandRegistry::builtin());
        let graph_resolver = Arc::new(GraphResolver::new(
            resolver.clone(),
            Arc::clone(&registry),
            config.virtual_expiry(),
        ));
        let lifecycle = NodeLifecycle::with_affordances(
            GraphView::new(),
            Arc::clone(&graph_resolver) as _,
            config.show_affordances,
        );
        let events = Arc::new(EventBus::new(services.transport, content.clone()));
        let dispatch = Arc::new(CommandDispatch::new(
            registry,
            Arc::clone(&services.command_bus),
            lifecycle.clone(),
            latest.clone(),
            adjuncts.clone(),
            Arc::clone(&events),
        ));
        graph_resolver.bind_dispatch(&dispatch);

        let refresh = Arc::new(SyncQueue::with_config(
            SyncKind::Refresh,
            Arc::clone(&services.command_bus),
            latest.clone(),
            &config,
        ));
        let adjunct_queue = Arc::new(SyncQueue::with_config(
            SyncKind::Adjuncts,
            services.command_bus,
            latest.clone(),
            &config,
        ));

        let (inbox, rx) = mpsc::unbounded_channel();
        refresh.set_callback(queue_forwarder(inbox.clone()));
        adjunct_queue.set_callback(queue_forwarder(inbox.clone()));

        let session = Arc::new(Self {
            config,
            content,
            latest,
            adjuncts,
            resolver,
            events,
            lifecycle,
            dispatch,
            refresh,
            adjunct_queue,
            inbox,
            subscriptions: tokio::sync::Mutex::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
        });

        let period = session.config.flush_interval();
        let tasks = vec![
            spawn_inbox(Arc::downgrade(&session), rx),
            spawn_release(Arc::downgrade(&session), session.view().subscribe()),
            session.refresh.spawn_periodic(period),
            session.adjunct_queue.spawn_periodic(period),
        ];
        session.tasks.lock().extend(tasks);
        tracing::info!(base = %session.config.base_json_path, "sync session started");
        Ok(session)
    }

    /// Show content in the graph and keep it live
    ///
    /// Opens the latest known snapshot of the timeline, subscribes to its
    /// temporal junction and queues it for refresh and adjunct checks. If the
    /// content is already shown, the existing node is returned.
    ///
    /// # Errors
    /// [`SyncError::Fetch`] if the content cannot be resolved, or
    /// [`SyncError::Graph`]
    pub async fn open(&self, id: &IbGibId) -> Result<NodeId, SyncError> {
        let id = self.latest.latest_or_self(id).await;
        let view = self.lifecycle.view();
        let shown = view.read(|data| {
            data.find_by_content(&id)
                .into_iter()
                .find(|node| data.node(*node).is_some_and(|n| n.is_real()))
        });
        if let Some(node) = shown {
            tracing::debug!(id = %id, node = %node, "content already open");
            return Ok(node);
        }

        let snapshot = self.resolver.resolve(&id).await?;
        let node = self
            .lifecycle
            .add_virtual(VirtualSpec::content(id.clone()).auto_confirm())
            .await?;

        if let Err(e) = self.subscribe(&snapshot).await {
            tracing::warn!(id = %id, error = %e, "content open without live updates");
        }
        self.refresh.enqueue([id.clone()]);
        self.adjunct_queue.enqueue([id.clone()]);
        tracing::info!(id = %id, node = %node, "content opened");
        Ok(node)
    }

    async fn subscribe(&self, snapshot: &ContentSnapshot) -> Result<(), SyncError> {
        if snapshot.is_root() {
            return Ok(());
        }
        let topic = snapshot.temporal_junction();
        let mut subscriptions = self.subscriptions.lock().await;
        if subscriptions.contains_key(&topic) {
            return Ok(());
        }

        let inbox = self.inbox.clone();
        let handler: PushHandler = Arc::new(move |message: &PushMessage| {
            if inbox.send(message.clone()).is_err() {
                tracing::trace!("session inbox closed");
            }
        });
        let connection_id = self.events.connect(None, topic.clone(), handler).await?;
        subscriptions.insert(topic, connection_id);
        Ok(())
    }

    /// Leave the channels of timelines no real node shows
    ///
    /// Returns how many subscriptions were released.
    pub async fn release_unshown(&self) -> usize {
        let shown: HashSet<IbGibId> = self.lifecycle.view().read(|data| {
            data.nodes()
                .filter(|node| node.is_real())
                .filter_map(|node| node.snapshot.as_ref())
                .map(|snapshot| snapshot.temporal_junction())
                .collect()
        });
        let released: Vec<(IbGibId, ConnectionId)> = {
            let mut subscriptions = self.subscriptions.lock().await;
            let stale: Vec<IbGibId> = subscriptions
                .keys()
                .filter(|topic| !shown.contains(*topic))
                .cloned()
                .collect();
            stale
                .into_iter()
                .filter_map(|topic| subscriptions.remove(&topic).map(|cid| (topic, cid)))
                .collect()
        };
        for (topic, connection_id) in &released {
            self.events.disconnect(Some(connection_id)).await;
            tracing::debug!(topic = %topic, "timeline no longer shown, unsubscribed");
        }
        released.len()
    }

    /// Apply one push message
    ///
    /// Malformed messages are logged and ignored.
    pub async fn handle_push(&self, message: &PushMessage) {
        match message.event() {
            Ok(PushEvent::Update(UpdateData { old_id, new_id })) => self.apply_update(old_id, new_id).await,
            Ok(PushEvent::Adjuncts(AdjunctsData { adjunct_ids })) => {
                for (target, ids) in adjunct_ids {
                    for adjunct in ids {
                        self.ingest_adjunct(&adjunct, Some(&target)).await;
                    }
                }
            }
            Ok(PushEvent::NewAdjunct(NewAdjunctData { adjunct_ib_gib })) => {
                self.ingest_adjunct(&adjunct_ib_gib, None).await;
            }
            Err(e) => tracing::warn!(name = message.name(), error = %e, "ignoring push message"),
        }
    }

    async fn apply_update(&self, old_id: IbGibId, new_id: IbGibId) {
        if old_id == new_id {
            return;
        }
        self.latest.set(old_id.clone(), new_id.clone()).await;
        self.refresh.mark_refreshed(&old_id);
        self.refresh.mark_refreshed(&new_id);

        let view = self.lifecycle.view();
        let showing: Vec<NodeId> = view.read(|data| {
            data.find_by_content(&old_id)
                .into_iter()
                .filter(|node| data.node(*node).is_some_and(|n| n.is_real()))
                .collect()
        });
        if showing.is_empty() {
            tracing::trace!(old = %old_id, "update for content not shown");
            return;
        }

        let snapshot = match self.resolver.resolve(&new_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(old = %old_id, new = %new_id, error = %e, "update not applied");
                return;
            }
        };
        for node in showing {
            let Some(mut repointed) = view.node(node) else {
                continue;
            };
            repointed.content_ref = Some(new_id.clone());
            repointed.snapshot = Some(Arc::clone(&snapshot));
            if let Err(e) = view.replace(repointed, true) {
                tracing::debug!(node = %node, error = %e, "node gone before update");
            }
        }
        tracing::info!(old = %old_id, new = %new_id, "timeline advanced");

        if let Err(e) = self.subscribe(&snapshot).await {
            tracing::warn!(id = %new_id, error = %e, "no live updates for new snapshot");
        }
        self.adjunct_queue.enqueue([new_id]);
    }

    async fn ingest_adjunct(&self, adjunct_id: &IbGibId, target_hint: Option<&IbGibId>) {
        let snapshot = match self.resolver.resolve(adjunct_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(adjunct = %adjunct_id, error = %e, "adjunct not resolved");
                return;
            }
        };
        let target = snapshot
            .relation(rel8n::ADJUNCT_TO)
            .first()
            .or(target_hint)
            .cloned();
        let Some(target) = target else {
            tracing::warn!(adjunct = %adjunct_id, "adjunct has no target");
            return;
        };
        let target_timeline = self
            .content
            .temporal_junction(&target)
            .await
            .unwrap_or(target);

        let info = AdjunctInfo {
            adjunct_id: adjunct_id.clone(),
            target_timeline_id: target_timeline.clone(),
            adjunct_timeline_id: snapshot.temporal_junction(),
            adjunct_snapshot: snapshot.as_ref().clone(),
            adjunct_relation_name: rel8n::ADJUNCT_TO.to_string(),
            target_relation_name: snapshot.category().relation_name().to_string(),
        };
        if self.adjuncts.add(target_timeline.clone(), info) {
            tracing::info!(adjunct = %adjunct_id, target = %target_timeline, "pending adjunct recorded");
        }
    }

    /// Flush both queues now
    ///
    /// # Errors
    /// The first queue error
    pub async fn sync_now(&self) -> Result<(), SyncError> {
        self.refresh.flush().await?;
        self.adjunct_queue.flush().await?;
        Ok(())
    }

    /// Leave every channel and stop background tasks
    pub async fn shutdown(&self) {
        self.events.disconnect(None).await;
        self.subscriptions.lock().await.clear();
        self.refresh.clear_callback();
        self.adjunct_queue.clear_callback();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        tracing::info!("sync session stopped");
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn view(&self) -> &GraphView {
        self.lifecycle.view()
    }

    #[inline]
    #[must_use]
    pub fn lifecycle(&self) -> &NodeLifecycle {
        &self.lifecycle
    }

    #[inline]
    #[must_use]
    pub fn dispatch(&self) -> &Arc<CommandDispatch> {
        &self.dispatch
    }

    #[inline]
    #[must_use]
    pub fn resolver(&self) -> &ContentResolver {
        &self.resolver
    }

    #[inline]
    #[must_use]
    pub fn content(&self) -> &ContentCache {
        &self.content
    }

    #[inline]
    #[must_use]
    pub fn latest(&self) -> &LatestCache {
        &self.latest
    }

    #[inline]
    #[must_use]
    pub fn adjuncts(&self) -> &AdjunctCache {
        &self.adjuncts
    }

    #[inline]
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    #[inline]
    #[must_use]
    pub fn refresh_queue(&self) -> &SyncQueue {
        &self.refresh
    }

    #[inline]
    #[must_use]
    pub fn adjunct_queue(&self) -> &SyncQueue {
        &self.adjunct_queue
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

/// Turn queue results into push messages for the inbox
fn queue_forwarder(inbox: mpsc::UnboundedSender<PushMessage>) -> crate::queue::SyncCallback {
    Arc::new(move |result: &SyncResult| {
        let mut messages: Vec<PushMessage> = result
            .latest
            .iter()
            .map(|(old, new)| PushMessage::update(old.clone(), new.clone(), old.clone()))
            .collect();
        if !result.adjuncts.is_empty() {
            messages.push(PushMessage::adjuncts(result.adjuncts.clone()));
        }
        for message in messages {
            if inbox.send(message).is_err() {
                tracing::trace!("session inbox closed");
                return;
            }
        }
    })
}

fn spawn_inbox(session: Weak<SyncSession>, mut rx: mpsc::UnboundedReceiver<PushMessage>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let Some(session) = session.upgrade() else {
                break;
            };
            session.handle_push(&message).await;
        }
        tracing::debug!("session inbox stopped");
    })
}

fn spawn_release(session: Weak<SyncSession>, mut rx: broadcast::Receiver<GraphEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(GraphEvent::Removed { .. }) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
            let Some(session) = session.upgrade() else {
                break;
            };
            session.release_unshown().await;
        }
    })
}
