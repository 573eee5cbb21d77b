//! Background sync queue
//!
//! Accumulates identifiers and periodically asks the server about all of
//! them in one command:
//! - [`SyncKind::Refresh`]: `batch_refresh`, answered with `latest_ib_gibs`
//!   (`{id: latest}`), merged into the latest-pointer cache
//! - [`SyncKind::Adjuncts`]: `get_adjuncts`, answered with `adjunct_ib_gibs`
//!   (`{id: [adjunct ids]}`)
//!
//! Only one flush is in flight at a time; an overlapping flush is dropped,
//! not queued. Identifiers refreshed within the cooldown window are pruned
//! before sending.

use crate::config::SyncConfig;
use crate::error::SyncError;
use ibgib_bus::{CommandBus, CommandMessage};
use ibgib_cache::LatestCache;
use ibgib_content::IbGibId;
use indexmap::IndexSet;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// What a queue asks the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncKind {
    Refresh,
    Adjuncts,
}

impl SyncKind {
    /// Command-bus name
    #[inline]
    #[must_use]
    pub fn command_name(self) -> &'static str {
        match self {
            Self::Refresh => "batch_refresh",
            Self::Adjuncts => "get_adjuncts",
        }
    }

    #[inline]
    fn response_key(self) -> &'static str {
        match self {
            Self::Refresh => "latest_ib_gibs",
            Self::Adjuncts => "adjunct_ib_gibs",
        }
    }
}

/// Merged answer of one flush
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncResult {
    /// Timelines that advanced: id → latest
    pub latest: BTreeMap<IbGibId, IbGibId>,
    /// Pending adjuncts by target id
    pub adjuncts: BTreeMap<IbGibId, Vec<IbGibId>>,
}

impl SyncResult {
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.latest.is_empty() && self.adjuncts.is_empty()
    }
}

/// Result of [`SyncQueue::flush`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Request sent and answered
    Sent(SyncResult),
    /// Nothing left after pruning; no request, callback got an empty result
    Skipped(SyncResult),
    /// Another flush was in flight
    Dropped,
}

/// Receives flush results
pub type SyncCallback = Arc<dyn Fn(&SyncResult) + Send + Sync>;

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Batching queue for one [`SyncKind`]
pub struct SyncQueue {
    kind: SyncKind,
    bus: Arc<dyn CommandBus>,
    latest: LatestCache,
    pending: Mutex<IndexSet<IbGibId>>,
    in_flight: Mutex<HashSet<IbGibId>>,
    refreshed: Mutex<HashMap<IbGibId, Instant>>,
    busy: AtomicBool,
    callback: RwLock<Option<SyncCallback>>,
    cooldown: Duration,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl fmt::Debug for SyncQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncQueue")
            .field("kind", &self.kind)
            .field("pending", &self.pending_len())
            .field("busy", &self.is_busy())
            .field("cooldown", &self.cooldown)
            .finish_non_exhaustive()
    }
}

impl SyncQueue {
    /// Queue with default cooldown and callback retry
    #[must_use]
    pub fn new(kind: SyncKind, bus: Arc<dyn CommandBus>, latest: LatestCache) -> Self {
        Self::with_config(kind, bus, latest, &SyncConfig::default())
    }

    /// Queue configured from [`SyncConfig`]
    #[must_use]
    pub fn with_config(kind: SyncKind, bus: Arc<dyn CommandBus>, latest: LatestCache, config: &SyncConfig) -> Self {
        Self {
            kind,
            bus,
            latest,
            pending: Mutex::new(IndexSet::new()),
            in_flight: Mutex::new(HashSet::new()),
            refreshed: Mutex::new(HashMap::new()),
            busy: AtomicBool::new(false),
            callback: RwLock::new(None),
            cooldown: config.refresh_cooldown(),
            retry_attempts: config.callback_retry_attempts,
            retry_delay: config.callback_retry_delay(),
        }
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> SyncKind {
        self.kind
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    #[inline]
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Add identifiers not already queued or in flight
    ///
    /// Primitives never change and are ignored. Returns how many were added.
    pub fn enqueue(&self, ids: impl IntoIterator<Item = IbGibId>) -> usize {
        let in_flight = self.in_flight.lock().clone();
        let mut pending = self.pending.lock();
        let added = ids
            .into_iter()
            .filter(|id| !id.is_primitive() && !in_flight.contains(id))
            .filter(|id| pending.insert(id.clone()))
            .count();
        if added > 0 {
            tracing::trace!(kind = ?self.kind, added, pending = pending.len(), "ids queued");
        }
        added
    }

    /// Record that `id` is known to be current
    pub fn mark_refreshed(&self, id: &IbGibId) {
        self.refreshed.lock().insert(id.clone(), Instant::now());
    }

    /// Drop ids refreshed within the cooldown window
    #[must_use]
    pub fn prune_ids(&self, ids: Vec<IbGibId>) -> Vec<IbGibId> {
        let now = Instant::now();
        let mut refreshed = self.refreshed.lock();
        refreshed.retain(|_, at| now.duration_since(*at) < self.cooldown);

        let before = ids.len();
        let kept: Vec<IbGibId> = ids.into_iter().filter(|id| !refreshed.contains_key(id)).collect();
        if kept.len() < before {
            tracing::debug!(kind = ?self.kind, pruned = before - kept.len(), "recently refreshed ids pruned");
        }
        kept
    }

    /// Replace the result callback
    pub fn set_callback(&self, callback: SyncCallback) {
        *self.callback.write() = Some(callback);
    }

    pub fn clear_callback(&self) {
        *self.callback.write() = None;
    }

    /// Send everything pending as one request
    ///
    /// # Errors
    /// [`SyncError::Network`] if the command failed or
    /// [`SyncError::Validation`] if the answer is malformed; either way the
    /// ids are queued again
    pub async fn flush(&self) -> Result<FlushOutcome, SyncError> {
        if self.busy.swap(true, Ordering::AcqRel) {
            tracing::warn!(kind = ?self.kind, "flush already in flight, dropped");
            return Ok(FlushOutcome::Dropped);
        }
        let _guard = BusyGuard(&self.busy);

        let drained: Vec<IbGibId> = self.pending.lock().drain(..).collect();
        let ids = self.prune_ids(drained);
        if ids.is_empty() {
            let result = SyncResult::default();
            self.notify(&result).await;
            return Ok(FlushOutcome::Skipped(result));
        }

        self.in_flight.lock().extend(ids.iter().cloned());
        tracing::debug!(kind = ?self.kind, count = ids.len(), "flushing sync queue");
        let message = CommandMessage::new(self.kind.command_name(), json!({ "ib_gibs": ids }));
        let sent = self.bus.send(message).await;
        {
            let mut in_flight = self.in_flight.lock();
            for id in &ids {
                in_flight.remove(id);
            }
        }

        let response = match sent {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(kind = ?self.kind, error = %e, "sync request failed, ids requeued");
                self.pending.lock().extend(ids);
                return Err(e.into());
            }
        };
        let result = match self.parse(&response) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(kind = ?self.kind, error = %e, "malformed sync response, ids requeued");
                self.pending.lock().extend(ids);
                return Err(e);
            }
        };

        let now = Instant::now();
        {
            let mut refreshed = self.refreshed.lock();
            for id in &ids {
                refreshed.insert(id.clone(), now);
            }
        }
        for (old, new) in &result.latest {
            self.latest.set(old.clone(), new.clone()).await;
        }

        self.notify(&result).await;
        Ok(FlushOutcome::Sent(result))
    }

    fn parse(&self, response: &Value) -> Result<SyncResult, SyncError> {
        let key = self.kind.response_key();
        let entries = match response.get(key) {
            None | Some(Value::Null) => return Ok(SyncResult::default()),
            Some(Value::Object(entries)) => entries,
            Some(other) => {
                return Err(SyncError::Validation(format!("'{key}' is not an object: {other}")));
            }
        };

        let mut result = SyncResult::default();
        for (raw, value) in entries {
            let Ok(id) = raw.parse::<IbGibId>() else {
                tracing::warn!(kind = ?self.kind, key = %raw, "skipping malformed id in sync response");
                continue;
            };
            match self.kind {
                SyncKind::Refresh => {
                    let latest = value.as_str().and_then(|s| s.parse::<IbGibId>().ok());
                    match latest {
                        Some(latest) if latest != id => {
                            result.latest.insert(id, latest);
                        }
                        Some(_) => {}
                        None => tracing::warn!(id = %id, "skipping malformed latest id"),
                    }
                }
                SyncKind::Adjuncts => {
                    let adjuncts: Vec<IbGibId> = value
                        .as_array()
                        .into_iter()
                        .flatten()
                        .filter_map(|v| v.as_str().and_then(|s| s.parse().ok()))
                        .collect();
                    if !adjuncts.is_empty() {
                        result.adjuncts.insert(id, adjuncts);
                    }
                }
            }
        }
        Ok(result)
    }

    async fn notify(&self, result: &SyncResult) {
        for attempt in 0..=self.retry_attempts {
            let callback = self.callback.read().clone();
            if let Some(callback) = callback {
                callback(result);
                return;
            }
            if attempt < self.retry_attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }
        tracing::debug!(kind = ?self.kind, "no sync callback registered, result dropped");
    }

    /// Flush every `period` until the queue is dropped or the task aborted
    pub fn spawn_periodic(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let queue: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(queue) = queue.upgrade() else {
                    break;
                };
                match queue.flush().await {
                    Ok(outcome) => tracing::trace!(kind = ?queue.kind, ?outcome, "periodic flush"),
                    Err(e) => tracing::warn!(kind = ?queue.kind, error = %e, "periodic flush failed"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ibgib_bus::BusError;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::str::FromStr;
    use std::sync::atomic::AtomicUsize;

    fn id(s: &str) -> IbGibId {
        IbGibId::from_str(s).unwrap()
    }

    #[derive(Default)]
    struct ScriptedBus {
        replies: Mutex<VecDeque<Result<Value, String>>>,
        sent: Mutex<Vec<CommandMessage>>,
        delay: Option<Duration>,
    }

    impl ScriptedBus {
        fn replying(replies: Vec<Result<Value, String>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                ..Self::default()
            })
        }
    }

    #[async_trait::async_trait]
    impl CommandBus for ScriptedBus {
        async fn send(&self, message: CommandMessage) -> Result<Value, BusError> {
            self.sent.lock().push(message.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match self.replies.lock().pop_front() {
                Some(Ok(value)) => Ok(value),
                Some(Err(reason)) => Err(BusError::Transport(reason)),
                None => Ok(json!({})),
            }
        }
    }

    fn counting_callback(queue: &SyncQueue) -> (Arc<AtomicUsize>, Arc<Mutex<Vec<SyncResult>>>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let results = Arc::new(Mutex::new(Vec::new()));
        let (c, r) = (Arc::clone(&calls), Arc::clone(&results));
        queue.set_callback(Arc::new(move |result: &SyncResult| {
            c.fetch_add(1, Ordering::SeqCst);
            r.lock().push(result.clone());
        }));
        (calls, results)
    }

    #[test]
    fn enqueue_dedups_and_skips_primitives() {
        let queue = SyncQueue::new(SyncKind::Refresh, ScriptedBus::replying(vec![]), LatestCache::new());
        assert_eq!(queue.enqueue([id("x^1"), id("y^1"), id("x^1"), id("text^gib")]), 2);
        assert_eq!(queue.enqueue([id("y^1")]), 0);
        assert_eq!(queue.pending_len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn recently_refreshed_flush_is_skipped() {
        let bus = ScriptedBus::replying(vec![]);
        let config = SyncConfig::default().with_refresh_cooldown_ms(600_000);
        let queue = SyncQueue::with_config(SyncKind::Refresh, bus.clone(), LatestCache::new(), &config);
        let (calls, results) = counting_callback(&queue);

        queue.mark_refreshed(&id("x^1"));
        tokio::time::advance(Duration::from_millis(10)).await;
        queue.enqueue([id("x^1")]);

        assert_eq!(queue.flush().await.unwrap(), FlushOutcome::Skipped(SyncResult::default()));
        assert!(bus.sent.lock().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.lock()[0].is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_elapses() {
        let bus = ScriptedBus::replying(vec![]);
        let config = SyncConfig::default().with_refresh_cooldown_ms(100);
        let queue = SyncQueue::with_config(SyncKind::Refresh, bus.clone(), LatestCache::new(), &config);

        queue.mark_refreshed(&id("x^1"));
        tokio::time::advance(Duration::from_millis(150)).await;
        assert_eq!(queue.prune_ids(vec![id("x^1")]), vec![id("x^1")]);
    }

    #[tokio::test]
    async fn refresh_merges_into_latest_cache() {
        let bus = ScriptedBus::replying(vec![Ok(json!({
            "latest_ib_gibs": { "x^1": "x^2", "y^1": "y^1", "bad": "z^1" }
        }))]);
        let latest = LatestCache::new();
        let queue = SyncQueue::new(SyncKind::Refresh, bus.clone(), latest.clone());
        let (_, results) = counting_callback(&queue);

        queue.enqueue([id("x^1"), id("y^1")]);
        let outcome = queue.flush().await.unwrap();

        let expected = SyncResult {
            latest: BTreeMap::from([(id("x^1"), id("x^2"))]),
            ..SyncResult::default()
        };
        assert_eq!(outcome, FlushOutcome::Sent(expected.clone()));
        assert_eq!(latest.get(&id("x^1")).await, Some(id("x^2")));
        assert_eq!(results.lock().as_slice(), &[expected]);

        let sent = bus.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].name(), "batch_refresh");
        assert_eq!(sent[0].data, json!({ "ib_gibs": ["x^1", "y^1"] }));
        drop(sent);

        // Both ids were just refreshed
        queue.enqueue([id("x^1"), id("y^1")]);
        assert!(matches!(queue.flush().await.unwrap(), FlushOutcome::Skipped(_)));
    }

    #[tokio::test]
    async fn adjunct_results() {
        let bus = ScriptedBus::replying(vec![Ok(json!({
            "adjunct_ib_gibs": { "foo^abc": ["comment hi^1", ""], "bar^def": [] }
        }))]);
        let queue = SyncQueue::new(SyncKind::Adjuncts, bus.clone(), LatestCache::new());
        queue.enqueue([id("foo^abc"), id("bar^def")]);

        let FlushOutcome::Sent(result) = queue.flush().await.unwrap() else {
            panic!("expected a request");
        };
        assert_eq!(result.adjuncts, BTreeMap::from([(id("foo^abc"), vec![id("comment hi^1")])]));
        assert_eq!(bus.sent.lock()[0].name(), "get_adjuncts");
    }

    #[tokio::test]
    async fn failed_flush_requeues() {
        let bus = ScriptedBus::replying(vec![Err("socket closed".to_string())]);
        let queue = SyncQueue::new(SyncKind::Refresh, bus, LatestCache::new());
        queue.enqueue([id("x^1")]);

        let err = queue.flush().await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(queue.pending_len(), 1);
        assert!(!queue.is_busy());
    }

    #[tokio::test]
    async fn malformed_response_requeues() {
        let bus = ScriptedBus::replying(vec![
            Ok(json!({ "latest_ib_gibs": ["not", "an", "object"] })),
            Ok(json!({ "latest_ib_gibs": { "x^1": "x^2" } })),
        ]);
        let latest = LatestCache::new();
        let queue = SyncQueue::new(SyncKind::Refresh, bus.clone(), latest.clone());
        queue.enqueue([id("x^1")]);

        let err = queue.flush().await.unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
        assert!(!err.is_retryable());
        assert_eq!(queue.pending_len(), 1);

        assert!(matches!(queue.flush().await.unwrap(), FlushOutcome::Sent(_)));
        assert_eq!(bus.sent.lock().len(), 2);
        assert_eq!(latest.get(&id("x^1")).await, Some(id("x^2")));
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_flush_is_dropped() {
        let bus = Arc::new(ScriptedBus {
            delay: Some(Duration::from_millis(50)),
            ..ScriptedBus::default()
        });
        let queue = SyncQueue::new(SyncKind::Refresh, bus.clone(), LatestCache::new());
        queue.enqueue([id("x^1")]);

        let (first, second) = tokio::join!(queue.flush(), async {
            tokio::task::yield_now().await;
            queue.flush().await
        });
        assert!(matches!(first.unwrap(), FlushOutcome::Sent(_)));
        assert_eq!(second.unwrap(), FlushOutcome::Dropped);
        assert_eq!(bus.sent.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_ids_are_not_requeued() {
        let bus = Arc::new(ScriptedBus {
            delay: Some(Duration::from_millis(50)),
            ..ScriptedBus::default()
        });
        let queue = SyncQueue::new(SyncKind::Refresh, bus, LatestCache::new());
        queue.enqueue([id("x^1")]);

        let (_, added) = tokio::join!(queue.flush(), async {
            tokio::task::yield_now().await;
            queue.enqueue([id("x^1"), id("y^1")])
        });
        assert_eq!(added, 1);
        assert_eq!(queue.pending_len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn callback_set_mid_flight_is_used() {
        let bus = Arc::new(ScriptedBus {
            delay: Some(Duration::from_millis(50)),
            ..ScriptedBus::default()
        });
        let queue = SyncQueue::new(SyncKind::Refresh, bus, LatestCache::new());
        queue.enqueue([id("x^1")]);

        let (outcome, calls) = tokio::join!(queue.flush(), async {
            tokio::time::sleep(Duration::from_millis(60)).await;
            counting_callback(&queue).0
        });
        assert!(matches!(outcome.unwrap(), FlushOutcome::Sent(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_flush() {
        let bus = ScriptedBus::replying(vec![]);
        let queue = Arc::new(SyncQueue::new(SyncKind::Refresh, bus.clone(), LatestCache::new()));
        let handle = queue.spawn_periodic(Duration::from_millis(100));

        queue.enqueue([id("x^1")]);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(bus.sent.lock().len(), 1);

        handle.abort();
    }
}
