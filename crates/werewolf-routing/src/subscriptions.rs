//! Subscription bookkeeping for one client.
//!
//! [`SubscriptionManager`] is the only owner of the client's subscription
//! records. A pattern is subscribed at most once no matter how many times,
//! or from how many tasks, it is requested.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use futures_util::future::join_all;
use tokio::sync::Mutex;
use werewolf_protocol::TopicPattern;
use werewolf_session::{SessionError, SessionGateway, SubscriptionRecord};
use werewolf_transport::{EventSink, SubscriptionId, Transport};

/// Subscription ids as the dispatcher sees them.
///
/// `retired` only grows: an id is never handed out twice by one session.
#[derive(Default)]
struct IdIndex {
    active: HashSet<SubscriptionId>,
    retired: HashSet<SubscriptionId>,
}

/// Ensures the client is subscribed to the right patterns, exactly once.
///
/// Writers (`ensure_*`, `teardown*`) serialize on the record map, which is
/// held across the subscribe round-trip so two concurrent calls for the
/// same pattern cannot both go to the router. The dispatcher never touches
/// that lock: it reads the id index through [`is_retired`], which is only
/// locked for the duration of a set lookup.
///
/// [`is_retired`]: SubscriptionManager::is_retired
pub struct SubscriptionManager<T: Transport> {
    gateway: Arc<SessionGateway<T>>,
    sink: EventSink,
    records: Mutex<HashMap<TopicPattern, SubscriptionRecord>>,
    ids: RwLock<IdIndex>,
}

impl<T: Transport> SubscriptionManager<T> {
    /// Creates an empty manager. Every subscription it makes delivers into
    /// `sink`.
    pub fn new(gateway: Arc<SessionGateway<T>>, sink: EventSink) -> Self {
        Self {
            gateway,
            sink,
            records: Mutex::new(HashMap::new()),
            ids: RwLock::new(IdIndex::default()),
        }
    }

    /// Subscribes the five game-level patterns of `game` for `player`.
    ///
    /// Returns how many patterns were newly subscribed; already-held ones
    /// are skipped without touching the network.
    ///
    /// # Errors
    /// The first [`SessionError::Subscription`] encountered. The other
    /// patterns are still attempted, and every success is recorded.
    pub async fn ensure_game_subscriptions(
        &self,
        game: &str,
        player: &str,
    ) -> Result<usize, SessionError> {
        self.ensure(&TopicPattern::game_set(game, player)).await
    }

    /// Subscribes the role-level patterns of `role` in `game`.
    ///
    /// Same contract as [`ensure_game_subscriptions`](Self::ensure_game_subscriptions).
    pub async fn ensure_role_subscriptions(
        &self,
        game: &str,
        role: &str,
    ) -> Result<usize, SessionError> {
        self.ensure(&TopicPattern::role_set(game, role)).await
    }

    async fn ensure(&self, patterns: &[TopicPattern]) -> Result<usize, SessionError> {
        let mut records = self.records.lock().await;
        let mut added = 0;
        let mut first_error = None;

        for pattern in patterns {
            if records.contains_key(pattern) {
                tracing::trace!(%pattern, "already subscribed");
                continue;
            }
            match self.gateway.subscribe(pattern, self.sink.clone()).await {
                Ok(record) => {
                    self.index().active.insert(record.id);
                    records.insert(record.pattern.clone(), record);
                    added += 1;
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(added),
        }
    }

    /// Releases every record under `game`, returning how many were dropped.
    ///
    /// Records are forgotten even if the router refuses the unsubscribe
    /// (typically because the session is already closed); deliveries for
    /// them are discarded by the dispatcher from then on.
    pub async fn teardown(&self, game: &str) -> usize {
        let released = self.forget(|pattern| pattern.belongs_to(game)).await;
        tracing::debug!(%game, count = released.len(), "tearing down game subscriptions");
        self.release(released).await
    }

    /// Releases every record the manager holds.
    pub async fn teardown_all(&self) -> usize {
        let released = self.forget(|_| true).await;
        self.release(released).await
    }

    async fn forget(&self, doomed: impl Fn(&TopicPattern) -> bool) -> Vec<SubscriptionRecord> {
        let mut records = self.records.lock().await;
        let patterns: Vec<TopicPattern> = records.keys().filter(|p| doomed(p)).cloned().collect();

        let mut removed = Vec::with_capacity(patterns.len());
        let mut index = self.index();
        for pattern in patterns {
            if let Some(record) = records.remove(&pattern) {
                index.active.remove(&record.id);
                index.retired.insert(record.id);
                removed.push(record);
            }
        }
        removed
    }

    async fn release(&self, records: Vec<SubscriptionRecord>) -> usize {
        let count = records.len();
        let results = join_all(records.iter().map(|record| self.gateway.unsubscribe(record))).await;

        for (record, result) in records.iter().zip(results) {
            if let Err(e) = result {
                tracing::debug!(pattern = %record.pattern, error = %e, "unsubscribe failed");
            }
        }
        count
    }

    fn index(&self) -> std::sync::RwLockWriteGuard<'_, IdIndex> {
        self.ids.write().expect("subscription index lock poisoned")
    }

    /// Returns `true` if `id` belongs to a record this manager still holds.
    pub fn is_active(&self, id: SubscriptionId) -> bool {
        self.ids
            .read()
            .expect("subscription index lock poisoned")
            .active
            .contains(&id)
    }

    /// Returns `true` if `id` belonged to a record that has been torn down.
    ///
    /// An id the manager has not seen yet is not retired: its subscribe ack
    /// may still be on the way while its first events already arrive.
    pub fn is_retired(&self, id: SubscriptionId) -> bool {
        self.ids
            .read()
            .expect("subscription index lock poisoned")
            .retired
            .contains(&id)
    }

    /// Returns `true` if `pattern` is currently subscribed.
    pub async fn contains(&self, pattern: &TopicPattern) -> bool {
        self.records.lock().await.contains_key(pattern)
    }

    /// Snapshot of every held pattern.
    pub async fn active_patterns(&self) -> Vec<TopicPattern> {
        self.records.lock().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
