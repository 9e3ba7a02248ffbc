//! In-process router: procedures and subscriptions live in one shared map.
//!
//! [`LocalRouter`] plays the part of the real broker for tests and demos.
//! Server-side code registers procedures and publishes through the router
//! handle; clients talk to it through [`LocalConnection`]s.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::{
    Connection, Delivery, EventSink, InboundEvent, Kwargs, MatchPolicy,
    SubscriptionId, Transport, TransportError,
};

/// What a registered procedure returns: a result value or a rejection reason.
pub type ProcedureResult = Result<Value, String>;

type Procedure = Arc<dyn Fn(Vec<Value>) -> ProcedureResult + Send + Sync>;

struct RouterSubscription {
    id: SubscriptionId,
    connection: u64,
    uri: String,
    policy: MatchPolicy,
    sink: EventSink,
}

struct RouterInner {
    realm: String,
    procedures: Mutex<HashMap<String, Procedure>>,
    /// Kept in subscribe order so fan-out order is stable.
    subscriptions: Mutex<Vec<RouterSubscription>>,
    /// Open flag of every live connection, keyed by connection number.
    connections: Mutex<HashMap<u64, Arc<AtomicBool>>>,
    denied_topics: Mutex<HashSet<String>>,
    next_subscription: AtomicU64,
    next_connection: AtomicU64,
}

/// A shared in-process router. Cheap to clone.
#[derive(Clone)]
pub struct LocalRouter {
    inner: Arc<RouterInner>,
}

impl LocalRouter {
    /// Creates a router serving a single realm.
    pub fn new(realm: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                realm: realm.into(),
                procedures: Mutex::new(HashMap::new()),
                subscriptions: Mutex::new(Vec::new()),
                connections: Mutex::new(HashMap::new()),
                denied_topics: Mutex::new(HashSet::new()),
                next_subscription: AtomicU64::new(1),
                next_connection: AtomicU64::new(1),
            }),
        }
    }

    /// Returns the realm this router serves.
    pub fn realm(&self) -> &str {
        &self.inner.realm
    }

    /// Registers (or replaces) the handler behind a procedure URI.
    pub fn register<F>(&self, procedure: impl Into<String>, handler: F)
    where
        F: Fn(Vec<Value>) -> ProcedureResult + Send + Sync + 'static,
    {
        let procedure = procedure.into();
        tracing::debug!(%procedure, "procedure registered");
        self.inner
            .procedures
            .lock()
            .expect("router lock poisoned")
            .insert(procedure, Arc::new(handler));
    }

    /// Makes every later subscribe on exactly `uri` fail.
    pub fn deny_subscriptions(&self, uri: impl Into<String>) {
        self.inner
            .denied_topics
            .lock()
            .expect("router lock poisoned")
            .insert(uri.into());
    }

    /// Publishes an event to every matching subscription.
    ///
    /// Returns the number of subscriptions the event was delivered to.
    pub fn publish(&self, topic: &str, args: Vec<Value>, kwargs: Kwargs) -> usize {
        let mut subscriptions = self
            .inner
            .subscriptions
            .lock()
            .expect("router lock poisoned");

        let mut delivered = 0;
        subscriptions.retain(|sub| {
            if !sub.policy.matches(&sub.uri, topic) {
                return true;
            }
            let delivery = Delivery {
                subscription: sub.id,
                event: InboundEvent {
                    topic: topic.to_string(),
                    args: args.clone(),
                    kwargs: kwargs.clone(),
                },
            };
            if sub.sink.send(delivery).is_err() {
                tracing::trace!(id = %sub.id, "subscriber gone, dropping subscription");
                return false;
            }
            delivered += 1;
            true
        });

        tracing::trace!(%topic, delivered, "event published");
        delivered
    }

    /// Drops every open connection as if the network went away.
    pub fn disconnect_all(&self) {
        let connections: Vec<_> = self
            .inner
            .connections
            .lock()
            .expect("router lock poisoned")
            .drain()
            .collect();
        for (_, open) in &connections {
            open.store(false, Ordering::Release);
        }
        self.inner
            .subscriptions
            .lock()
            .expect("router lock poisoned")
            .clear();
        tracing::info!(count = connections.len(), "all connections dropped");
    }

    /// Returns the number of live subscriptions across all connections.
    pub fn subscription_count(&self) -> usize {
        self.inner
            .subscriptions
            .lock()
            .expect("router lock poisoned")
            .len()
    }

    /// Returns the URIs currently subscribed, in subscribe order.
    pub fn subscribed_uris(&self) -> Vec<String> {
        self.inner
            .subscriptions
            .lock()
            .expect("router lock poisoned")
            .iter()
            .map(|sub| sub.uri.clone())
            .collect()
    }

    fn procedure(&self, uri: &str) -> Option<Procedure> {
        self.inner
            .procedures
            .lock()
            .expect("router lock poisoned")
            .get(uri)
            .cloned()
    }

    fn drop_connection(&self, connection: u64) {
        self.inner
            .connections
            .lock()
            .expect("router lock poisoned")
            .remove(&connection);
        self.inner
            .subscriptions
            .lock()
            .expect("router lock poisoned")
            .retain(|sub| sub.connection != connection);
    }
}

impl Transport for LocalRouter {
    type Connection = LocalConnection;

    async fn connect(
        &self,
        url: &str,
        realm: &str,
    ) -> Result<Self::Connection, TransportError> {
        if realm != self.inner.realm {
            return Err(TransportError::ConnectFailed(format!(
                "no such realm: {realm}"
            )));
        }

        let number = self.inner.next_connection.fetch_add(1, Ordering::Relaxed);
        let open = Arc::new(AtomicBool::new(true));
        self.inner
            .connections
            .lock()
            .expect("router lock poisoned")
            .insert(number, Arc::clone(&open));

        tracing::debug!(connection = number, %url, %realm, "local session opened");
        Ok(LocalConnection {
            number,
            open,
            router: self.clone(),
        })
    }
}

/// A client session on a [`LocalRouter`].
pub struct LocalConnection {
    number: u64,
    open: Arc<AtomicBool>,
    router: LocalRouter,
}

impl LocalConnection {
    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(TransportError::ConnectionClosed)
        }
    }
}

impl Connection for LocalConnection {
    async fn call(
        &self,
        procedure: &str,
        args: Vec<Value>,
    ) -> Result<Value, TransportError> {
        self.ensure_open()?;
        let handler = self
            .router
            .procedure(procedure)
            .ok_or_else(|| TransportError::NoSuchProcedure(procedure.to_string()))?;

        // The handler runs without any router lock held, so it may publish.
        handler(args).map_err(|reason| TransportError::Rejected {
            uri: procedure.to_string(),
            reason,
        })
    }

    async fn subscribe(
        &self,
        topic: &str,
        policy: MatchPolicy,
        sink: EventSink,
    ) -> Result<SubscriptionId, TransportError> {
        self.ensure_open()?;
        let denied = self
            .router
            .inner
            .denied_topics
            .lock()
            .expect("router lock poisoned")
            .contains(topic);
        if denied {
            return Err(TransportError::Rejected {
                uri: topic.to_string(),
                reason: "not authorized".into(),
            });
        }

        let id = SubscriptionId::new(
            self.router
                .inner
                .next_subscription
                .fetch_add(1, Ordering::Relaxed),
        );
        self.router
            .inner
            .subscriptions
            .lock()
            .expect("router lock poisoned")
            .push(RouterSubscription {
                id,
                connection: self.number,
                uri: topic.to_string(),
                policy,
                sink,
            });
        Ok(id)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), TransportError> {
        self.ensure_open()?;
        let mut subscriptions = self
            .router
            .inner
            .subscriptions
            .lock()
            .expect("router lock poisoned");
        let before = subscriptions.len();
        subscriptions.retain(|sub| !(sub.id == id && sub.connection == self.number));
        if subscriptions.len() == before {
            return Err(TransportError::UnknownSubscription(id));
        }
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        args: Vec<Value>,
        kwargs: Kwargs,
    ) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.router.publish(topic, args, kwargs);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.open.swap(false, Ordering::AcqRel) {
            self.router.drop_connection(self.number);
            tracing::debug!(connection = self.number, "local session closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;

    #[tokio::test]
    async fn test_connect_to_wrong_realm_fails() {
        let router = LocalRouter::new("realm1");
        let result = router.connect("local://", "other").await;
        assert!(matches!(result, Err(TransportError::ConnectFailed(_))));
    }

    #[tokio::test]
    async fn test_call_reaches_registered_procedure() {
        let router = LocalRouter::new("realm1");
        router.register("com.werewolf.echo", |args| Ok(Value::Array(args)));
        let conn = router.connect("local://", "realm1").await.unwrap();

        let result = conn.call("com.werewolf.echo", vec![json!("a")]).await.unwrap();
        assert_eq!(result, json!(["a"]));
    }

    #[tokio::test]
    async fn test_call_rejection_carries_reason() {
        let router = LocalRouter::new("realm1");
        router.register("com.werewolf.join_game", |_| Err("no such game".into()));
        let conn = router.connect("local://", "realm1").await.unwrap();

        let err = conn.call("com.werewolf.join_game", vec![]).await.unwrap_err();
        assert_eq!(
            err,
            TransportError::Rejected {
                uri: "com.werewolf.join_game".into(),
                reason: "no such game".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_call_unknown_procedure() {
        let router = LocalRouter::new("realm1");
        let conn = router.connect("local://", "realm1").await.unwrap();
        let err = conn.call("com.werewolf.nope", vec![]).await.unwrap_err();
        assert!(matches!(err, TransportError::NoSuchProcedure(_)));
    }

    #[tokio::test]
    async fn test_publish_preserves_order_per_subscription() {
        let router = LocalRouter::new("realm1");
        let conn = router.connect("local://", "realm1").await.unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        conn.subscribe("com.werewolf.g1", MatchPolicy::Prefix, tx)
            .await
            .unwrap();

        for i in 0..5 {
            router.publish("com.werewolf.g1.add_player", vec![json!(i)], Kwargs::new());
        }

        for i in 0..5 {
            let delivery = rx.recv().await.unwrap();
            assert_eq!(delivery.event.args, vec![json!(i)]);
        }
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let router = LocalRouter::new("realm1");
        let conn = router.connect("local://", "realm1").await.unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = conn
            .subscribe("com.werewolf.g1.add_player", MatchPolicy::Exact, tx)
            .await
            .unwrap();

        conn.unsubscribe(id).await.unwrap();
        assert_eq!(router.publish("com.werewolf.g1.add_player", vec![], Kwargs::new()), 0);
        assert!(rx.try_recv().is_err());

        let again = conn.unsubscribe(id).await.unwrap_err();
        assert_eq!(again, TransportError::UnknownSubscription(id));
    }

    #[tokio::test]
    async fn test_denied_subscription_is_rejected() {
        let router = LocalRouter::new("realm1");
        router.deny_subscriptions("com.werewolf.g1.add_player");
        let conn = router.connect("local://", "realm1").await.unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = conn
            .subscribe("com.werewolf.g1.add_player", MatchPolicy::Exact, tx)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Rejected { .. }));
        assert_eq!(router.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_all_closes_connections() {
        let router = LocalRouter::new("realm1");
        let conn = router.connect("local://", "realm1").await.unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        conn.subscribe("com.werewolf", MatchPolicy::Prefix, tx).await.unwrap();

        router.disconnect_all();

        assert!(!conn.is_open());
        assert_eq!(router.subscription_count(), 0);
        let err = conn.call("com.werewolf.start_game", vec![]).await.unwrap_err();
        assert_eq!(err, TransportError::ConnectionClosed);
    }

    #[tokio::test]
    async fn test_close_removes_own_subscriptions_only() {
        let router = LocalRouter::new("realm1");
        let a = router.connect("local://", "realm1").await.unwrap();
        let b = router.connect("local://", "realm1").await.unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        a.subscribe("com.werewolf.a", MatchPolicy::Exact, tx.clone()).await.unwrap();
        b.subscribe("com.werewolf.b", MatchPolicy::Exact, tx).await.unwrap();

        a.close().await.unwrap();

        assert!(!a.is_open());
        assert!(b.is_open());
        assert_eq!(router.subscribed_uris(), vec!["com.werewolf.b".to_string()]);
    }

    #[tokio::test]
    async fn test_dropped_receiver_prunes_subscription() {
        let router = LocalRouter::new("realm1");
        let conn = router.connect("local://", "realm1").await.unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        conn.subscribe("com.werewolf.g1.add_player", MatchPolicy::Exact, tx)
            .await
            .unwrap();
        drop(rx);

        assert_eq!(router.publish("com.werewolf.g1.add_player", vec![], Kwargs::new()), 0);
        assert_eq!(router.subscription_count(), 0);
    }
}
