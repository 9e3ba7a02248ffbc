//! Integration tests for the session gateway against the in-process router.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use werewolf_protocol::TopicPattern;
use werewolf_session::{SessionConfig, SessionError, SessionGateway, SessionState};
use werewolf_transport::{
    Connection, EventSink, Kwargs, LocalConnection, LocalRouter, MatchPolicy, SubscriptionId,
    Transport, TransportError, Value,
};

// =========================================================================
// Helpers
// =========================================================================

fn gateway(router: &LocalRouter) -> SessionGateway<LocalRouter> {
    SessionGateway::new(router.clone(), SessionConfig::new("local://", "realm1"))
}

/// Registers `procedure` and counts how often it runs.
fn counted(router: &LocalRouter, procedure: &str) -> Arc<AtomicUsize> {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    router.register(procedure, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(json!(null))
    });
    hits
}

/// A local router on which calls to `stalled` are never answered and
/// sessions open only after `connect_delay`.
struct Stalling {
    router: LocalRouter,
    stalled: &'static str,
    connect_delay: Duration,
}

struct StallingConnection {
    inner: LocalConnection,
    stalled: &'static str,
}

impl Transport for Stalling {
    type Connection = StallingConnection;

    async fn connect(&self, url: &str, realm: &str) -> Result<Self::Connection, TransportError> {
        tokio::time::sleep(self.connect_delay).await;
        Ok(StallingConnection {
            inner: self.router.connect(url, realm).await?,
            stalled: self.stalled,
        })
    }
}

impl Connection for StallingConnection {
    async fn call(&self, procedure: &str, args: Vec<Value>) -> Result<Value, TransportError> {
        if procedure == self.stalled {
            std::future::pending::<()>().await;
        }
        self.inner.call(procedure, args).await
    }

    async fn subscribe(
        &self,
        topic: &str,
        policy: MatchPolicy,
        sink: EventSink,
    ) -> Result<SubscriptionId, TransportError> {
        self.inner.subscribe(topic, policy, sink).await
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), TransportError> {
        self.inner.unsubscribe(id).await
    }

    async fn publish(&self, topic: &str, args: Vec<Value>, kwargs: Kwargs) -> Result<(), TransportError> {
        self.inner.publish(topic, args, kwargs).await
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.inner.close().await
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }
}

// =========================================================================
// State machine
// =========================================================================

#[tokio::test]
async fn test_new_gateway_is_disconnected() {
    let router = LocalRouter::new("realm1");
    assert_eq!(gateway(&router).state().await, SessionState::Disconnected);
}

#[tokio::test]
async fn test_call_before_connect_fails_without_io() {
    let router = LocalRouter::new("realm1");
    let hits = counted(&router, "com.werewolf.start_game");
    let gw = gateway(&router);

    let err = gw
        .call("com.werewolf.start_game", vec![json!("g1")])
        .await
        .unwrap_err();

    assert_eq!(err, SessionError::NotConnected);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(gw.state().await, SessionState::Disconnected);
}

#[tokio::test]
async fn test_subscribe_before_connect_fails() {
    let router = LocalRouter::new("realm1");
    let gw = gateway(&router);
    let (tx, _rx) = mpsc::unbounded_channel();

    let err = gw
        .subscribe(&TopicPattern::add_player("g1"), tx)
        .await
        .unwrap_err();

    assert_eq!(err, SessionError::NotConnected);
    assert_eq!(router.subscription_count(), 0);
}

#[tokio::test]
async fn test_connect_moves_to_connected() {
    let router = LocalRouter::new("realm1");
    let gw = gateway(&router);
    gw.connect().await.unwrap();
    assert_eq!(gw.state().await, SessionState::Connected);
}

#[tokio::test]
async fn test_connect_twice_is_rejected() {
    let router = LocalRouter::new("realm1");
    let gw = gateway(&router);
    gw.connect().await.unwrap();

    let err = gw.connect().await.unwrap_err();
    assert_eq!(err, SessionError::AlreadyStarted(SessionState::Connected));
}

#[tokio::test]
async fn test_connect_failure_is_terminal() {
    let router = LocalRouter::new("realm1");
    let gw = SessionGateway::new(router.clone(), SessionConfig::new("local://", "nowhere"));

    let err = gw.connect().await.unwrap_err();
    assert!(matches!(err, SessionError::Connection(TransportError::ConnectFailed(_))));
    assert_eq!(gw.state().await, SessionState::Closed);

    // No auto-reconnect: Closed stays Closed.
    assert_eq!(
        gw.connect().await.unwrap_err(),
        SessionError::AlreadyStarted(SessionState::Closed)
    );
    assert_eq!(
        gw.call("com.werewolf.start_game", vec![]).await.unwrap_err(),
        SessionError::Closed
    );
}

#[tokio::test]
async fn test_close_is_terminal_and_idempotent() {
    let router = LocalRouter::new("realm1");
    let gw = gateway(&router);
    gw.connect().await.unwrap();

    gw.close().await;
    gw.close().await;

    assert_eq!(gw.state().await, SessionState::Closed);
    assert_eq!(
        gw.call("com.werewolf.start_game", vec![]).await.unwrap_err(),
        SessionError::Closed
    );
}

#[tokio::test]
async fn test_transport_loss_closes_session() {
    let router = LocalRouter::new("realm1");
    let hits = counted(&router, "com.werewolf.start_game");
    let gw = gateway(&router);
    gw.connect().await.unwrap();

    router.disconnect_all();

    let err = gw.call("com.werewolf.start_game", vec![]).await.unwrap_err();
    assert_eq!(err, SessionError::Closed);
    assert_eq!(gw.state().await, SessionState::Closed);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_close_during_handshake_wins() {
    let stalling = Stalling {
        router: LocalRouter::new("realm1"),
        stalled: "",
        connect_delay: Duration::from_millis(100),
    };
    let gw = Arc::new(SessionGateway::new(stalling, SessionConfig::new("local://", "realm1")));
    let connecting = tokio::spawn({
        let gw = Arc::clone(&gw);
        async move { gw.connect().await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(gw.state().await, SessionState::Connecting);

    gw.close().await;

    assert_eq!(connecting.await.unwrap(), Err(SessionError::Closed));
    assert_eq!(gw.state().await, SessionState::Closed);
}

// =========================================================================
// Calls
// =========================================================================

#[tokio::test]
async fn test_call_returns_remote_result() {
    let router = LocalRouter::new("realm1");
    router.register("com.werewolf.select_player", |args| {
        Ok(json!(args.len() == 3))
    });
    let gw = gateway(&router);
    gw.connect().await.unwrap();

    let result = gw
        .call(
            "com.werewolf.select_player",
            vec![json!("g1"), json!("bob"), json!("alice")],
        )
        .await
        .unwrap();
    assert_eq!(result, json!(true));
}

#[tokio::test]
async fn test_rejected_call_is_surfaced_once() {
    let router = LocalRouter::new("realm1");
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    router.register("com.werewolf.create_game", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Err("The game with g1 already exist".into())
    });
    let gw = gateway(&router);
    gw.connect().await.unwrap();

    let err = gw
        .call("com.werewolf.create_game", vec![json!("g1"), json!("alice")])
        .await
        .unwrap_err();

    match err {
        SessionError::RemoteCall { procedure, source } => {
            assert_eq!(procedure, "com.werewolf.create_game");
            assert!(source.to_string().contains("already exist"));
        }
        other => panic!("expected RemoteCall, got {other:?}"),
    }
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(gw.state().await, SessionState::Connected);
}

#[tokio::test]
async fn test_unanswered_call_times_out() {
    let router = LocalRouter::new("realm1");
    let hits = counted(&router, "com.werewolf.start_game");
    let stalling = Stalling {
        router,
        stalled: "com.werewolf.select_player",
        connect_delay: Duration::ZERO,
    };
    let config = SessionConfig::new("local://", "realm1").with_call_timeout(Duration::from_millis(50));
    let gw = SessionGateway::new(stalling, config);
    gw.connect().await.unwrap();

    let err = gw
        .call("com.werewolf.select_player", vec![json!("g1")])
        .await
        .unwrap_err();

    assert_eq!(
        err,
        SessionError::Timeout {
            procedure: "com.werewolf.select_player".into(),
            after: Duration::from_millis(50),
        }
    );
    assert_eq!(gw.state().await, SessionState::Connected);
    gw.call("com.werewolf.start_game", vec![json!("g1")]).await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

// =========================================================================
// Subscriptions
// =========================================================================

#[tokio::test]
async fn test_subscribe_delivers_matching_events() {
    let router = LocalRouter::new("realm1");
    let gw = gateway(&router);
    gw.connect().await.unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let record = gw
        .subscribe(&TopicPattern::close_phase("g1"), tx)
        .await
        .unwrap();
    assert_eq!(record.pattern, TopicPattern::close_phase("g1"));

    router.publish("com.werewolf.g1.close_phase.day1", vec![json!({})], Kwargs::new());

    let delivery = rx.recv().await.unwrap();
    assert_eq!(delivery.subscription, record.id);
    assert_eq!(delivery.event.topic, "com.werewolf.g1.close_phase.day1");
}

#[tokio::test]
async fn test_rejected_subscription_is_surfaced() {
    let router = LocalRouter::new("realm1");
    router.deny_subscriptions("com.werewolf.g1.add_player");
    let gw = gateway(&router);
    gw.connect().await.unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();

    let err = gw
        .subscribe(&TopicPattern::add_player("g1"), tx)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::Subscription { ref topic, .. } if topic == "com.werewolf.g1.add_player"
    ));
}

#[tokio::test]
async fn test_unsubscribe_stops_delivery() {
    let router = LocalRouter::new("realm1");
    let gw = gateway(&router);
    gw.connect().await.unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let record = gw
        .subscribe(&TopicPattern::add_player("g1"), tx)
        .await
        .unwrap();

    gw.unsubscribe(&record).await.unwrap();
    router.publish("com.werewolf.g1.add_player", vec![json!([])], Kwargs::new());

    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_publish_goes_through_router() {
    let router = LocalRouter::new("realm1");
    let gw = gateway(&router);
    gw.connect().await.unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    gw.subscribe(&TopicPattern::namespace(), tx).await.unwrap();

    gw.publish("com.werewolf.g1.add_player", vec![json!([])], Kwargs::new())
        .await
        .unwrap();

    assert_eq!(rx.recv().await.unwrap().event.topic, "com.werewolf.g1.add_player");
}

#[tokio::test]
async fn test_config_is_exposed() {
    let router = LocalRouter::new("realm1");
    let gw = SessionGateway::new(
        router,
        SessionConfig::new("local://", "realm1").with_call_timeout(Duration::from_secs(2)),
    );
    assert_eq!(gw.config().call_timeout, Duration::from_secs(2));
}
