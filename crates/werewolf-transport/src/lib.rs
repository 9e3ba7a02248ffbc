//! Transport abstraction layer for the werewolf client.
//!
//! Provides the [`Transport`] and [`Connection`] traits that abstract over
//! the publish/subscribe + remote-call router the game server sits behind.
//! The wire protocol spoken to a real router is not part of this crate;
//! embedders plug their own client library in through these traits.
//!
//! # Feature Flags
//!
//! - `local` (default) — in-process [`LocalRouter`] broker

mod error;
#[cfg(feature = "local")]
mod local;

pub use error::TransportError;
#[cfg(feature = "local")]
pub use local::{LocalConnection, LocalRouter, ProcedureResult};
pub use serde_json::{Map, Value};

use std::fmt;
use std::future::Future;

use tokio::sync::mpsc;

/// Keyword arguments attached to a published event.
pub type Kwargs = Map<String, Value>;

/// Opaque identifier the router hands back for an acknowledged subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Creates a new `SubscriptionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// How a subscription URI is compared against published topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MatchPolicy {
    /// Only the topic equal to the URI.
    #[default]
    Exact,

    /// The URI itself and every dot-separated child of it.
    Prefix,
}

impl MatchPolicy {
    /// Returns `true` if `topic` is delivered to a subscription on `uri`.
    ///
    /// Prefix matching stops at segment boundaries: `com.werewolf.g1`
    /// covers `com.werewolf.g1.add_player` but not `com.werewolf.g10`.
    pub fn matches(self, uri: &str, topic: &str) -> bool {
        match self {
            Self::Exact => topic == uri,
            Self::Prefix => topic
                .strip_prefix(uri)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('.')),
        }
    }
}

/// An event published on a topic, as received by a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    /// The concrete topic the event was published on.
    pub topic: String,
    /// Positional arguments.
    pub args: Vec<Value>,
    /// Keyword arguments.
    pub kwargs: Kwargs,
}

impl InboundEvent {
    /// Creates an event with positional arguments only.
    pub fn new(topic: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            topic: topic.into(),
            args,
            kwargs: Kwargs::new(),
        }
    }
}

/// An inbound event tagged with the subscription that matched it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub subscription: SubscriptionId,
    pub event: InboundEvent,
}

/// Where a connection pushes deliveries for a subscription.
///
/// Unbounded so the router never waits on a slow consumer; events on the
/// same sink keep their publish order.
pub type EventSink = mpsc::UnboundedSender<Delivery>;

/// Opens sessions against a router.
///
/// Methods return `impl Future + Send` (rather than `async fn`) so callers
/// can drive them from spawned tasks. Implementations may still write
/// `async fn`.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;

    /// Opens one session on `realm` at `url`.
    fn connect(
        &self,
        url: &str,
        realm: &str,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;
}

/// A single open router session.
pub trait Connection: Send + Sync + 'static {
    /// Invokes a remote procedure and waits for its result.
    fn call(
        &self,
        procedure: &str,
        args: Vec<Value>,
    ) -> impl Future<Output = Result<Value, TransportError>> + Send;

    /// Subscribes to `topic`; matching events are pushed into `sink`.
    ///
    /// Resolves once the router acknowledged the subscription.
    fn subscribe(
        &self,
        topic: &str,
        policy: MatchPolicy,
        sink: EventSink,
    ) -> impl Future<Output = Result<SubscriptionId, TransportError>> + Send;

    /// Cancels a subscription. No deliveries for `id` follow the ack.
    fn unsubscribe(
        &self,
        id: SubscriptionId,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Publishes an event on `topic`.
    fn publish(
        &self,
        topic: &str,
        args: Vec<Value>,
        kwargs: Kwargs,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Closes the session.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns `false` once the session is gone, for whatever reason.
    fn is_open(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_id_display() {
        assert_eq!(SubscriptionId::new(7).to_string(), "sub-7");
        assert_eq!(SubscriptionId::new(7).into_inner(), 7);
    }

    #[test]
    fn test_exact_policy_matches_only_the_uri() {
        let uri = "com.werewolf.g1.add_player";
        assert!(MatchPolicy::Exact.matches(uri, uri));
        assert!(!MatchPolicy::Exact.matches(uri, "com.werewolf.g1.add_player.x"));
        assert!(!MatchPolicy::Exact.matches(uri, "com.werewolf.g1"));
    }

    #[test]
    fn test_prefix_policy_matches_root_and_children() {
        let uri = "com.werewolf.g1.enter_in_phase";
        assert!(MatchPolicy::Prefix.matches(uri, uri));
        assert!(MatchPolicy::Prefix.matches(uri, "com.werewolf.g1.enter_in_phase.seer"));
        assert!(MatchPolicy::Prefix.matches(uri, "com.werewolf.g1.enter_in_phase.a.b"));
    }

    #[test]
    fn test_prefix_policy_respects_segment_boundaries() {
        assert!(!MatchPolicy::Prefix.matches("com.werewolf.g1", "com.werewolf.g10.add_player"));
        assert!(!MatchPolicy::Prefix.matches("com.werewolf.g1", "com.werewolf"));
    }

    #[test]
    fn test_default_policy_is_exact() {
        assert_eq!(MatchPolicy::default(), MatchPolicy::Exact);
    }

    #[test]
    fn test_inbound_event_new_has_empty_kwargs() {
        let event = InboundEvent::new("com.werewolf.g1.add_player", vec![Value::Null]);
        assert_eq!(event.topic, "com.werewolf.g1.add_player");
        assert_eq!(event.args.len(), 1);
        assert!(event.kwargs.is_empty());
    }
}
