//! Error types for the session layer.

use std::time::Duration;

use werewolf_transport::TransportError;

use crate::SessionState;

/// Errors that can occur while using the session gateway.
///
/// Every variant is fatal to the operation that produced it, never to the
/// gateway itself; only a closed connection ends the session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The operation was attempted before the session was established.
    #[error("not connected")]
    NotConnected,

    /// The session is closed. Closed is terminal: build a new gateway.
    #[error("session closed")]
    Closed,

    /// `connect` was called on a gateway that already left `Disconnected`.
    #[error("cannot connect: session is {0}")]
    AlreadyStarted(SessionState),

    /// The transport failed to open the session.
    #[error("connection failed: {0}")]
    Connection(#[source] TransportError),

    /// The server rejected a remote call. Never retried by the gateway.
    #[error("remote call {procedure} failed: {source}")]
    RemoteCall {
        procedure: String,
        #[source]
        source: TransportError,
    },

    /// The remote call did not answer within the configured timeout.
    #[error("remote call {procedure} timed out after {after:?}")]
    Timeout { procedure: String, after: Duration },

    /// The router rejected a subscription. The affected events simply
    /// never arrive.
    #[error("subscription to {topic} failed: {source}")]
    Subscription {
        topic: String,
        #[source]
        source: TransportError,
    },
}
