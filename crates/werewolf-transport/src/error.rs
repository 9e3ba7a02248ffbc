use crate::SubscriptionId;

/// Errors that can occur in the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The router could not be reached or refused the session.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// The router (or the procedure behind it) rejected the request.
    #[error("{uri} rejected: {reason}")]
    Rejected { uri: String, reason: String },

    /// Nobody registered the called procedure.
    #[error("no such procedure: {0}")]
    NoSuchProcedure(String),

    /// Unsubscribe was asked for an id the router does not know.
    #[error("unknown subscription {0}")]
    UnknownSubscription(SubscriptionId),

    /// The connection is gone. Every later operation fails the same way.
    #[error("connection closed")]
    ConnectionClosed,
}
