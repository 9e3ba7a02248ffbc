//! The session gateway: owns the one router connection of a client.
//!
//! Everything the rest of the client does on the network goes through
//! [`SessionGateway`]. It enforces the session state machine, so nothing
//! reaches the transport before the session is up or after it is gone.

use std::sync::Arc;

use tokio::sync::Mutex;
use werewolf_protocol::TopicPattern;
use werewolf_transport::{Connection, EventSink, Kwargs, Transport, TransportError, Value};

use crate::{SessionConfig, SessionError, SessionState, SubscriptionRecord};

/// The connection slot, one variant per [`SessionState`].
enum Link<C> {
    Disconnected,
    Connecting,
    Connected(Arc<C>),
    Closed,
}

impl<C> Link<C> {
    fn state(&self) -> SessionState {
        match self {
            Self::Disconnected => SessionState::Disconnected,
            Self::Connecting => SessionState::Connecting,
            Self::Connected(_) => SessionState::Connected,
            Self::Closed => SessionState::Closed,
        }
    }
}

/// Owns the transport session and exposes connect/call/subscribe.
///
/// Operations clone the connection handle out of the lock before awaiting
/// the network, so concurrent calls do not serialize on each other.
pub struct SessionGateway<T: Transport> {
    transport: T,
    config: SessionConfig,
    link: Mutex<Link<T::Connection>>,
}

impl<T: Transport> SessionGateway<T> {
    /// Creates a gateway in the `Disconnected` state. No I/O happens here.
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self {
            transport,
            config,
            link: Mutex::new(Link::Disconnected),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns the current lifecycle state.
    pub async fn state(&self) -> SessionState {
        self.link.lock().await.state()
    }

    /// Opens the session.
    ///
    /// # Errors
    /// - [`SessionError::AlreadyStarted`] unless the gateway is `Disconnected`
    /// - [`SessionError::Connection`] if the transport fails; the gateway
    ///   is then `Closed`
    pub async fn connect(&self) -> Result<(), SessionError> {
        {
            let mut link = self.link.lock().await;
            if !matches!(*link, Link::Disconnected) {
                return Err(SessionError::AlreadyStarted(link.state()));
            }
            *link = Link::Connecting;
        }

        let SessionConfig { url, realm, .. } = &self.config;
        tracing::debug!(%url, %realm, "opening session");

        match self.transport.connect(url, realm).await {
            Ok(conn) => {
                let mut link = self.link.lock().await;
                if !matches!(*link, Link::Connecting) {
                    // Closed while the handshake was in flight.
                    drop(link);
                    if let Err(e) = conn.close().await {
                        tracing::debug!(error = %e, "error while closing session");
                    }
                    return Err(SessionError::Closed);
                }
                *link = Link::Connected(Arc::new(conn));
                tracing::info!(%url, %realm, "session connected");
                Ok(())
            }
            Err(e) => {
                *self.link.lock().await = Link::Closed;
                tracing::warn!(%url, %realm, error = %e, "failed to open session");
                Err(SessionError::Connection(e))
            }
        }
    }

    /// Invokes a remote procedure. Failures are surfaced, never retried.
    ///
    /// # Errors
    /// - [`SessionError::NotConnected`] / [`SessionError::Closed`] without
    ///   touching the transport
    /// - [`SessionError::RemoteCall`] if the server rejects the call
    /// - [`SessionError::Timeout`] past `config.call_timeout`
    pub async fn call(
        &self,
        procedure: &str,
        args: Vec<Value>,
    ) -> Result<Value, SessionError> {
        let conn = self.connection().await?;
        tracing::debug!(%procedure, ?args, "remote call");

        let after = self.config.call_timeout;
        match tokio::time::timeout(after, conn.call(procedure, args)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                self.observe(&e).await;
                tracing::debug!(%procedure, error = %e, "remote call failed");
                Err(SessionError::RemoteCall {
                    procedure: procedure.to_string(),
                    source: e,
                })
            }
            Err(_) => {
                tracing::warn!(%procedure, ?after, "remote call timed out");
                Err(SessionError::Timeout {
                    procedure: procedure.to_string(),
                    after,
                })
            }
        }
    }

    /// Subscribes `pattern`; events are pushed into `sink`.
    ///
    /// Resolves once the router acknowledged, so the returned record is
    /// always live.
    pub async fn subscribe(
        &self,
        pattern: &TopicPattern,
        sink: EventSink,
    ) -> Result<SubscriptionRecord, SessionError> {
        let conn = self.connection().await?;
        let topic = pattern.uri();

        match conn.subscribe(&topic, pattern.policy(), sink).await {
            Ok(id) => {
                tracing::debug!(%pattern, %id, "subscribed");
                Ok(SubscriptionRecord {
                    pattern: pattern.clone(),
                    id,
                })
            }
            Err(e) => {
                self.observe(&e).await;
                tracing::warn!(%pattern, error = %e, "failed to subscribe");
                Err(SessionError::Subscription { topic, source: e })
            }
        }
    }

    /// Cancels a subscription at the router.
    pub async fn unsubscribe(&self, record: &SubscriptionRecord) -> Result<(), SessionError> {
        let conn = self.connection().await?;
        conn.unsubscribe(record.id).await.map_err(|e| SessionError::Subscription {
            topic: record.pattern.uri(),
            source: e,
        })?;
        tracing::debug!(pattern = %record.pattern, id = %record.id, "unsubscribed");
        Ok(())
    }

    /// Publishes an event through the session.
    pub async fn publish(
        &self,
        topic: &str,
        args: Vec<Value>,
        kwargs: Kwargs,
    ) -> Result<(), SessionError> {
        let conn = self.connection().await?;
        conn.publish(topic, args, kwargs).await.map_err(|e| SessionError::RemoteCall {
            procedure: topic.to_string(),
            source: e,
        })
    }

    /// Closes the session. Idempotent; the gateway stays `Closed`.
    pub async fn close(&self) {
        let previous = std::mem::replace(&mut *self.link.lock().await, Link::Closed);
        if let Link::Connected(conn) = previous {
            if let Err(e) = conn.close().await {
                tracing::debug!(error = %e, "error while closing session");
            }
            tracing::info!("session closed");
        }
    }

    /// Returns the live connection or the reason there is none.
    async fn connection(&self) -> Result<Arc<T::Connection>, SessionError> {
        let mut link = self.link.lock().await;
        match &*link {
            Link::Connected(conn) if conn.is_open() => Ok(Arc::clone(conn)),
            Link::Connected(_) => {
                *link = Link::Closed;
                tracing::warn!("transport connection lost, session closed");
                Err(SessionError::Closed)
            }
            Link::Closed => Err(SessionError::Closed),
            Link::Disconnected | Link::Connecting => Err(SessionError::NotConnected),
        }
    }

    /// Moves to `Closed` when the transport reports the connection gone.
    async fn observe(&self, error: &TransportError) {
        if matches!(error, TransportError::ConnectionClosed) {
            let mut link = self.link.lock().await;
            if matches!(*link, Link::Connected(_)) {
                *link = Link::Closed;
                tracing::warn!("transport connection lost, session closed");
            }
        }
    }
}
