//! Session types: configuration, lifecycle state, and subscription records.

use std::fmt;
use std::time::Duration;

use werewolf_protocol::TopicPattern;
use werewolf_transport::SubscriptionId;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Where and how the gateway connects.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Router endpoint.
    pub url: String,

    /// Realm to join on the router.
    pub realm: String,

    /// Upper bound on a single remote call. The call fails with
    /// [`SessionError::Timeout`](crate::SessionError::Timeout) past it.
    ///
    /// Default: 30 seconds.
    pub call_timeout: Duration,
}

impl SessionConfig {
    /// A config for `url` and `realm` with the default timeout.
    pub fn new(url: impl Into<String>, realm: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            realm: realm.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8081/ws".to_string(),
            realm: "realm1".to_string(),
            call_timeout: Duration::from_secs(30),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Lifecycle of the gateway's single session.
///
/// ```text
///   Disconnected ──(connect)──→ Connecting ──(ack)──→ Connected
///        │                           │                    │
///        └───────────────────────────┴────────────────────┴──→ Closed
/// ```
///
/// `Closed` is reached on `close()` or any transport failure and is
/// terminal: there is no reconnect at this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// SubscriptionRecord
// ---------------------------------------------------------------------------

/// An acknowledged subscription.
///
/// Only ever built from a successful subscribe, so holding one means the
/// router is delivering events for `pattern`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRecord {
    pub pattern: TopicPattern,
    pub id: SubscriptionId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_targets_local_router() {
        let config = SessionConfig::default();
        assert_eq!(config.url, "ws://localhost:8081/ws");
        assert_eq!(config.realm, "realm1");
        assert_eq!(config.call_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_config_builder_overrides() {
        let config = SessionConfig::new("ws://example:9000/ws", "village")
            .with_call_timeout(Duration::from_millis(250));
        assert_eq!(config.url, "ws://example:9000/ws");
        assert_eq!(config.realm, "village");
        assert_eq!(config.call_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::Disconnected.to_string(), "disconnected");
        assert_eq!(SessionState::Closed.to_string(), "closed");
    }
}
