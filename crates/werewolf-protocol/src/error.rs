//! Error types for the protocol layer.
//!
//! Everything here is about the *shape* of what travels on the router:
//! topic strings that do not follow the namespace layout, names that
//! cannot be embedded in a topic, and payloads that do not decode.

/// Errors that can occur in the protocol layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The topic does not follow any known `com.werewolf` layout.
    ///
    /// Expected for unrelated traffic under the namespace; callers log
    /// and drop the event rather than failing.
    #[error("malformed topic: {0}")]
    MalformedTopic(String),

    /// A game, player or role name cannot be used as a topic segment.
    #[error("invalid {kind} name {value:?}: must be non-empty and contain no '.'")]
    InvalidSegment { kind: &'static str, value: String },

    /// The event or call result did not carry the expected payload.
    #[error("invalid payload on {topic}: {reason}")]
    InvalidPayload { topic: String, reason: String },
}
