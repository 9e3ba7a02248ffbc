//! Unified error type for the werewolf client.

use werewolf_protocol::ProtocolError;
use werewolf_session::SessionError;

/// Top-level error returned by [`GameClient`](crate::GameClient).
///
/// Wraps the layer errors so callers match on one type; `?` converts
/// them through the generated `From` impls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WerewolfError {
    /// Connection, remote call, or subscription failure.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A name that cannot be a topic segment, or a result that does not
    /// decode.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
