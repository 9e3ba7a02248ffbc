//! Remote procedures exposed by the game server.

use std::fmt;

use werewolf_transport::Value;

use crate::{ProtocolError, topic};

/// A procedure under the `com.werewolf` namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Procedure {
    /// `create_game(game, player)`
    CreateGame,
    /// `join_game(game, player)`
    JoinGame,
    /// `start_game(game)`
    StartGame,
    /// `select_player(game, target, player) -> bool`
    SelectPlayer,
    /// `player_listen_topic(game, player)`: tells the server this player
    /// now listens on its role topics.
    PlayerListenTopic,
}

impl Procedure {
    pub fn name(self) -> &'static str {
        match self {
            Self::CreateGame => "create_game",
            Self::JoinGame => "join_game",
            Self::StartGame => "start_game",
            Self::SelectPlayer => "select_player",
            Self::PlayerListenTopic => "player_listen_topic",
        }
    }

    /// The full URI, e.g. `com.werewolf.create_game`.
    pub fn uri(self) -> String {
        topic::procedure(self.name())
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Builds an ordered positional argument list from string arguments.
pub fn string_args<const N: usize>(args: [&str; N]) -> Vec<Value> {
    args.into_iter().map(|arg| Value::String(arg.to_string())).collect()
}

/// Interprets the result of `select_player`. `null` counts as a refusal.
///
/// # Errors
/// [`ProtocolError::InvalidPayload`] if the server answered something
/// other than a boolean or `null`.
pub fn selection_accepted(result: &Value) -> Result<bool, ProtocolError> {
    match result {
        Value::Bool(accepted) => Ok(*accepted),
        Value::Null => Ok(false),
        other => Err(ProtocolError::InvalidPayload {
            topic: Procedure::SelectPlayer.uri(),
            reason: format!("expected a boolean result, got {other}"),
        }),
    }
}
