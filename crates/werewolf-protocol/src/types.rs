//! Payload types carried by werewolf events.
//!
//! The game server publishes plain JSON objects as the first positional
//! argument of every event. These types decode them; anything the server
//! leaves out falls back to a default rather than failing the event.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use werewolf_transport::{InboundEvent, Value};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// The game a client created or joined, and who it plays as.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GameIdentity {
    pub game_name: String,
    pub player_name: String,
}

impl GameIdentity {
    pub fn new(game_name: impl Into<String>, player_name: impl Into<String>) -> Self {
        Self {
            game_name: game_name.into(),
            player_name: player_name.into(),
        }
    }
}

impl fmt::Display for GameIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.player_name, self.game_name)
    }
}

/// A player's assigned role within a game.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoleContext {
    pub game_name: String,
    pub player_name: String,
    pub role: String,
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// Whether a player is still in the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    #[default]
    Alive,
    Dead,
}

/// A player as published by the game server.
///
/// The server sends either the full object (`{"name", "state",
/// "selected", "role"?}`) or, in phase results, just the name. Both decode
/// into this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PlayerRepr")]
pub struct Player {
    pub name: String,
    /// Only present on the player's own `start_game` payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub state: PlayerState,
    /// How many votes currently target this player.
    pub selected: u32,
}

impl Player {
    /// A living player known only by name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: None,
            state: PlayerState::Alive,
            selected: 0,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PlayerRepr {
    Name(String),
    Full {
        name: String,
        #[serde(default)]
        role: Option<String>,
        #[serde(default)]
        state: PlayerState,
        #[serde(default)]
        selected: u32,
    },
}

impl From<PlayerRepr> for Player {
    fn from(repr: PlayerRepr) -> Self {
        match repr {
            PlayerRepr::Name(name) => Player::named(name),
            PlayerRepr::Full {
                name,
                role,
                state,
                selected,
            } => Player {
                name,
                role,
                state,
                selected,
            },
        }
    }
}

/// Accepts `null`, one player, or a list of players.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<Player>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<Player>),
        One(Player),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::Many(players)) => players,
        Some(OneOrMany::One(player)) => vec![player],
    })
}

// ---------------------------------------------------------------------------
// Phase events
// ---------------------------------------------------------------------------

/// Payload of an `enter_in_phase` event.
///
/// The game-wide topic usually carries `is_night`; the role topic carries
/// `active` and `selectable`. The day phase carries all three.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct PhaseEvent {
    /// Taken from the topic, never from the payload.
    #[serde(skip)]
    pub phase: String,
    #[serde(default)]
    pub is_night: Option<bool>,
    #[serde(default)]
    pub selectable: Option<Vec<Player>>,
    #[serde(default)]
    pub active: Option<Vec<Player>>,
}

impl PhaseEvent {
    /// Decodes `args[0]` and stamps the phase name.
    pub fn parse(event: &InboundEvent, phase: &str) -> Result<Self, ProtocolError> {
        let mut parsed: Self = first_arg(event)?;
        parsed.phase = phase.to_string();
        Ok(parsed)
    }

    /// The day/night transition, if the payload announced one.
    pub fn change(&self) -> Option<PhaseChange> {
        self.is_night.map(|is_night| PhaseChange {
            phase: self.phase.clone(),
            is_night,
        })
    }
}

/// What `on_enter_in_phase` receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseChange {
    pub phase: String,
    pub is_night: bool,
}

/// Payload of a `close_phase` event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClosePhaseEvent {
    /// Taken from the topic, never from the payload.
    #[serde(default)]
    pub phase: String,
    #[serde(default, deserialize_with = "one_or_many")]
    pub killed: Vec<Player>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub resurrected: Vec<Player>,
    /// The winning side once the game is over.
    #[serde(default)]
    pub winner: Option<String>,
}

impl ClosePhaseEvent {
    /// Decodes `args[0]` and overrides whatever phase it claims.
    pub fn parse(event: &InboundEvent, phase: &str) -> Result<Self, ProtocolError> {
        let mut parsed: Self = first_arg(event)?;
        parsed.phase = phase.to_string();
        Ok(parsed)
    }
}

/// The role announced on a player's `start_game` topic.
///
/// Read from `args[0].role`, falling back to a `role` keyword argument.
pub fn assigned_role(event: &InboundEvent) -> Result<String, ProtocolError> {
    let role = event
        .args
        .first()
        .and_then(|payload| payload.get("role"))
        .or_else(|| event.kwargs.get("role"))
        .and_then(Value::as_str);

    match role {
        Some(role) if !role.is_empty() => Ok(role.to_string()),
        _ => Err(ProtocolError::InvalidPayload {
            topic: event.topic.clone(),
            reason: "missing role".into(),
        }),
    }
}

/// Decodes the first positional argument of an event.
pub fn first_arg<T: DeserializeOwned>(event: &InboundEvent) -> Result<T, ProtocolError> {
    let invalid = |reason: String| ProtocolError::InvalidPayload {
        topic: event.topic.clone(),
        reason,
    };
    let payload = event
        .args
        .first()
        .cloned()
        .ok_or_else(|| invalid("no positional argument".into()))?;
    serde_json::from_value(payload).map_err(|e| invalid(e.to_string()))
}
