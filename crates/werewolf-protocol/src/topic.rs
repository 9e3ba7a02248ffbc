//! Topic addressing: building and parsing `com.werewolf` topic names.
//!
//! Every topic the client subscribes to, and every procedure it calls,
//! lives under one namespace:
//!
//! ```text
//! com.werewolf.<game>.enter_in_phase[.<phase>]
//! com.werewolf.<game>.select_player
//! com.werewolf.<game>.close_phase[.<phase>]
//! com.werewolf.<game>.add_player
//! com.werewolf.<game>.user.<player>.start_game
//! com.werewolf.<game>.role.<role>.enter_in_phase[.<phase>]
//! com.werewolf.<game>.role.<role>.select_player
//! ```
//!
//! This module is the only place that composes or slices these strings.
//! Routing decisions downstream depend on exact segment boundaries, so
//! nothing else should `split('.')` a topic by hand.

use std::fmt;

use werewolf_transport::MatchPolicy;

use crate::ProtocolError;

/// Root of every topic and procedure URI.
pub const NAMESPACE: &str = "com.werewolf";

const USER_SEGMENT: &str = "user";
const ROLE_SEGMENT: &str = "role";

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// `com.werewolf.<game>`
pub fn game_root(game: &str) -> String {
    format!("{NAMESPACE}.{game}")
}

/// `com.werewolf.<game>.role.<role>`
pub fn role_root(game: &str, role: &str) -> String {
    format!("{}.{ROLE_SEGMENT}.{role}", game_root(game))
}

/// `com.werewolf.<game>.user.<player>`
pub fn user_root(game: &str, player: &str) -> String {
    format!("{}.{USER_SEGMENT}.{player}", game_root(game))
}

/// `com.werewolf.<name>`, the URI of a remote procedure.
pub fn procedure(name: &str) -> String {
    format!("{NAMESPACE}.{name}")
}

/// Returns the substring after the final `.` of `topic`.
///
/// Used to recover a phase or role name from an inbound topic.
///
/// # Errors
/// [`ProtocolError::MalformedTopic`] if the topic has no separator.
pub fn last_segment(topic: &str) -> Result<&str, ProtocolError> {
    topic
        .rsplit_once('.')
        .map(|(_, last)| last)
        .ok_or_else(|| ProtocolError::MalformedTopic(topic.to_string()))
}

/// Checks that a name can be embedded as a single topic segment.
///
/// `kind` names the thing being checked ("game", "player", "role") and
/// ends up in the error message.
pub fn validate_segment(kind: &'static str, value: &str) -> Result<(), ProtocolError> {
    if value.is_empty() || value.contains('.') {
        return Err(ProtocolError::InvalidSegment {
            kind,
            value: value.to_string(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// EventKind
// ---------------------------------------------------------------------------

/// The literal event-kind segment of a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    EnterInPhase,
    SelectPlayer,
    ClosePhase,
    AddPlayer,
    StartGame,
}

impl EventKind {
    /// The segment as it appears in topics.
    pub fn segment(self) -> &'static str {
        match self {
            Self::EnterInPhase => "enter_in_phase",
            Self::SelectPlayer => "select_player",
            Self::ClosePhase => "close_phase",
            Self::AddPlayer => "add_player",
            Self::StartGame => "start_game",
        }
    }

    /// Whether topics of this kind carry a trailing phase segment, and
    /// so are subscribed with prefix matching.
    pub fn is_phased(self) -> bool {
        matches!(self, Self::EnterInPhase | Self::ClosePhase)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

// ---------------------------------------------------------------------------
// TopicPattern
// ---------------------------------------------------------------------------

/// A subscription target: topic segments plus a prefix-match flag.
///
/// A prefix pattern matches its own root topic as well as every
/// dot-separated child (`close_phase` and `close_phase.day1`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicPattern {
    segments: Vec<String>,
    prefix: bool,
}

impl TopicPattern {
    /// A pattern matching exactly `uri`.
    pub fn exact(uri: &str) -> Self {
        Self::from_uri(uri, false)
    }

    /// A pattern matching `uri` and all its children.
    pub fn prefix(uri: &str) -> Self {
        Self::from_uri(uri, true)
    }

    fn from_uri(uri: &str, prefix: bool) -> Self {
        Self {
            segments: uri.split('.').map(str::to_string).collect(),
            prefix,
        }
    }

    /// Everything under `com.werewolf`.
    pub fn namespace() -> Self {
        Self::prefix(NAMESPACE)
    }

    /// `<game>.enter_in_phase`, prefix.
    pub fn enter_in_phase(game: &str) -> Self {
        Self::game_event(game, EventKind::EnterInPhase)
    }

    /// `<game>.select_player`, exact.
    pub fn select_player(game: &str) -> Self {
        Self::game_event(game, EventKind::SelectPlayer)
    }

    /// `<game>.close_phase`, prefix.
    pub fn close_phase(game: &str) -> Self {
        Self::game_event(game, EventKind::ClosePhase)
    }

    /// `<game>.add_player`, exact.
    pub fn add_player(game: &str) -> Self {
        Self::game_event(game, EventKind::AddPlayer)
    }

    /// `<game>.user.<player>.start_game`, exact.
    pub fn start_game(game: &str, player: &str) -> Self {
        Self::exact(&format!(
            "{}.{}",
            user_root(game, player),
            EventKind::StartGame
        ))
    }

    /// `<game>.role.<role>.enter_in_phase`, prefix.
    pub fn role_enter_in_phase(game: &str, role: &str) -> Self {
        Self::prefix(&format!("{}.{}", role_root(game, role), EventKind::EnterInPhase))
    }

    /// `<game>.role.<role>.select_player`, exact.
    pub fn role_select_player(game: &str, role: &str) -> Self {
        Self::exact(&format!("{}.{}", role_root(game, role), EventKind::SelectPlayer))
    }

    fn game_event(game: &str, kind: EventKind) -> Self {
        Self::from_uri(&format!("{}.{kind}", game_root(game)), kind.is_phased())
    }

    /// The five patterns every creator or joiner of `game` listens on.
    pub fn game_set(game: &str, player: &str) -> [Self; 5] {
        [
            Self::enter_in_phase(game),
            Self::select_player(game),
            Self::close_phase(game),
            Self::add_player(game),
            Self::start_game(game, player),
        ]
    }

    /// The patterns added once `role` is assigned in `game`.
    pub fn role_set(game: &str, role: &str) -> [Self; 2] {
        [
            Self::role_enter_in_phase(game, role),
            Self::role_select_player(game, role),
        ]
    }

    /// The subscription URI.
    pub fn uri(&self) -> String {
        self.segments.join(".")
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_prefix(&self) -> bool {
        self.prefix
    }

    /// The transport match policy for this pattern.
    pub fn policy(&self) -> MatchPolicy {
        if self.prefix {
            MatchPolicy::Prefix
        } else {
            MatchPolicy::Exact
        }
    }

    /// Returns `true` if an event on `topic` is delivered to this pattern.
    pub fn matches(&self, topic: &str) -> bool {
        self.policy().matches(&self.uri(), topic)
    }

    /// Returns `true` if this pattern lives under `game`'s subtree.
    pub fn belongs_to(&self, game: &str) -> bool {
        MatchPolicy::Prefix.matches(&game_root(game), &self.uri())
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefix {
            write!(f, "{} [prefix]", self.uri())
        } else {
            f.write_str(&self.uri())
        }
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Which subtree of a game an event was published in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Broadcast to everyone in the game.
    Game,
    /// Sent to the holders of one role.
    Role(String),
    /// Sent to a single player.
    User(String),
}

/// Structured view of an inbound topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedTopic {
    pub game: String,
    pub scope: Scope,
    pub kind: EventKind,
    /// The last topic segment. For phased kinds published with a trailing
    /// phase this is the phase name; on the bare kind topic it is the kind
    /// segment itself.
    pub phase: String,
}

/// Classifies a topic by its event-kind segment.
///
/// # Errors
/// [`ProtocolError::MalformedTopic`] for anything outside the layouts
/// listed in the module docs.
pub fn classify(topic: &str) -> Result<RoutedTopic, ProtocolError> {
    let malformed = || ProtocolError::MalformedTopic(topic.to_string());

    let rest = topic
        .strip_prefix(NAMESPACE)
        .and_then(|rest| rest.strip_prefix('.'))
        .ok_or_else(malformed)?;
    let segments: Vec<&str> = rest.split('.').collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(malformed());
    }

    let (game, tail) = segments.split_first().ok_or_else(malformed)?;
    let (scope, tail) = match tail {
        [USER_SEGMENT, player, tail @ ..] => (Scope::User(player.to_string()), tail),
        [ROLE_SEGMENT, role, tail @ ..] => (Scope::Role(role.to_string()), tail),
        _ => (Scope::Game, tail),
    };

    let kind = match (&scope, tail) {
        (Scope::User(_), ["start_game"]) => EventKind::StartGame,
        (Scope::User(_), _) => return Err(malformed()),
        (_, ["enter_in_phase"] | ["enter_in_phase", _]) => EventKind::EnterInPhase,
        (_, ["select_player"]) => EventKind::SelectPlayer,
        (Scope::Game, ["close_phase"] | ["close_phase", _]) => EventKind::ClosePhase,
        (Scope::Game, ["add_player"]) => EventKind::AddPlayer,
        _ => return Err(malformed()),
    };

    Ok(RoutedTopic {
        game: game.to_string(),
        scope,
        kind,
        phase: last_segment(topic)?.to_string(),
    })
}
