//! The application-facing callback record.
//!
//! An embedding application registers only the callbacks it cares about.
//! Each slot is optional; an empty slot means the event is still parsed
//! but nothing is invoked.

use std::fmt;

use werewolf_protocol::{ClosePhaseEvent, PhaseChange, Player};
use werewolf_session::SessionError;

type Handler<T> = Box<dyn Fn(T) + Send + Sync>;
type PairHandler<A, B> = Box<dyn Fn(A, B) + Send + Sync>;

/// Optional handlers, one per event the client reports.
///
/// ```rust
/// use werewolf_routing::Callbacks;
///
/// let callbacks = Callbacks::new()
///     .on_role_affected(|role| println!("you are a {role}"))
///     .on_player_join(|players| println!("{} players", players.len()));
/// assert!(callbacks.is_registered("on_role_affected"));
/// assert!(!callbacks.is_registered("on_close_phase"));
/// ```
#[derive(Default)]
pub struct Callbacks {
    selected_player: Option<Handler<Player>>,
    enter_in_phase: Option<Handler<PhaseChange>>,
    role_affected: Option<Handler<String>>,
    player_selectable: Option<PairHandler<Vec<Player>, Vec<Player>>>,
    player_join: Option<Handler<Vec<Player>>>,
    close_phase: Option<Handler<ClosePhaseEvent>>,
    error: Option<Handler<SessionError>>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// A vote landed on a player.
    #[must_use]
    pub fn on_selected_player(mut self, f: impl Fn(Player) + Send + Sync + 'static) -> Self {
        self.selected_player = Some(Box::new(f));
        self
    }

    /// A phase started and announced whether it is night.
    #[must_use]
    pub fn on_enter_in_phase(mut self, f: impl Fn(PhaseChange) + Send + Sync + 'static) -> Self {
        self.enter_in_phase = Some(Box::new(f));
        self
    }

    /// The server assigned this player a role and role events now flow.
    #[must_use]
    pub fn on_role_affected(mut self, f: impl Fn(String) + Send + Sync + 'static) -> Self {
        self.role_affected = Some(Box::new(f));
        self
    }

    /// A phase published who may vote (`active`) and for whom (`selectable`).
    #[must_use]
    pub fn on_player_selectable(
        mut self,
        f: impl Fn(Vec<Player>, Vec<Player>) + Send + Sync + 'static,
    ) -> Self {
        self.player_selectable = Some(Box::new(f));
        self
    }

    /// The player list changed; receives the full current list.
    #[must_use]
    pub fn on_player_join(mut self, f: impl Fn(Vec<Player>) + Send + Sync + 'static) -> Self {
        self.player_join = Some(Box::new(f));
        self
    }

    /// A phase ended with its casualties and, at the end, the winner.
    #[must_use]
    pub fn on_close_phase(mut self, f: impl Fn(ClosePhaseEvent) + Send + Sync + 'static) -> Self {
        self.close_phase = Some(Box::new(f));
        self
    }

    /// Background work started by an event failed (the role hand-off after
    /// `start_game`). Without this handler such failures are only logged.
    #[must_use]
    pub fn on_error(mut self, f: impl Fn(SessionError) + Send + Sync + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }

    /// Returns `true` if the named slot (e.g. `"on_close_phase"`) is filled.
    pub fn is_registered(&self, name: &str) -> bool {
        self.registered().contains(&name)
    }

    fn registered(&self) -> Vec<&'static str> {
        [
            ("on_selected_player", self.selected_player.is_some()),
            ("on_enter_in_phase", self.enter_in_phase.is_some()),
            ("on_role_affected", self.role_affected.is_some()),
            ("on_player_selectable", self.player_selectable.is_some()),
            ("on_player_join", self.player_join.is_some()),
            ("on_close_phase", self.close_phase.is_some()),
            ("on_error", self.error.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, present)| present.then_some(name))
        .collect()
    }

    // -- dispatch: each returns whether a handler ran --

    pub(crate) fn selected_player(&self, player: Player) -> bool {
        fire(&self.selected_player, player)
    }

    pub(crate) fn enter_in_phase(&self, change: PhaseChange) -> bool {
        fire(&self.enter_in_phase, change)
    }

    pub(crate) fn role_affected(&self, role: String) -> bool {
        fire(&self.role_affected, role)
    }

    pub(crate) fn player_selectable(&self, selectable: Vec<Player>, active: Vec<Player>) -> bool {
        match &self.player_selectable {
            Some(f) => {
                f(selectable, active);
                true
            }
            None => false,
        }
    }

    pub(crate) fn player_join(&self, players: Vec<Player>) -> bool {
        fire(&self.player_join, players)
    }

    pub(crate) fn close_phase(&self, event: ClosePhaseEvent) -> bool {
        fire(&self.close_phase, event)
    }

    pub(crate) fn error(&self, error: SessionError) {
        if let Some(f) = &self.error {
            f(error);
        } else {
            tracing::error!(%error, "unhandled background error");
        }
    }
}

fn fire<T>(handler: &Option<Handler<T>>, value: T) -> bool {
    match handler {
        Some(f) => {
            f(value);
            true
        }
        None => false,
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("registered", &self.registered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_empty_record_fires_nothing() {
        let callbacks = Callbacks::new();
        assert!(!callbacks.selected_player(Player::named("a")));
        assert!(!callbacks.player_selectable(vec![], vec![]));
        assert!(!callbacks.close_phase(ClosePhaseEvent::default()));
    }

    #[test]
    fn test_registered_handler_fires() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let callbacks = Callbacks::new().on_player_join(move |players| {
            counter.fetch_add(players.len(), Ordering::SeqCst);
        });

        assert!(callbacks.player_join(vec![Player::named("a"), Player::named("b")]));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_debug_lists_registered_slots() {
        let callbacks = Callbacks::new().on_error(|_| {}).on_close_phase(|_| {});
        let debug = format!("{callbacks:?}");
        assert!(debug.contains("on_close_phase"));
        assert!(debug.contains("on_error"));
        assert!(!debug.contains("on_player_join"));
    }

    #[test]
    fn test_later_registration_replaces_earlier() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let callbacks = Callbacks::new()
            .on_role_affected(|_| panic!("replaced handler must not run"))
            .on_role_affected(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        callbacks.role_affected("seer".into());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
