//! # Werewolf
//!
//! Client-side event routing and subscription lifecycle for online
//! werewolf games played over a publish/subscribe + remote-call router.
//!
//! A [`GameClient`] owns one router session. Creating or joining a game
//! subscribes its topics; every event published on them is decoded and
//! handed to the [`Callbacks`](werewolf_routing::Callbacks) the embedding
//! application registered. When the server assigns this player a role,
//! the client finishes the hand-off on its own and the role's topics start
//! flowing too.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use werewolf::prelude::*;
//!
//! # async fn run() -> Result<(), WerewolfError> {
//! let client = GameClientBuilder::new()
//!     .url("ws://localhost:8081/ws")
//!     .realm("realm1")
//!     .callbacks(
//!         Callbacks::new()
//!             .on_player_join(|players| println!("{} players", players.len()))
//!             .on_role_affected(|role| println!("you are a {role}")),
//!     )
//!     .build(LocalRouter::new("realm1"));
//!
//! client.connect().await?;
//! client.join_game("village", "alice").await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;

pub use client::{ClientConfig, GameClient, GameClientBuilder};
pub use error::WerewolfError;

pub use werewolf_protocol as protocol;
pub use werewolf_routing as routing;
pub use werewolf_session as session;
pub use werewolf_transport as transport;

/// Everything an embedding application usually needs.
pub mod prelude {
    pub use crate::{ClientConfig, GameClient, GameClientBuilder, WerewolfError};
    pub use werewolf_protocol::{
        ClosePhaseEvent, GameIdentity, PhaseChange, Player, PlayerState,
    };
    pub use werewolf_routing::Callbacks;
    pub use werewolf_session::{SessionConfig, SessionError, SessionState};
    pub use werewolf_transport::{Connection, LocalRouter, Transport};
}
