//! Protocol vocabulary for the werewolf client.
//!
//! - **Topics** ([`topic`]) — the `com.werewolf` namespace: building
//!   subscription patterns and classifying inbound topics.
//! - **Procedures** ([`Procedure`]) — the remote calls the server exposes.
//! - **Payloads** ([`Player`], [`PhaseEvent`], [`ClosePhaseEvent`]) — the
//!   JSON objects carried by events.
//! - **Errors** ([`ProtocolError`]) — malformed topics and payloads.
//!
//! ```text
//! Transport (InboundEvent) → Protocol (RoutedTopic + payload) → Routing (callbacks)
//! ```

mod error;
mod procedure;
pub mod topic;
mod types;

pub use error::ProtocolError;
pub use procedure::{Procedure, selection_accepted, string_args};
pub use topic::{EventKind, RoutedTopic, Scope, TopicPattern};
pub use types::{
    ClosePhaseEvent, GameIdentity, PhaseChange, PhaseEvent, Player, PlayerState,
    RoleContext, assigned_role, first_arg,
};
