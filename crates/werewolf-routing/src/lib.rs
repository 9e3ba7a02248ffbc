//! Event routing for the werewolf client.
//!
//! Two pieces cooperate here:
//!
//! - [`SubscriptionManager`] decides which topic patterns the client holds
//!   and guarantees each is subscribed at most once.
//! - [`Dispatcher`] drains the client's delivery channel, classifies every
//!   event by its topic and invokes the matching [`Callbacks`] slot.
//!
//! ```text
//! router ──Delivery──→ channel ──→ Dispatcher ──→ Callbacks
//!                                      │
//!                                      └─(start_game)─→ role hand-off task
//!                                                         ├─ player_listen_topic
//!                                                         ├─ role subscriptions
//!                                                         └─ on_role_affected
//! ```

mod callbacks;
mod dispatcher;
mod subscriptions;

pub use callbacks::Callbacks;
pub use dispatcher::{Dispatcher, DispatcherHandle, RouteContext};
pub use subscriptions::SubscriptionManager;
