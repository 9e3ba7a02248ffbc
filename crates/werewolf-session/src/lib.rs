//! Session gateway for the werewolf client.
//!
//! One [`SessionGateway`] owns the client's single router session and is
//! the only way the rest of the client reaches the network:
//!
//! 1. **Lifecycle** — `Disconnected → Connecting → Connected → Closed`
//!    ([`SessionState`])
//! 2. **Remote calls** — surfaced failures, no retries
//! 3. **Subscriptions** — acknowledged [`SubscriptionRecord`]s
//!
//! # How it fits in the stack
//!
//! ```text
//! Routing (above)   ← subscribes patterns, calls procedures for the dispatcher
//!     ↕
//! Session (this crate)   ← enforces the state machine
//!     ↕
//! Transport (below)   ← Connection trait
//! ```

mod error;
mod gateway;
mod session;

pub use error::SessionError;
pub use gateway::SessionGateway;
pub use session::{SessionConfig, SessionState, SubscriptionRecord};
