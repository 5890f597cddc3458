//! Trailpost moderation fan-out.
//!
//! - [`EventBus`]: in-process publish/subscribe hub for typed
//!   [`ModerationEvent`]s, backed by `tokio::sync::broadcast`.
//! - [`CrossTabChannel`] / [`CrossTabBridge`]: the shared broadcast key
//!   that carries the last fan-out payload between sessions of the same
//!   client.
//! - [`NotificationCenter`]: per-recipient notification history with
//!   read/unread tracking and reconciliation of the server feed.
//! - [`ConsistencySweep`]: bounded, backed-off re-query of a feed after
//!   a transition.

pub mod broadcast;
pub mod bus;
pub mod notifications;
pub mod sweep;

pub use broadcast::{CrossTabBridge, CrossTabChannel, TabId, BROADCAST_KEY};
pub use bus::{Envelope, EventBus, EventSubject, ModerationEvent, Origin};
pub use notifications::NotificationCenter;
pub use sweep::{ConsistencySweep, RetryPolicy, SweepOutcome};
