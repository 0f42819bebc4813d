//! Real-time fan-out for queue events.
//!
//! A single hub process accepts long-lived WebSocket sessions, validates
//! their scope against the session/access collaborator, and multiplexes
//! outbox events to matching subscriptions. A background poller tails the
//! outbox with a compound cursor and drives the broadcasts; clients that
//! fall behind have messages dropped and resync over REST snapshots.

#![forbid(unsafe_code)]

pub mod hub;
pub mod poller;
pub mod session;
pub mod socket;

pub use hub::{Hub, Subscription};
pub use poller::BroadcastPoller;
pub use session::{AccessSets, Session, SessionStore};
pub use socket::{realtime_handler, RealtimeState};

use thiserror::Error;

/// Realtime subsystem failure.
#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),
}
