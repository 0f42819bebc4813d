//! Notification worker for queue events.
//!
//! Tails the outbox with its own cursor, renders channel-specific messages
//! from tenant-overridable templates, and delivers them through per-channel
//! providers with exponential backoff and a dead-letter queue. One failing
//! notification never fails a whole tick.

#![forbid(unsafe_code)]

pub mod provider;
pub mod store;
pub mod template;
pub mod worker;

pub use provider::{Channel, Provider, ProviderSet, ProvidersConfig};
pub use store::{Notification, NotificationStatus, NotificationStore};
pub use worker::{Worker, WorkerConfig};

use thiserror::Error;

/// Notification subsystem failure.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("outbox: {0}")]
    Outbox(#[from] waitline_outbox::OutboxError),

    #[error("provider: {0}")]
    Provider(String),
}
