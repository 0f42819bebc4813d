//! PostgreSQL ticket store for the waitline queue core.
//!
//! Every mutating operation runs in a single database transaction that
//! commits the state change, an outbox event, a hash-chained per-ticket
//! event and the idempotency ledger row together. Candidate selection under
//! concurrency relies on `FOR UPDATE SKIP LOCKED`; per-ticket event appends
//! are serialized with a transaction-scoped advisory lock; the routing
//! counters are guarded by a plain row lock.
//!
//! The store performs no retries. Failures surface as
//! [`waitline_core::QueueError`] kinds and retry/backoff is the caller's
//! choice.

#![forbid(unsafe_code)]

pub mod events;
pub mod idempotency;
pub mod numbering;
pub mod routing;
pub mod store;
pub mod sweeper;

pub use routing::{RoutingState, ServicePolicy};
pub use store::{CallNextInput, CreateTicketInput, StoreOptions, TicketActionInput, TicketStore};
pub use sweeper::NoShowSweeper;

use waitline_core::QueueError;

/// Collapse an unexpected database failure into `internal_error`.
pub(crate) fn db_err(err: sqlx::Error) -> QueueError {
    QueueError::internal(format!("database: {err}"))
}
