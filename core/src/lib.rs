//! Domain model for the waitline queue core.
//!
//! This crate holds everything the storage, realtime and notification layers
//! agree on but that has no I/O of its own:
//!
//! - Ticket, status and action types, plus the declarative transition table
//! - The closed set of error kinds surfaced over the wire
//! - Outbox and per-ticket event shapes
//! - The SHA-256 hash chain over a ticket's event log and the rehydrator
//!   that reconstructs ticket state from it

#![forbid(unsafe_code)]

pub mod error;
pub mod event;
pub mod hash;
pub mod rehydrate;
pub mod ticket;
pub mod transitions;

pub use error::QueueError;
pub use event::{EventType, OutboxEvent, TicketEvent};
pub use rehydrate::rehydrate_ticket;
pub use ticket::{Ticket, TicketStatus};
pub use transitions::{valid_transition, TicketAction};
