//! Outbox and per-ticket event shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Canonical domain event types written to the outbox and the ticket log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Created,
    Called,
    Serving,
    Done,
    Cancelled,
    Held,
    Unheld,
    Recalled,
    Transferred,
    NoShow,
}

impl EventType {
    /// Wire representation (`ticket.<kind>`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "ticket.created",
            Self::Called => "ticket.called",
            Self::Serving => "ticket.serving",
            Self::Done => "ticket.done",
            Self::Cancelled => "ticket.cancelled",
            Self::Held => "ticket.held",
            Self::Unheld => "ticket.unheld",
            Self::Recalled => "ticket.recalled",
            Self::Transferred => "ticket.transferred",
            Self::NoShow => "ticket.no_show",
        }
    }

    /// Parse the wire representation. Unknown types return `None` so
    /// consumers can skip events they do not understand.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ticket.created" => Some(Self::Created),
            "ticket.called" => Some(Self::Called),
            "ticket.serving" => Some(Self::Serving),
            "ticket.done" => Some(Self::Done),
            "ticket.cancelled" => Some(Self::Cancelled),
            "ticket.held" => Some(Self::Held),
            "ticket.unheld" => Some(Self::Unheld),
            "ticket.recalled" => Some(Self::Recalled),
            "ticket.transferred" => Some(Self::Transferred),
            "ticket.no_show" => Some(Self::NoShow),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row of the global outbox, totally ordered by `(created_at, event_id)`
/// within a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub event_id: Uuid,
    pub tenant_id: Uuid,
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A row of a ticket's append-only, hash-chained event log.
///
/// `ticket_seq` is contiguous starting at 1; `prev_hash` of the first row is
/// the empty string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketEvent {
    pub ticket_id: Uuid,
    pub ticket_seq: i32,
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub prev_hash: String,
    pub hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_round_trips() {
        for kind in [
            EventType::Created,
            EventType::Called,
            EventType::Serving,
            EventType::Done,
            EventType::Cancelled,
            EventType::Held,
            EventType::Unheld,
            EventType::Recalled,
            EventType::Transferred,
            EventType::NoShow,
        ] {
            assert_eq!(EventType::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EventType::parse("ticket.unknown"), None);
    }
}
