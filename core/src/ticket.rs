//! Ticket entity and status lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a ticket.
///
/// `Done`, `NoShow` and `Cancelled` are terminal; a ticket holds exactly one
/// non-terminal status at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Waiting,
    Called,
    Serving,
    Done,
    NoShow,
    Cancelled,
    Held,
}

impl TicketStatus {
    /// Database/wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Called => "called",
            Self::Serving => "serving",
            Self::Done => "done",
            Self::NoShow => "no_show",
            Self::Cancelled => "cancelled",
            Self::Held => "held",
        }
    }

    /// Parse the database representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(Self::Waiting),
            "called" => Some(Self::Called),
            "serving" => Some(Self::Serving),
            "done" => Some(Self::Done),
            "no_show" => Some(Self::NoShow),
            "cancelled" => Some(Self::Cancelled),
            "held" => Some(Self::Held),
            _ => None,
        }
    }

    /// Whether the status permits no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::NoShow | Self::Cancelled)
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A queueing ticket.
///
/// Created once per unique `request_id` and mutated only through the actions
/// in the transition table. Never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub ticket_id: Uuid,
    pub ticket_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
    pub tenant_id: Uuid,
    pub branch_id: Uuid,
    pub service_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_id: Option<Uuid>,
    pub status: TicketStatus,
    pub channel: String,
    pub priority_class: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appointment_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counter_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub called_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub served_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub returned: bool,
}

/// Channel a ticket defaults to when the request omits one.
pub const DEFAULT_CHANNEL: &str = "staff";

/// Priority class a ticket defaults to when the request omits one.
pub const DEFAULT_PRIORITY_CLASS: &str = "regular";

/// A physical service point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counter {
    pub counter_id: Uuid,
    pub branch_id: Uuid,
    pub name: String,
    pub status: String,
}

/// A service offered at a branch. The code prefixes display numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub service_id: Uuid,
    pub branch_id: Uuid,
    pub name: String,
    pub code: String,
    pub sla_minutes: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority_policy: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_db_representation() {
        for status in [
            TicketStatus::Waiting,
            TicketStatus::Called,
            TicketStatus::Serving,
            TicketStatus::Done,
            TicketStatus::NoShow,
            TicketStatus::Cancelled,
            TicketStatus::Held,
        ] {
            assert_eq!(TicketStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TicketStatus::parse("unknown"), None);
    }

    #[test]
    fn terminal_statuses() {
        assert!(TicketStatus::Done.is_terminal());
        assert!(TicketStatus::NoShow.is_terminal());
        assert!(TicketStatus::Cancelled.is_terminal());
        assert!(!TicketStatus::Waiting.is_terminal());
        assert!(!TicketStatus::Called.is_terminal());
        assert!(!TicketStatus::Held.is_terminal());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&TicketStatus::NoShow).expect("serialize");
        assert_eq!(json, "\"no_show\"");
    }
}
