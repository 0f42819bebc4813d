//! Ticket state reconstruction from the event log.
//!
//! Walks a ticket's events in sequence, verifies the hash chain and overlays
//! payload fields, later events overriding earlier ones. The result is
//! observationally equivalent to the current store row.

use crate::event::TicketEvent;
use crate::hash::{verify_chain, ChainError};
use crate::ticket::{Ticket, TicketStatus, DEFAULT_CHANNEL, DEFAULT_PRIORITY_CLASS};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

/// Rehydration failure.
#[derive(Debug, Error)]
pub enum RehydrateError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("event seq {seq} has a malformed payload: {source}")]
    MalformedPayload {
        seq: i32,
        source: serde_json::Error,
    },

    #[error("event log never named a ticket id")]
    MissingTicketId,
}

/// Fields a ticket event payload may carry. Everything is optional; absent
/// fields leave the accumulated state untouched.
#[derive(Debug, Default, Deserialize)]
struct EventPayload {
    ticket_id: Option<Uuid>,
    ticket_number: Option<String>,
    tenant_id: Option<Uuid>,
    branch_id: Option<Uuid>,
    service_id: Option<Uuid>,
    to_service_id: Option<Uuid>,
    area_id: Option<Uuid>,
    status: Option<TicketStatus>,
    channel: Option<String>,
    priority_class: Option<String>,
    appointment_id: Option<Uuid>,
    counter_id: Option<Uuid>,
    created_at: Option<DateTime<Utc>>,
    called_at: Option<DateTime<Utc>>,
    served_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    returned: Option<bool>,
}

/// Rebuild a ticket from its ordered event log.
///
/// The chain is verified first; a tampered or gapped log aborts rather than
/// producing a plausible-looking ticket. `transferred` events override
/// `service_id` with `to_service_id`, and a no-show return clears the
/// counter assignment the way the store does.
///
/// # Errors
///
/// Returns [`RehydrateError`] on chain verification failure, malformed
/// payloads, or a log that never identifies its ticket.
pub fn rehydrate_ticket(events: &[TicketEvent]) -> Result<Ticket, RehydrateError> {
    verify_chain(events)?;

    let mut ticket_id = None;
    let mut ticket = Ticket {
        ticket_id: Uuid::nil(),
        ticket_number: String::new(),
        request_id: None,
        tenant_id: Uuid::nil(),
        branch_id: Uuid::nil(),
        service_id: Uuid::nil(),
        area_id: None,
        status: TicketStatus::Waiting,
        channel: DEFAULT_CHANNEL.to_string(),
        priority_class: DEFAULT_PRIORITY_CLASS.to_string(),
        appointment_id: None,
        counter_id: None,
        created_at: DateTime::<Utc>::UNIX_EPOCH,
        called_at: None,
        served_at: None,
        completed_at: None,
        returned: false,
    };

    for event in events {
        let payload: EventPayload = serde_json::from_value(event.payload.clone()).map_err(
            |source| RehydrateError::MalformedPayload {
                seq: event.ticket_seq,
                source,
            },
        )?;

        if let Some(id) = payload.ticket_id {
            ticket_id = Some(id);
            ticket.ticket_id = id;
        }
        if let Some(number) = payload.ticket_number {
            ticket.ticket_number = number;
        }
        if let Some(tenant) = payload.tenant_id {
            ticket.tenant_id = tenant;
        }
        if let Some(branch) = payload.branch_id {
            ticket.branch_id = branch;
        }
        if let Some(service) = payload.service_id {
            ticket.service_id = service;
        }
        if let Some(to_service) = payload.to_service_id {
            ticket.service_id = to_service;
        }
        if let Some(area) = payload.area_id {
            ticket.area_id = Some(area);
        }
        if let Some(status) = payload.status {
            ticket.status = status;
        }
        if let Some(channel) = payload.channel {
            ticket.channel = channel;
        }
        if let Some(class) = payload.priority_class {
            ticket.priority_class = class;
        }
        if let Some(appointment) = payload.appointment_id {
            ticket.appointment_id = Some(appointment);
        }
        if let Some(created) = payload.created_at {
            ticket.created_at = created;
        }
        if let Some(returned) = payload.returned {
            ticket.returned = returned;
        }

        // Counter and call timestamps track the latest event verbatim: a
        // transfer or returned no-show clears them, a call sets them.
        match event.payload.get("counter_id") {
            Some(serde_json::Value::Null) => ticket.counter_id = None,
            Some(_) => ticket.counter_id = payload.counter_id,
            None => {}
        }
        match event.payload.get("called_at") {
            Some(serde_json::Value::Null) => ticket.called_at = None,
            Some(_) => ticket.called_at = payload.called_at,
            None => {}
        }
        if let Some(served) = payload.served_at {
            ticket.served_at = Some(served);
        }
        if let Some(completed) = payload.completed_at {
            ticket.completed_at = Some(completed);
        }
    }

    if ticket_id.is_none() {
        return Err(RehydrateError::MissingTicketId);
    }
    Ok(ticket)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{compute_event_hash, payload_bytes};
    use serde_json::json;

    fn append(events: &mut Vec<TicketEvent>, ticket_id: Uuid, kind: &str, payload: serde_json::Value) {
        let seq = i32::try_from(events.len()).unwrap() + 1;
        let prev = events.last().map_or(String::new(), |e| e.hash.clone());
        let created_at = Utc::now();
        let hash = compute_event_hash(
            &prev,
            ticket_id,
            kind,
            &payload_bytes(&payload),
            created_at,
            seq,
        );
        events.push(TicketEvent {
            ticket_id,
            ticket_seq: seq,
            event_type: kind.to_string(),
            payload,
            created_at,
            prev_hash: prev,
            hash,
        });
    }

    #[test]
    fn full_lifecycle_rehydrates_to_done() {
        let ticket_id = Uuid::new_v4();
        let tenant_id = Uuid::new_v4();
        let branch_id = Uuid::new_v4();
        let service_id = Uuid::new_v4();
        let counter_id = Uuid::new_v4();
        let created = Utc::now();
        let called = created + chrono::Duration::seconds(30);
        let served = called + chrono::Duration::seconds(10);
        let completed = served + chrono::Duration::seconds(120);

        let mut events = Vec::new();
        append(&mut events, ticket_id, "ticket.created", json!({
            "ticket_id": ticket_id, "ticket_number": "CS-001", "status": "waiting",
            "tenant_id": tenant_id, "branch_id": branch_id, "service_id": service_id,
            "created_at": created,
        }));
        append(&mut events, ticket_id, "ticket.called", json!({
            "ticket_id": ticket_id, "status": "called",
            "called_at": called, "counter_id": counter_id,
        }));
        append(&mut events, ticket_id, "ticket.serving", json!({
            "ticket_id": ticket_id, "status": "serving", "served_at": served,
        }));
        append(&mut events, ticket_id, "ticket.done", json!({
            "ticket_id": ticket_id, "status": "done", "completed_at": completed,
        }));

        let ticket = rehydrate_ticket(&events).expect("rehydrate");
        assert_eq!(ticket.ticket_id, ticket_id);
        assert_eq!(ticket.ticket_number, "CS-001");
        assert_eq!(ticket.status, TicketStatus::Done);
        assert_eq!(ticket.counter_id, Some(counter_id));
        assert_eq!(ticket.called_at, Some(called));
        assert_eq!(ticket.served_at, Some(served));
        assert_eq!(ticket.completed_at, Some(completed));
    }

    #[test]
    fn transfer_overrides_service_and_clears_counter() {
        let ticket_id = Uuid::new_v4();
        let from_service = Uuid::new_v4();
        let to_service = Uuid::new_v4();
        let counter_id = Uuid::new_v4();

        let mut events = Vec::new();
        append(&mut events, ticket_id, "ticket.created", json!({
            "ticket_id": ticket_id, "status": "waiting", "service_id": from_service,
        }));
        append(&mut events, ticket_id, "ticket.called", json!({
            "ticket_id": ticket_id, "status": "called",
            "counter_id": counter_id, "called_at": Utc::now(),
        }));
        append(&mut events, ticket_id, "ticket.transferred", json!({
            "ticket_id": ticket_id, "status": "waiting",
            "from_service_id": from_service, "to_service_id": to_service,
            "counter_id": null, "called_at": null,
        }));

        let ticket = rehydrate_ticket(&events).expect("rehydrate");
        assert_eq!(ticket.service_id, to_service);
        assert_eq!(ticket.status, TicketStatus::Waiting);
        assert_eq!(ticket.counter_id, None);
        assert_eq!(ticket.called_at, None);
    }

    #[test]
    fn tampered_log_refuses_to_rehydrate() {
        let ticket_id = Uuid::new_v4();
        let mut events = Vec::new();
        append(&mut events, ticket_id, "ticket.created", json!({
            "ticket_id": ticket_id, "status": "waiting",
        }));
        append(&mut events, ticket_id, "ticket.cancelled", json!({
            "ticket_id": ticket_id, "status": "cancelled",
        }));
        events[0].payload = json!({"ticket_id": ticket_id, "status": "done"});

        assert!(matches!(
            rehydrate_ticket(&events),
            Err(RehydrateError::Chain(ChainError::HashMismatch { seq: 1 }))
        ));
    }

    #[test]
    fn returned_no_show_goes_back_to_waiting() {
        let ticket_id = Uuid::new_v4();
        let counter_id = Uuid::new_v4();
        let mut events = Vec::new();
        append(&mut events, ticket_id, "ticket.created", json!({
            "ticket_id": ticket_id, "status": "waiting",
        }));
        append(&mut events, ticket_id, "ticket.called", json!({
            "ticket_id": ticket_id, "status": "called",
            "counter_id": counter_id, "called_at": Utc::now(),
        }));
        append(&mut events, ticket_id, "ticket.no_show", json!({
            "ticket_id": ticket_id, "status": "waiting", "returned": true,
            "counter_id": null, "called_at": null,
        }));

        let ticket = rehydrate_ticket(&events).expect("rehydrate");
        assert_eq!(ticket.status, TicketStatus::Waiting);
        assert!(ticket.returned);
        assert_eq!(ticket.counter_id, None);
        assert_eq!(ticket.called_at, None);
    }
}
