//! Outbox writer and per-ticket hash log.
//!
//! Both appends happen inside the caller's transaction, so a rollback leaves
//! the outbox, the event log and the ticket row consistent. The per-ticket
//! append takes a transaction-scoped advisory lock keyed by the ticket id:
//! two transactions touching the same ticket serialize on the log, all other
//! concurrency is unimpeded.

use crate::db_err;
use chrono::{SubsecRound, Utc};
use serde_json::{json, Value};
use sqlx::{PgConnection, Row};
use uuid::Uuid;
use waitline_core::hash::{compute_event_hash, payload_bytes};
use waitline_core::{EventType, QueueError, Ticket};

/// Append one domain event to the outbox and the ticket's hash-chained log.
pub async fn append_event(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    ticket_id: Uuid,
    kind: EventType,
    payload: Value,
) -> Result<(), QueueError> {
    sqlx::query(
        r"
        INSERT INTO outbox_events (event_id, tenant_id, type, payload_json, created_at)
        VALUES ($1, $2, $3, $4, $5)
        ",
    )
    .bind(Uuid::new_v4())
    .bind(tenant_id)
    .bind(kind.as_str())
    .bind(&payload)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;

    append_ticket_event(conn, ticket_id, kind, &payload).await
}

/// Append the hash-chained row for one ticket event.
async fn append_ticket_event(
    conn: &mut PgConnection,
    ticket_id: Uuid,
    kind: EventType,
    payload: &Value,
) -> Result<(), QueueError> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(ticket_id.to_string())
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;

    let last = sqlx::query(
        r"
        SELECT ticket_seq, hash
        FROM ticket_events
        WHERE ticket_id = $1
        ORDER BY ticket_seq DESC
        LIMIT 1
        FOR UPDATE
        ",
    )
    .bind(ticket_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_err)?;

    let (last_seq, prev_hash) = match last {
        Some(row) => (
            row.try_get::<i32, _>("ticket_seq").map_err(db_err)?,
            row.try_get::<String, _>("hash").map_err(db_err)?,
        ),
        None => (0, String::new()),
    };

    let next_seq = last_seq + 1;
    // timestamptz keeps microseconds; hash the exact value the row will
    // read back as, or verification over stored rows would fail.
    let created_at = Utc::now().trunc_subsecs(6);
    let hash = compute_event_hash(
        &prev_hash,
        ticket_id,
        kind.as_str(),
        &payload_bytes(payload),
        created_at,
        next_seq,
    );

    sqlx::query(
        r"
        INSERT INTO ticket_events (ticket_id, ticket_seq, type, payload, created_at, prev_hash, hash)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ",
    )
    .bind(ticket_id)
    .bind(next_seq)
    .bind(kind.as_str())
    .bind(payload)
    .bind(created_at)
    .bind(prev_hash)
    .bind(hash)
    .execute(conn)
    .await
    .map_err(db_err)?;

    Ok(())
}

/// Payload for `ticket.created`. Any field named `phone` carries only the
/// SHA-256 hash; the raw phone never leaves the request.
#[must_use]
pub fn created_payload(ticket: &Ticket, phone_hash: Option<&str>) -> Value {
    json!({
        "ticket_id": ticket.ticket_id,
        "ticket_number": ticket.ticket_number,
        "status": ticket.status,
        "created_at": ticket.created_at,
        "request_id": ticket.request_id,
        "tenant_id": ticket.tenant_id,
        "branch_id": ticket.branch_id,
        "service_id": ticket.service_id,
        "area_id": ticket.area_id,
        "channel": ticket.channel,
        "priority_class": ticket.priority_class,
        "appointment_id": ticket.appointment_id,
        "phone": phone_hash,
    })
}

/// Payload for `ticket.called`.
#[must_use]
pub fn called_payload(ticket: &Ticket) -> Value {
    json!({
        "ticket_id": ticket.ticket_id,
        "ticket_number": ticket.ticket_number,
        "status": ticket.status,
        "called_at": ticket.called_at,
        "counter_id": ticket.counter_id,
        "request_id": ticket.request_id,
        "tenant_id": ticket.tenant_id,
        "branch_id": ticket.branch_id,
        "service_id": ticket.service_id,
        "area_id": ticket.area_id,
        "priority_class": ticket.priority_class,
    })
}

/// Payload shared by the one-shot status transitions (serving, done,
/// cancelled, held, unheld, recalled).
#[must_use]
pub fn status_payload(ticket: &Ticket) -> Value {
    json!({
        "ticket_id": ticket.ticket_id,
        "ticket_number": ticket.ticket_number,
        "status": ticket.status,
        "request_id": ticket.request_id,
        "called_at": ticket.called_at,
        "served_at": ticket.served_at,
        "completed_at": ticket.completed_at,
        "counter_id": ticket.counter_id,
        "tenant_id": ticket.tenant_id,
        "branch_id": ticket.branch_id,
        "service_id": ticket.service_id,
        "area_id": ticket.area_id,
    })
}

/// Payload for `ticket.transferred`. Explicit nulls for the cleared counter
/// assignment keep rehydration in lock-step with the store row.
#[must_use]
pub fn transfer_payload(
    ticket: &Ticket,
    from_service_id: Uuid,
    to_service_id: Uuid,
    reason: Option<&str>,
) -> Value {
    let mut payload = json!({
        "ticket_id": ticket.ticket_id,
        "ticket_number": ticket.ticket_number,
        "status": ticket.status,
        "request_id": ticket.request_id,
        "from_service_id": from_service_id,
        "to_service_id": to_service_id,
        "tenant_id": ticket.tenant_id,
        "branch_id": ticket.branch_id,
        "service_id": ticket.service_id,
        "area_id": ticket.area_id,
        "counter_id": null,
    });
    if let Some(reason) = reason {
        payload["reason"] = Value::String(reason.to_string());
    }
    payload
}

/// Payload for `ticket.no_show`, carrying whether the ticket was returned to
/// the queue.
#[must_use]
pub fn no_show_payload(ticket: &Ticket, returned: bool) -> Value {
    json!({
        "ticket_id": ticket.ticket_id,
        "ticket_number": ticket.ticket_number,
        "status": ticket.status,
        "request_id": ticket.request_id,
        "called_at": ticket.called_at,
        "counter_id": ticket.counter_id,
        "returned": returned,
        "tenant_id": ticket.tenant_id,
        "branch_id": ticket.branch_id,
        "service_id": ticket.service_id,
        "area_id": ticket.area_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use waitline_core::TicketStatus;

    fn ticket() -> Ticket {
        Ticket {
            ticket_id: Uuid::new_v4(),
            ticket_number: "CS-001".to_string(),
            request_id: Some(Uuid::new_v4()),
            tenant_id: Uuid::new_v4(),
            branch_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            area_id: None,
            status: TicketStatus::Waiting,
            channel: "kiosk".to_string(),
            priority_class: "regular".to_string(),
            appointment_id: None,
            counter_id: None,
            created_at: Utc::now(),
            called_at: None,
            served_at: None,
            completed_at: None,
            returned: false,
        }
    }

    #[test]
    fn created_payload_carries_scoping_fields() {
        let t = ticket();
        let payload = created_payload(&t, Some("abc123"));
        assert_eq!(payload["ticket_number"], "CS-001");
        assert_eq!(payload["status"], "waiting");
        assert_eq!(payload["tenant_id"], json!(t.tenant_id));
        assert_eq!(payload["branch_id"], json!(t.branch_id));
        assert_eq!(payload["service_id"], json!(t.service_id));
        assert_eq!(payload["phone"], "abc123");
    }

    #[test]
    fn created_payload_never_carries_a_raw_phone() {
        let payload = created_payload(&ticket(), None);
        assert!(payload["phone"].is_null());
    }

    #[test]
    fn transfer_payload_clears_the_assignment() {
        let mut t = ticket();
        t.status = TicketStatus::Waiting;
        let from = Uuid::new_v4();
        let to = Uuid::new_v4();
        let payload = transfer_payload(&t, from, to, Some("wrong desk"));
        assert_eq!(payload["from_service_id"], json!(from));
        assert_eq!(payload["to_service_id"], json!(to));
        assert_eq!(payload["reason"], "wrong desk");
        assert_eq!(payload.get("counter_id"), Some(&Value::Null));
    }

    #[test]
    fn transfer_payload_omits_absent_reason() {
        let payload = transfer_payload(&ticket(), Uuid::new_v4(), Uuid::new_v4(), None);
        assert!(payload.get("reason").is_none());
    }

    #[test]
    fn no_show_payload_flags_the_return() {
        let payload = no_show_payload(&ticket(), true);
        assert_eq!(payload["returned"], true);
    }
}
