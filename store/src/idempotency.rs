//! Idempotency ledger for mutating actions.
//!
//! Every mutating request carries a `request_id`. A ledger row records the
//! outcome of the first attempt; replays return that outcome instead of
//! reapplying the action. A row with a NULL ticket id records a prior empty
//! result (queue-was-empty, or an action that found nothing to do).

use crate::db_err;
use sqlx::{PgConnection, Row};
use uuid::Uuid;
use waitline_core::{QueueError, TicketAction};

/// Outcome recorded by a previous attempt of the same `(request_id, action)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerHit {
    /// The original attempt produced this ticket.
    Ticket(Uuid),
    /// The original attempt completed with an empty result.
    Empty,
}

/// Look up a prior attempt. Returns `None` on a ledger miss.
pub async fn find_action_request(
    conn: &mut PgConnection,
    action: TicketAction,
    request_id: Uuid,
) -> Result<Option<LedgerHit>, QueueError> {
    let row = sqlx::query(
        r"
        SELECT ticket_id
        FROM ticket_action_requests
        WHERE request_id = $1 AND action = $2
        ",
    )
    .bind(request_id)
    .bind(action.as_str())
    .fetch_optional(conn)
    .await
    .map_err(db_err)?;

    let Some(row) = row else {
        return Ok(None);
    };
    let ticket_id: Option<Uuid> = row.try_get("ticket_id").map_err(db_err)?;
    Ok(Some(ticket_id.map_or(LedgerHit::Empty, LedgerHit::Ticket)))
}

/// Record the outcome of this attempt inside the same transaction as the
/// state change. Duplicate inserts collapse to a no-op.
#[allow(clippy::too_many_arguments)]
pub async fn insert_action_request(
    conn: &mut PgConnection,
    action: TicketAction,
    request_id: Uuid,
    tenant_id: Uuid,
    branch_id: Uuid,
    service_id: Option<Uuid>,
    counter_id: Option<Uuid>,
    ticket_id: Option<Uuid>,
) -> Result<(), QueueError> {
    sqlx::query(
        r"
        INSERT INTO ticket_action_requests
            (request_id, action, tenant_id, branch_id, service_id, counter_id, ticket_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (request_id) DO NOTHING
        ",
    )
    .bind(request_id)
    .bind(action.as_str())
    .bind(tenant_id)
    .bind(branch_id)
    .bind(service_id)
    .bind(counter_id)
    .bind(ticket_id)
    .execute(conn)
    .await
    .map_err(db_err)?;
    Ok(())
}
