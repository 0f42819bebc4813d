//! Transactional ticket store.
//!
//! Public contract of the state machine: every mutating operation commits
//! the ticket change, the outbox event, the hash-chained ticket event and
//! the idempotency row in one transaction. Reads are single statements and
//! take no locks.

use crate::events::{
    append_event, called_payload, created_payload, no_show_payload, status_payload,
    transfer_payload,
};
use crate::idempotency::{find_action_request, insert_action_request, LedgerHit};
use crate::numbering::{format_ticket_number, next_ticket_number};
use crate::routing::{
    advance_state, plan_call, CandidatePool, ClassPreference, RoutingState, ServicePolicy,
};
use crate::{db_err, sweeper};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;
use waitline_core::ticket::{Counter, Service, DEFAULT_CHANNEL, DEFAULT_PRIORITY_CLASS};
use waitline_core::{
    valid_transition, EventType, OutboxEvent, QueueError, Ticket, TicketAction, TicketEvent,
    TicketStatus,
};

/// Store-wide defaults applied when a per-service policy row is absent.
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// System default for returning no-show tickets to the queue.
    pub no_show_return_to_queue: bool,
    /// Consecutive non-regular calls before regular tickets are preferred.
    pub priority_streak_limit: i32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            no_show_return_to_queue: false,
            priority_streak_limit: 3,
        }
    }
}

/// Input for [`TicketStore::create_ticket`].
#[derive(Debug, Clone)]
pub struct CreateTicketInput {
    pub request_id: Uuid,
    pub tenant_id: Uuid,
    pub branch_id: Uuid,
    pub service_id: Uuid,
    pub area_id: Option<Uuid>,
    pub channel: Option<String>,
    pub priority_class: Option<String>,
    pub phone: Option<String>,
}

/// Input for [`TicketStore::call_next`].
#[derive(Debug, Clone, Copy)]
pub struct CallNextInput {
    pub request_id: Uuid,
    pub tenant_id: Uuid,
    pub branch_id: Uuid,
    pub service_id: Uuid,
    pub counter_id: Uuid,
}

/// Input for the single-ticket actions (start, complete, cancel, recall,
/// hold, unhold, transfer, no-show).
#[derive(Debug, Clone)]
pub struct TicketActionInput {
    pub request_id: Uuid,
    pub tenant_id: Uuid,
    pub branch_id: Uuid,
    pub ticket_id: Uuid,
    pub counter_id: Option<Uuid>,
    pub to_service_id: Option<Uuid>,
    pub reason: Option<String>,
}

/// PostgreSQL-backed ticket store.
#[derive(Clone)]
pub struct TicketStore {
    pool: PgPool,
    options: StoreOptions,
}

impl TicketStore {
    /// Create a store over an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool, options: StoreOptions) -> Self {
        Self { pool, options }
    }

    /// The underlying pool, shared with the background tasks.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub(crate) const fn options(&self) -> StoreOptions {
        self.options
    }

    /// Create a waiting ticket, allocating the next display number.
    ///
    /// Replays of the same `request_id` return the original ticket
    /// unchanged. A phone, if given, is stored as a SHA-256 hex digest; the
    /// raw value is never persisted.
    pub async fn create_ticket(&self, input: CreateTicketInput) -> Result<Ticket, QueueError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        if let Some(existing) = find_ticket_by_request_id(&mut tx, input.request_id).await? {
            tx.commit().await.map_err(db_err)?;
            return Ok(existing);
        }

        let service_code =
            lookup_service_code(&mut tx, input.tenant_id, input.branch_id, input.service_id)
                .await?;
        let seq = next_ticket_number(&mut tx, input.branch_id, input.service_id).await?;
        let ticket_number = format_ticket_number(&service_code, seq);

        let channel = input
            .channel
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CHANNEL.to_string());
        let priority_class = input
            .priority_class
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_PRIORITY_CLASS.to_string());
        let phone_hash = input.phone.as_deref().and_then(hash_phone);

        let row = sqlx::query(&select_columns(
            r"
            INSERT INTO tickets (
                ticket_id, request_id, ticket_number, tenant_id, branch_id, service_id,
                area_id, status, channel, priority_class, created_at, phone_hash
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (request_id) DO NOTHING
            RETURNING ",
            "",
        ))
        .bind(Uuid::new_v4())
        .bind(input.request_id)
        .bind(&ticket_number)
        .bind(input.tenant_id)
        .bind(input.branch_id)
        .bind(input.service_id)
        .bind(input.area_id)
        .bind(TicketStatus::Waiting.as_str())
        .bind(&channel)
        .bind(&priority_class)
        .bind(Utc::now())
        .bind(phone_hash.as_deref())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let ticket = match row {
            Some(row) => ticket_from_row(&row)?,
            // Lost a race on the request_id unique constraint: the winner's
            // row is the idempotent answer.
            None => {
                let existing = find_ticket_by_request_id(&mut tx, input.request_id)
                    .await?
                    .ok_or_else(|| QueueError::internal("create race left no ticket row"))?;
                tx.commit().await.map_err(db_err)?;
                return Ok(existing);
            }
        };

        append_event(
            &mut tx,
            input.tenant_id,
            ticket.ticket_id,
            EventType::Created,
            created_payload(&ticket, phone_hash.as_deref()),
        )
        .await?;

        tx.commit().await.map_err(db_err)?;
        metrics::counter!("waitline_tickets_created_total").increment(1);
        Ok(ticket)
    }

    /// Check in a scheduled appointment, producing a kiosk ticket carrying
    /// the appointment reference.
    pub async fn check_in_appointment(
        &self,
        request_id: Uuid,
        tenant_id: Uuid,
        branch_id: Uuid,
        appointment_id: Uuid,
    ) -> Result<Ticket, QueueError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        if let Some(existing) = find_ticket_by_request_id(&mut tx, request_id).await? {
            tx.commit().await.map_err(db_err)?;
            return Ok(existing);
        }

        let row = sqlx::query(
            r"
            SELECT service_id, scheduled_at::date AS scheduled_date
            FROM appointments
            WHERE appointment_id = $1 AND tenant_id = $2 AND branch_id = $3
                AND status = 'scheduled'
            ",
        )
        .bind(appointment_id)
        .bind(tenant_id)
        .bind(branch_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?
        .ok_or(QueueError::TicketNotFound)?;

        let service_id: Uuid = row.try_get("service_id").map_err(db_err)?;
        let scheduled_date: chrono::NaiveDate = row.try_get("scheduled_date").map_err(db_err)?;

        let holiday: bool = sqlx::query(
            r"
            SELECT EXISTS (
                SELECT 1 FROM holidays
                WHERE tenant_id = $1 AND branch_id = $2 AND date = $3
            ) AS closed
            ",
        )
        .bind(tenant_id)
        .bind(branch_id)
        .bind(scheduled_date)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?
        .try_get("closed")
        .map_err(db_err)?;
        if holiday {
            return Err(QueueError::HolidayClosed);
        }

        sqlx::query("UPDATE appointments SET status = 'checked_in' WHERE appointment_id = $1")
            .bind(appointment_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        let service_code = lookup_service_code(&mut tx, tenant_id, branch_id, service_id).await?;
        let seq = next_ticket_number(&mut tx, branch_id, service_id).await?;
        let ticket_number = format_ticket_number(&service_code, seq);

        let row = sqlx::query(&select_columns(
            r"
            INSERT INTO tickets (
                ticket_id, request_id, ticket_number, tenant_id, branch_id, service_id,
                status, channel, priority_class, created_at, appointment_id
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING ",
            "",
        ))
        .bind(Uuid::new_v4())
        .bind(request_id)
        .bind(&ticket_number)
        .bind(tenant_id)
        .bind(branch_id)
        .bind(service_id)
        .bind(TicketStatus::Waiting.as_str())
        .bind("kiosk")
        .bind(DEFAULT_PRIORITY_CLASS)
        .bind(Utc::now())
        .bind(appointment_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;
        let ticket = ticket_from_row(&row)?;

        append_event(
            &mut tx,
            tenant_id,
            ticket.ticket_id,
            EventType::Created,
            created_payload(&ticket, None),
        )
        .await?;

        tx.commit().await.map_err(db_err)?;
        metrics::counter!("waitline_tickets_created_total").increment(1);
        Ok(ticket)
    }

    /// Select the next waiting ticket for a counter and transition it to
    /// `called`.
    ///
    /// Selection runs the routing plan (boost, ratio, walk-in, fallback)
    /// with skip-locked candidate queries, so concurrent dispatchers on the
    /// same service receive distinct tickets. An empty queue records a NULL
    /// ledger row and fails `queue_empty`; replays of that request fail the
    /// same way.
    pub async fn call_next(&self, input: CallNextInput) -> Result<Ticket, QueueError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        match find_action_request(&mut tx, TicketAction::CallNext, input.request_id).await? {
            Some(LedgerHit::Ticket(ticket_id)) => {
                let ticket =
                    get_ticket_row(&mut tx, input.tenant_id, input.branch_id, ticket_id).await?;
                tx.commit().await.map_err(db_err)?;
                return Ok(ticket);
            }
            Some(LedgerHit::Empty) => {
                tx.commit().await.map_err(db_err)?;
                return Err(QueueError::QueueEmpty);
            }
            None => {}
        }

        ensure_service_active(&mut tx, input.tenant_id, input.branch_id, input.service_id).await?;

        if !counter_allows_service(&mut tx, input.counter_id, input.service_id).await? {
            return Err(QueueError::AccessDenied);
        }
        let counter_status = get_counter_status(&mut tx, input.counter_id, input.branch_id).await?;
        if !counter_is_available(&counter_status) {
            return Err(QueueError::CounterUnavailable);
        }

        let called_at = Utc::now();
        let state = lock_routing_state(
            &mut tx,
            input.tenant_id,
            input.branch_id,
            input.service_id,
        )
        .await?;
        let policy =
            get_service_policy(&mut tx, input.tenant_id, input.branch_id, input.service_id)
                .await?;

        let plan = plan_call(
            policy.as_ref(),
            &state,
            called_at,
            self.options.priority_streak_limit,
        );

        let Some((ticket, is_appointment)) =
            select_next_ticket(&mut tx, &input, called_at, &plan).await?
        else {
            insert_action_request(
                &mut tx,
                TicketAction::CallNext,
                input.request_id,
                input.tenant_id,
                input.branch_id,
                Some(input.service_id),
                Some(input.counter_id),
                None,
            )
            .await?;
            tx.commit().await.map_err(db_err)?;
            return Err(QueueError::QueueEmpty);
        };

        insert_action_request(
            &mut tx,
            TicketAction::CallNext,
            input.request_id,
            input.tenant_id,
            input.branch_id,
            Some(input.service_id),
            Some(input.counter_id),
            Some(ticket.ticket_id),
        )
        .await?;

        // A stored window that already completed counts as fresh before the
        // counters advance.
        let mut normalized = state;
        if normalized.total_served >= plan.window {
            normalized.total_served = 0;
            normalized.appointment_served = 0;
        }
        let next_state = advance_state(
            &normalized,
            &ticket.priority_class,
            is_appointment,
            plan.window,
        );
        save_routing_state(
            &mut tx,
            input.tenant_id,
            input.branch_id,
            input.service_id,
            next_state,
        )
        .await?;

        let mut ticket = ticket;
        ticket.request_id = Some(input.request_id);
        append_event(
            &mut tx,
            input.tenant_id,
            ticket.ticket_id,
            EventType::Called,
            called_payload(&ticket),
        )
        .await?;

        tx.commit().await.map_err(db_err)?;
        metrics::counter!("waitline_tickets_called_total").increment(1);
        Ok(ticket)
    }

    /// `called → serving`, stamping `served_at`. The supplied counter must
    /// match the assignment.
    pub async fn start_serving(&self, input: TicketActionInput) -> Result<Ticket, QueueError> {
        self.update_ticket_status(
            input,
            TicketAction::StartServing,
            TicketStatus::Called,
            TicketStatus::Serving,
            EventType::Serving,
            Some("served_at"),
            true,
        )
        .await
    }

    /// `serving → done`, stamping `completed_at`.
    pub async fn complete(&self, input: TicketActionInput) -> Result<Ticket, QueueError> {
        self.update_ticket_status(
            input,
            TicketAction::Complete,
            TicketStatus::Serving,
            TicketStatus::Done,
            EventType::Done,
            Some("completed_at"),
            false,
        )
        .await
    }

    /// `waiting → cancelled`.
    pub async fn cancel(&self, input: TicketActionInput) -> Result<Ticket, QueueError> {
        self.update_ticket_status(
            input,
            TicketAction::Cancel,
            TicketStatus::Waiting,
            TicketStatus::Cancelled,
            EventType::Cancelled,
            None,
            false,
        )
        .await
    }

    /// `waiting → held`.
    pub async fn hold(&self, input: TicketActionInput) -> Result<Ticket, QueueError> {
        self.update_ticket_status(
            input,
            TicketAction::Hold,
            TicketStatus::Waiting,
            TicketStatus::Held,
            EventType::Held,
            None,
            false,
        )
        .await
    }

    /// `held → waiting`.
    pub async fn unhold(&self, input: TicketActionInput) -> Result<Ticket, QueueError> {
        self.update_ticket_status(
            input,
            TicketAction::Unhold,
            TicketStatus::Held,
            TicketStatus::Waiting,
            EventType::Unheld,
            None,
            false,
        )
        .await
    }

    /// Re-announce a called ticket. Changes no columns; emits
    /// `ticket.recalled`.
    pub async fn recall(&self, input: TicketActionInput) -> Result<Ticket, QueueError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        match find_action_request(&mut tx, TicketAction::Recall, input.request_id).await? {
            Some(LedgerHit::Ticket(ticket_id)) => {
                let ticket =
                    get_ticket_row(&mut tx, input.tenant_id, input.branch_id, ticket_id).await?;
                tx.commit().await.map_err(db_err)?;
                return Ok(ticket);
            }
            Some(LedgerHit::Empty) => {
                tx.commit().await.map_err(db_err)?;
                return Err(QueueError::InvalidState);
            }
            None => {}
        }

        let mut ticket =
            get_ticket_row(&mut tx, input.tenant_id, input.branch_id, input.ticket_id).await?;
        if !valid_transition(TicketAction::Recall, ticket.status) {
            return Err(QueueError::InvalidState);
        }
        ticket.request_id = Some(input.request_id);

        insert_action_request(
            &mut tx,
            TicketAction::Recall,
            input.request_id,
            input.tenant_id,
            input.branch_id,
            None,
            input.counter_id,
            Some(ticket.ticket_id),
        )
        .await?;
        append_event(
            &mut tx,
            input.tenant_id,
            ticket.ticket_id,
            EventType::Recalled,
            status_payload(&ticket),
        )
        .await?;

        tx.commit().await.map_err(db_err)?;
        Ok(ticket)
    }

    /// Move a ticket to another service, returning it to `waiting` and
    /// clearing the counter assignment.
    pub async fn transfer(&self, input: TicketActionInput) -> Result<Ticket, QueueError> {
        let to_service_id = input.to_service_id.ok_or(QueueError::ServiceNotFound)?;
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        match find_action_request(&mut tx, TicketAction::Transfer, input.request_id).await? {
            Some(LedgerHit::Ticket(ticket_id)) => {
                let ticket =
                    get_ticket_row(&mut tx, input.tenant_id, input.branch_id, ticket_id).await?;
                tx.commit().await.map_err(db_err)?;
                return Ok(ticket);
            }
            Some(LedgerHit::Empty) => {
                tx.commit().await.map_err(db_err)?;
                return Err(QueueError::InvalidState);
            }
            None => {}
        }

        ensure_service_active(&mut tx, input.tenant_id, input.branch_id, to_service_id).await?;

        let row = sqlx::query(&select_columns(
            r"
            WITH current AS (
                SELECT service_id
                FROM tickets
                WHERE ticket_id = $1 AND tenant_id = $2 AND branch_id = $3
                FOR UPDATE
            ), updated AS (
                UPDATE tickets
                SET status = 'waiting',
                    service_id = $4,
                    counter_id = NULL
                WHERE ticket_id = $1 AND tenant_id = $2 AND branch_id = $3
                    AND status IN ('waiting', 'called', 'serving')
                RETURNING *
            )
            SELECT current.service_id AS from_service_id, ",
            "updated AS t JOIN current ON TRUE",
        ))
        .bind(input.ticket_id)
        .bind(input.tenant_id)
        .bind(input.branch_id)
        .bind(to_service_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?
        .ok_or(QueueError::InvalidState)?;

        let from_service_id: Uuid = row.try_get("from_service_id").map_err(db_err)?;
        let mut ticket = ticket_from_row(&row)?;
        ticket.request_id = Some(input.request_id);

        insert_action_request(
            &mut tx,
            TicketAction::Transfer,
            input.request_id,
            input.tenant_id,
            input.branch_id,
            Some(to_service_id),
            input.counter_id,
            Some(ticket.ticket_id),
        )
        .await?;
        append_event(
            &mut tx,
            input.tenant_id,
            ticket.ticket_id,
            EventType::Transferred,
            transfer_payload(
                &ticket,
                from_service_id,
                to_service_id,
                input.reason.as_deref(),
            ),
        )
        .await?;

        tx.commit().await.map_err(db_err)?;
        Ok(ticket)
    }

    /// Mark a called ticket as a no-show.
    ///
    /// Honors the per-service `return_to_queue` policy, falling back to the
    /// system default when no policy row exists: either the ticket returns
    /// to `waiting` with the assignment cleared and `returned = TRUE`, or it
    /// goes terminal as `no_show`.
    pub async fn no_show(&self, input: TicketActionInput) -> Result<Ticket, QueueError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        match find_action_request(&mut tx, TicketAction::NoShow, input.request_id).await? {
            Some(LedgerHit::Ticket(ticket_id)) => {
                let ticket =
                    get_ticket_row(&mut tx, input.tenant_id, input.branch_id, ticket_id).await?;
                tx.commit().await.map_err(db_err)?;
                return Ok(ticket);
            }
            Some(LedgerHit::Empty) => {
                tx.commit().await.map_err(db_err)?;
                return Err(QueueError::InvalidState);
            }
            None => {}
        }

        let current =
            get_ticket_row(&mut tx, input.tenant_id, input.branch_id, input.ticket_id).await?;
        let policy = get_service_policy(
            &mut tx,
            input.tenant_id,
            input.branch_id,
            current.service_id,
        )
        .await?;
        let return_to_queue =
            policy.map_or(self.options.no_show_return_to_queue, |p| p.return_to_queue);

        let mut ticket =
            apply_no_show(&mut tx, input.tenant_id, input.branch_id, input.ticket_id, return_to_queue)
                .await?
                .ok_or_else(|| {
                    if current.status == TicketStatus::Called {
                        QueueError::internal("no_show lost the row after loading it")
                    } else {
                        QueueError::InvalidState
                    }
                })?;
        ticket.request_id = Some(input.request_id);

        insert_action_request(
            &mut tx,
            TicketAction::NoShow,
            input.request_id,
            input.tenant_id,
            input.branch_id,
            None,
            input.counter_id,
            Some(ticket.ticket_id),
        )
        .await?;
        append_event(
            &mut tx,
            input.tenant_id,
            ticket.ticket_id,
            EventType::NoShow,
            no_show_payload(&ticket, return_to_queue),
        )
        .await?;

        tx.commit().await.map_err(db_err)?;
        Ok(ticket)
    }

    /// Fetch one ticket within its tenant/branch scope.
    pub async fn get_ticket(
        &self,
        tenant_id: Uuid,
        branch_id: Uuid,
        ticket_id: Uuid,
    ) -> Result<Ticket, QueueError> {
        let row = sqlx::query(&select_columns(
            "SELECT ",
            "tickets t WHERE t.ticket_id = $1 AND t.tenant_id = $2 AND t.branch_id = $3",
        ))
        .bind(ticket_id)
        .bind(tenant_id)
        .bind(branch_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or(QueueError::TicketNotFound)?;
        ticket_from_row(&row)
    }

    /// Waiting and held tickets, oldest first, optionally scoped to one
    /// service.
    pub async fn list_queue(
        &self,
        tenant_id: Uuid,
        branch_id: Uuid,
        service_id: Option<Uuid>,
    ) -> Result<Vec<Ticket>, QueueError> {
        let rows = match service_id {
            Some(service_id) => {
                sqlx::query(&select_columns(
                    "SELECT ",
                    r"tickets t
                      WHERE t.tenant_id = $1 AND t.branch_id = $2 AND t.service_id = $3
                          AND t.status IN ('waiting', 'held')
                      ORDER BY t.created_at ASC",
                ))
                .bind(tenant_id)
                .bind(branch_id)
                .bind(service_id)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&select_columns(
                    "SELECT ",
                    r"tickets t
                      WHERE t.tenant_id = $1 AND t.branch_id = $2
                          AND t.status IN ('waiting', 'held')
                      ORDER BY t.created_at ASC",
                ))
                .bind(tenant_id)
                .bind(branch_id)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(db_err)?;
        rows.iter().map(ticket_from_row).collect()
    }

    /// Waiting, called and serving tickets of one service, for dashboard
    /// resyncs.
    pub async fn snapshot_tickets(
        &self,
        tenant_id: Uuid,
        branch_id: Uuid,
        service_id: Uuid,
    ) -> Result<Vec<Ticket>, QueueError> {
        let rows = sqlx::query(&select_columns(
            "SELECT ",
            r"tickets t
              WHERE t.tenant_id = $1 AND t.branch_id = $2 AND t.service_id = $3
                  AND t.status IN ('waiting', 'called', 'serving')
              ORDER BY t.created_at ASC",
        ))
        .bind(tenant_id)
        .bind(branch_id)
        .bind(service_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(ticket_from_row).collect()
    }

    /// The ticket currently called or serving at a counter, if any.
    pub async fn get_active_ticket(
        &self,
        tenant_id: Uuid,
        branch_id: Uuid,
        counter_id: Uuid,
    ) -> Result<Option<Ticket>, QueueError> {
        let row = sqlx::query(&select_columns(
            "SELECT ",
            r"tickets t
              WHERE t.tenant_id = $1 AND t.branch_id = $2 AND t.counter_id = $3
                  AND t.status IN ('called', 'serving')
              ORDER BY t.called_at DESC
              LIMIT 1",
        ))
        .bind(tenant_id)
        .bind(branch_id)
        .bind(counter_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(ticket_from_row).transpose()
    }

    /// Tenant-scoped outbox tail for the REST events endpoint.
    pub async fn list_outbox_events(
        &self,
        tenant_id: Uuid,
        after: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<OutboxEvent>, QueueError> {
        let limit = if limit <= 0 { 100 } else { limit };
        let rows = match after {
            Some(after) => {
                sqlx::query(
                    r"
                    SELECT event_id, tenant_id, type, payload_json, created_at
                    FROM outbox_events
                    WHERE tenant_id = $1 AND created_at > $2
                    ORDER BY created_at ASC, event_id ASC
                    LIMIT $3
                    ",
                )
                .bind(tenant_id)
                .bind(after)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    r"
                    SELECT event_id, tenant_id, type, payload_json, created_at
                    FROM outbox_events
                    WHERE tenant_id = $1
                    ORDER BY created_at ASC, event_id ASC
                    LIMIT $2
                    ",
                )
                .bind(tenant_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(db_err)?;

        rows.into_iter()
            .map(|row| {
                Ok(OutboxEvent {
                    event_id: row.try_get("event_id").map_err(db_err)?,
                    tenant_id: row.try_get("tenant_id").map_err(db_err)?,
                    event_type: row.try_get("type").map_err(db_err)?,
                    payload: row.try_get("payload_json").map_err(db_err)?,
                    created_at: row.try_get("created_at").map_err(db_err)?,
                })
            })
            .collect()
    }

    /// A ticket's full hash-chained event log, ordered by sequence.
    pub async fn list_ticket_events(
        &self,
        tenant_id: Uuid,
        ticket_id: Uuid,
    ) -> Result<Vec<TicketEvent>, QueueError> {
        let rows = sqlx::query(
            r"
            SELECT e.ticket_id, e.ticket_seq, e.type, e.payload, e.created_at, e.prev_hash, e.hash
            FROM ticket_events e
            JOIN tickets t ON t.ticket_id = e.ticket_id
            WHERE t.tenant_id = $1 AND e.ticket_id = $2
            ORDER BY e.ticket_seq ASC
            ",
        )
        .bind(tenant_id)
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter()
            .map(|row| {
                Ok(TicketEvent {
                    ticket_id: row.try_get("ticket_id").map_err(db_err)?,
                    ticket_seq: row.try_get("ticket_seq").map_err(db_err)?,
                    event_type: row.try_get("type").map_err(db_err)?,
                    payload: row.try_get("payload").map_err(db_err)?,
                    created_at: row.try_get("created_at").map_err(db_err)?,
                    prev_hash: row.try_get("prev_hash").map_err(db_err)?,
                    hash: row.try_get("hash").map_err(db_err)?,
                })
            })
            .collect()
    }

    /// Counters of one branch, by name.
    pub async fn list_counters(
        &self,
        tenant_id: Uuid,
        branch_id: Uuid,
    ) -> Result<Vec<Counter>, QueueError> {
        let rows = sqlx::query(
            r"
            SELECT c.counter_id, c.branch_id, c.name, c.status
            FROM counters c
            JOIN branches b ON b.branch_id = c.branch_id
            WHERE b.tenant_id = $1 AND c.branch_id = $2
            ORDER BY c.name ASC
            ",
        )
        .bind(tenant_id)
        .bind(branch_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter()
            .map(|row| {
                Ok(Counter {
                    counter_id: row.try_get("counter_id").map_err(db_err)?,
                    branch_id: row.try_get("branch_id").map_err(db_err)?,
                    name: row.try_get("name").map_err(db_err)?,
                    status: row.try_get("status").map_err(db_err)?,
                })
            })
            .collect()
    }

    /// Update a counter's status (active, break, offline, ...).
    pub async fn update_counter_status(
        &self,
        tenant_id: Uuid,
        branch_id: Uuid,
        counter_id: Uuid,
        status: &str,
    ) -> Result<(), QueueError> {
        let result = sqlx::query(
            r"
            UPDATE counters c
            SET status = $1
            FROM branches b
            WHERE c.counter_id = $2 AND c.branch_id = $3
                AND b.branch_id = c.branch_id AND b.tenant_id = $4
            ",
        )
        .bind(status)
        .bind(counter_id)
        .bind(branch_id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(QueueError::CounterNotFound);
        }
        Ok(())
    }

    /// Active services of one branch, by name.
    pub async fn list_services(
        &self,
        tenant_id: Uuid,
        branch_id: Uuid,
    ) -> Result<Vec<Service>, QueueError> {
        let rows = sqlx::query(
            r"
            SELECT s.service_id, s.branch_id, s.name, s.code, s.sla_minutes, s.priority_policy
            FROM services s
            JOIN branches b ON b.branch_id = s.branch_id
            WHERE b.tenant_id = $1 AND s.branch_id = $2 AND s.active = TRUE
            ORDER BY s.name ASC
            ",
        )
        .bind(tenant_id)
        .bind(branch_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter()
            .map(|row| {
                Ok(Service {
                    service_id: row.try_get("service_id").map_err(db_err)?,
                    branch_id: row.try_get("branch_id").map_err(db_err)?,
                    name: row.try_get("name").map_err(db_err)?,
                    code: row.try_get("code").map_err(db_err)?,
                    sla_minutes: row.try_get("sla_minutes").map_err(db_err)?,
                    priority_policy: row.try_get("priority_policy").map_err(db_err)?,
                })
            })
            .collect()
    }

    /// Reclaim called-but-stale tickets. See [`sweeper::NoShowSweeper`] for
    /// the timer wrapper.
    pub async fn auto_no_show(
        &self,
        grace: std::time::Duration,
        batch_size: i64,
    ) -> Result<usize, QueueError> {
        sweeper::sweep_once(self, grace, batch_size).await
    }

    /// One-shot status transition shared by start/complete/cancel/hold/unhold.
    #[allow(clippy::too_many_arguments)]
    async fn update_ticket_status(
        &self,
        input: TicketActionInput,
        action: TicketAction,
        from: TicketStatus,
        to: TicketStatus,
        event: EventType,
        timestamp_column: Option<&str>,
        require_counter: bool,
    ) -> Result<Ticket, QueueError> {
        debug_assert!(valid_transition(action, from));

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        match find_action_request(&mut tx, action, input.request_id).await? {
            Some(LedgerHit::Ticket(ticket_id)) => {
                let ticket =
                    get_ticket_row(&mut tx, input.tenant_id, input.branch_id, ticket_id).await?;
                tx.commit().await.map_err(db_err)?;
                return Ok(ticket);
            }
            Some(LedgerHit::Empty) => {
                tx.commit().await.map_err(db_err)?;
                return Err(QueueError::InvalidState);
            }
            None => {}
        }

        let occurred_at = Utc::now();
        let mut sql = String::from("UPDATE tickets AS t SET status = $1");
        if let Some(column) = timestamp_column {
            sql.push_str(&format!(", {column} = $2"));
        }
        let where_base = if timestamp_column.is_some() { 3 } else { 2 };
        sql.push_str(&format!(
            " WHERE t.ticket_id = ${} AND t.tenant_id = ${} AND t.branch_id = ${} AND t.status = ${}",
            where_base,
            where_base + 1,
            where_base + 2,
            where_base + 3
        ));
        if require_counter {
            sql.push_str(&format!(" AND t.counter_id = ${}", where_base + 4));
        }
        sql.push_str(" RETURNING ");
        sql.push_str(TICKET_COLUMNS);

        let mut query = sqlx::query(&sql).bind(to.as_str());
        if timestamp_column.is_some() {
            query = query.bind(occurred_at);
        }
        query = query
            .bind(input.ticket_id)
            .bind(input.tenant_id)
            .bind(input.branch_id)
            .bind(from.as_str());
        if require_counter {
            query = query.bind(input.counter_id);
        }

        let row = query.fetch_optional(&mut *tx).await.map_err(db_err)?;

        let Some(row) = row else {
            // Diagnose why the guarded update matched nothing.
            let state = load_ticket_state(&mut tx, input.tenant_id, input.branch_id, input.ticket_id)
                .await?;
            return match state {
                None => Err(QueueError::TicketNotFound),
                Some((_, counter_id))
                    if require_counter
                        && counter_id.is_some()
                        && counter_id != input.counter_id =>
                {
                    Err(QueueError::CounterMismatch)
                }
                Some(_) => Err(QueueError::InvalidState),
            };
        };

        let mut ticket = ticket_from_row(&row)?;
        ticket.request_id = Some(input.request_id);

        insert_action_request(
            &mut tx,
            action,
            input.request_id,
            input.tenant_id,
            input.branch_id,
            None,
            input.counter_id,
            Some(ticket.ticket_id),
        )
        .await?;
        append_event(
            &mut tx,
            input.tenant_id,
            ticket.ticket_id,
            event,
            status_payload(&ticket),
        )
        .await?;

        tx.commit().await.map_err(db_err)?;
        Ok(ticket)
    }
}

/// Columns every ticket SELECT reads, aliased from `t`.
const TICKET_COLUMNS: &str = "t.ticket_id, t.request_id, t.ticket_number, t.tenant_id, \
     t.branch_id, t.service_id, t.area_id, t.status, t.channel, t.priority_class, \
     t.appointment_id, t.counter_id, t.created_at, t.called_at, t.served_at, \
     t.completed_at, t.returned";

/// Splice the shared column list into a query. `prefix` ends where the
/// column list starts; `from` is appended as `FROM <from>` when non-empty.
pub(crate) fn select_columns(prefix: &str, from: &str) -> String {
    if from.is_empty() {
        format!("{prefix}{}", TICKET_COLUMNS.replace("t.", ""))
    } else {
        format!("{prefix}{TICKET_COLUMNS} FROM {from}")
    }
}

pub(crate) fn ticket_from_row(row: &PgRow) -> Result<Ticket, QueueError> {
    let status_raw: String = row.try_get("status").map_err(db_err)?;
    let status = TicketStatus::parse(&status_raw)
        .ok_or_else(|| QueueError::internal(format!("unknown ticket status {status_raw:?}")))?;
    Ok(Ticket {
        ticket_id: row.try_get("ticket_id").map_err(db_err)?,
        request_id: row.try_get("request_id").map_err(db_err)?,
        ticket_number: row.try_get("ticket_number").map_err(db_err)?,
        tenant_id: row.try_get("tenant_id").map_err(db_err)?,
        branch_id: row.try_get("branch_id").map_err(db_err)?,
        service_id: row.try_get("service_id").map_err(db_err)?,
        area_id: row.try_get("area_id").map_err(db_err)?,
        status,
        channel: row.try_get("channel").map_err(db_err)?,
        priority_class: row.try_get("priority_class").map_err(db_err)?,
        appointment_id: row.try_get("appointment_id").map_err(db_err)?,
        counter_id: row.try_get("counter_id").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        called_at: row.try_get("called_at").map_err(db_err)?,
        served_at: row.try_get("served_at").map_err(db_err)?,
        completed_at: row.try_get("completed_at").map_err(db_err)?,
        returned: row.try_get("returned").map_err(db_err)?,
    })
}

async fn find_ticket_by_request_id(
    conn: &mut PgConnection,
    request_id: Uuid,
) -> Result<Option<Ticket>, QueueError> {
    let row = sqlx::query(&select_columns(
        "SELECT ",
        "tickets t WHERE t.request_id = $1",
    ))
    .bind(request_id)
    .fetch_optional(conn)
    .await
    .map_err(db_err)?;
    row.as_ref().map(ticket_from_row).transpose()
}

pub(crate) async fn get_ticket_row(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    branch_id: Uuid,
    ticket_id: Uuid,
) -> Result<Ticket, QueueError> {
    let row = sqlx::query(&select_columns(
        "SELECT ",
        "tickets t WHERE t.ticket_id = $1 AND t.tenant_id = $2 AND t.branch_id = $3",
    ))
    .bind(ticket_id)
    .bind(tenant_id)
    .bind(branch_id)
    .fetch_optional(conn)
    .await
    .map_err(db_err)?
    .ok_or(QueueError::TicketNotFound)?;
    ticket_from_row(&row)
}

async fn load_ticket_state(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    branch_id: Uuid,
    ticket_id: Uuid,
) -> Result<Option<(TicketStatus, Option<Uuid>)>, QueueError> {
    let row = sqlx::query(
        r"
        SELECT status, counter_id
        FROM tickets
        WHERE ticket_id = $1 AND tenant_id = $2 AND branch_id = $3
        ",
    )
    .bind(ticket_id)
    .bind(tenant_id)
    .bind(branch_id)
    .fetch_optional(conn)
    .await
    .map_err(db_err)?;

    let Some(row) = row else {
        return Ok(None);
    };
    let status_raw: String = row.try_get("status").map_err(db_err)?;
    let status = TicketStatus::parse(&status_raw)
        .ok_or_else(|| QueueError::internal(format!("unknown ticket status {status_raw:?}")))?;
    let counter_id: Option<Uuid> = row.try_get("counter_id").map_err(db_err)?;
    Ok(Some((status, counter_id)))
}

async fn lookup_service_code(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    branch_id: Uuid,
    service_id: Uuid,
) -> Result<String, QueueError> {
    let row = sqlx::query(
        r"
        SELECT s.code
        FROM services s
        JOIN branches b ON b.branch_id = s.branch_id
        WHERE s.service_id = $1 AND s.branch_id = $2 AND b.tenant_id = $3 AND s.active = TRUE
        ",
    )
    .bind(service_id)
    .bind(branch_id)
    .bind(tenant_id)
    .fetch_optional(conn)
    .await
    .map_err(db_err)?
    .ok_or(QueueError::ServiceNotFound)?;
    row.try_get("code").map_err(db_err)
}

async fn ensure_service_active(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    branch_id: Uuid,
    service_id: Uuid,
) -> Result<(), QueueError> {
    lookup_service_code(conn, tenant_id, branch_id, service_id)
        .await
        .map(|_| ())
}

/// Counter eligibility: no mapping rows means universal; otherwise the
/// mapping must name this service.
async fn counter_allows_service(
    conn: &mut PgConnection,
    counter_id: Uuid,
    service_id: Uuid,
) -> Result<bool, QueueError> {
    let total: i64 = sqlx::query("SELECT COUNT(1) AS n FROM counter_services WHERE counter_id = $1")
        .bind(counter_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(db_err)?
        .try_get("n")
        .map_err(db_err)?;
    if total == 0 {
        return Ok(true);
    }

    let matching: i64 = sqlx::query(
        "SELECT COUNT(1) AS n FROM counter_services WHERE counter_id = $1 AND service_id = $2",
    )
    .bind(counter_id)
    .bind(service_id)
    .fetch_one(conn)
    .await
    .map_err(db_err)?
    .try_get("n")
    .map_err(db_err)?;
    Ok(matching > 0)
}

async fn get_counter_status(
    conn: &mut PgConnection,
    counter_id: Uuid,
    branch_id: Uuid,
) -> Result<String, QueueError> {
    let row = sqlx::query("SELECT status FROM counters WHERE counter_id = $1 AND branch_id = $2")
        .bind(counter_id)
        .bind(branch_id)
        .fetch_optional(conn)
        .await
        .map_err(db_err)?
        .ok_or(QueueError::CounterNotFound)?;
    row.try_get("status").map_err(db_err)
}

fn counter_is_available(status: &str) -> bool {
    matches!(
        status.trim().to_ascii_lowercase().as_str(),
        "" | "active" | "available" | "busy"
    )
}

async fn lock_routing_state(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    branch_id: Uuid,
    service_id: Uuid,
) -> Result<RoutingState, QueueError> {
    sqlx::query(
        r"
        INSERT INTO service_routing_state
            (tenant_id, branch_id, service_id, priority_streak, appointment_served, total_served)
        VALUES ($1, $2, $3, 0, 0, 0)
        ON CONFLICT (tenant_id, branch_id, service_id) DO NOTHING
        ",
    )
    .bind(tenant_id)
    .bind(branch_id)
    .bind(service_id)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;

    let row = sqlx::query(
        r"
        SELECT priority_streak, appointment_served, total_served
        FROM service_routing_state
        WHERE tenant_id = $1 AND branch_id = $2 AND service_id = $3
        FOR UPDATE
        ",
    )
    .bind(tenant_id)
    .bind(branch_id)
    .bind(service_id)
    .fetch_one(conn)
    .await
    .map_err(db_err)?;

    Ok(RoutingState {
        priority_streak: row.try_get("priority_streak").map_err(db_err)?,
        appointment_served: row.try_get("appointment_served").map_err(db_err)?,
        total_served: row.try_get("total_served").map_err(db_err)?,
    })
}

async fn save_routing_state(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    branch_id: Uuid,
    service_id: Uuid,
    state: RoutingState,
) -> Result<(), QueueError> {
    sqlx::query(
        r"
        UPDATE service_routing_state
        SET priority_streak = $1, appointment_served = $2, total_served = $3
        WHERE tenant_id = $4 AND branch_id = $5 AND service_id = $6
        ",
    )
    .bind(state.priority_streak)
    .bind(state.appointment_served)
    .bind(state.total_served)
    .bind(tenant_id)
    .bind(branch_id)
    .bind(service_id)
    .execute(conn)
    .await
    .map_err(db_err)?;
    Ok(())
}

pub(crate) async fn get_service_policy(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    branch_id: Uuid,
    service_id: Uuid,
) -> Result<Option<ServicePolicy>, QueueError> {
    let row = sqlx::query(
        r"
        SELECT no_show_grace_seconds, return_to_queue, appointment_ratio_percent,
               appointment_window_size, appointment_boost_minutes
        FROM service_policies
        WHERE tenant_id = $1 AND branch_id = $2 AND service_id = $3
        ",
    )
    .bind(tenant_id)
    .bind(branch_id)
    .bind(service_id)
    .fetch_optional(conn)
    .await
    .map_err(db_err)?;

    let Some(row) = row else {
        return Ok(None);
    };
    Ok(Some(ServicePolicy {
        no_show_grace_seconds: row.try_get("no_show_grace_seconds").map_err(db_err)?,
        return_to_queue: row.try_get("return_to_queue").map_err(db_err)?,
        appointment_ratio_percent: row.try_get("appointment_ratio_percent").map_err(db_err)?,
        appointment_window_size: row.try_get("appointment_window_size").map_err(db_err)?,
        appointment_boost_minutes: row.try_get("appointment_boost_minutes").map_err(db_err)?,
    }))
}

/// Execute the routing plan: pools in order, and within each pool the
/// preferred class filter before the unrestricted retry. Returns the called
/// ticket and whether it was an appointment.
async fn select_next_ticket(
    conn: &mut PgConnection,
    input: &CallNextInput,
    called_at: DateTime<Utc>,
    plan: &crate::routing::CallPlan,
) -> Result<Option<(Ticket, bool)>, QueueError> {
    let class_filters: [&str; 2] = match plan.preference {
        ClassPreference::RegularFirst => ["AND t.priority_class = 'regular'", ""],
        ClassPreference::PriorityFirst => ["AND t.priority_class <> 'regular'", ""],
    };

    for pool in &plan.pools {
        for class_filter in class_filters {
            let ticket = match pool {
                CandidatePool::Appointment { cutoff } => {
                    claim_appointment_ticket(conn, input, called_at, class_filter, *cutoff).await?
                }
                CandidatePool::WalkIn => {
                    claim_walkin_ticket(conn, input, called_at, class_filter).await?
                }
            };
            if let Some(ticket) = ticket {
                let is_appointment = matches!(pool, CandidatePool::Appointment { .. });
                return Ok(Some((ticket, is_appointment)));
            }
        }
    }
    Ok(None)
}

async fn claim_appointment_ticket(
    conn: &mut PgConnection,
    input: &CallNextInput,
    called_at: DateTime<Utc>,
    class_filter: &str,
    cutoff: Option<DateTime<Utc>>,
) -> Result<Option<Ticket>, QueueError> {
    let cutoff_filter = if cutoff.is_some() {
        "AND a.scheduled_at <= $6"
    } else {
        ""
    };
    let sql = format!(
        r"
        WITH next_ticket AS (
            SELECT t.ticket_id
            FROM tickets t
            JOIN appointments a ON a.appointment_id = t.appointment_id
            WHERE t.tenant_id = $1 AND t.branch_id = $2 AND t.service_id = $3
                AND t.status = 'waiting' AND t.appointment_id IS NOT NULL
                {class_filter} {cutoff_filter}
            ORDER BY a.scheduled_at ASC, t.created_at ASC, t.ticket_id ASC
            FOR UPDATE OF t SKIP LOCKED
            LIMIT 1
        )
        UPDATE tickets AS t
        SET status = 'called', counter_id = $4, called_at = $5
        FROM next_ticket
        WHERE t.ticket_id = next_ticket.ticket_id
        RETURNING {TICKET_COLUMNS}
        "
    );

    let mut query = sqlx::query(&sql)
        .bind(input.tenant_id)
        .bind(input.branch_id)
        .bind(input.service_id)
        .bind(input.counter_id)
        .bind(called_at);
    if let Some(cutoff) = cutoff {
        query = query.bind(cutoff);
    }

    let row = query.fetch_optional(conn).await.map_err(db_err)?;
    row.as_ref().map(ticket_from_row).transpose()
}

async fn claim_walkin_ticket(
    conn: &mut PgConnection,
    input: &CallNextInput,
    called_at: DateTime<Utc>,
    class_filter: &str,
) -> Result<Option<Ticket>, QueueError> {
    let sql = format!(
        r"
        WITH next_ticket AS (
            SELECT t.ticket_id
            FROM tickets t
            WHERE t.tenant_id = $1 AND t.branch_id = $2 AND t.service_id = $3
                AND t.status = 'waiting' AND t.appointment_id IS NULL
                {class_filter}
            ORDER BY t.created_at ASC, t.ticket_id ASC
            FOR UPDATE SKIP LOCKED
            LIMIT 1
        )
        UPDATE tickets AS t
        SET status = 'called', counter_id = $4, called_at = $5
        FROM next_ticket
        WHERE t.ticket_id = next_ticket.ticket_id
        RETURNING {TICKET_COLUMNS}
        "
    );

    let row = sqlx::query(&sql)
        .bind(input.tenant_id)
        .bind(input.branch_id)
        .bind(input.service_id)
        .bind(input.counter_id)
        .bind(called_at)
        .fetch_optional(conn)
        .await
        .map_err(db_err)?;
    row.as_ref().map(ticket_from_row).transpose()
}

/// Apply the no-show outcome to a `called` ticket. Returns `None` when the
/// guarded update matched nothing.
pub(crate) async fn apply_no_show(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    branch_id: Uuid,
    ticket_id: Uuid,
    return_to_queue: bool,
) -> Result<Option<Ticket>, QueueError> {
    let sql = if return_to_queue {
        select_columns(
            r"
            UPDATE tickets AS t
            SET status = 'waiting', counter_id = NULL, called_at = NULL, returned = TRUE
            WHERE t.ticket_id = $1 AND t.tenant_id = $2 AND t.branch_id = $3
                AND t.status = 'called'
            RETURNING ",
            "",
        )
    } else {
        select_columns(
            r"
            UPDATE tickets AS t
            SET status = 'no_show'
            WHERE t.ticket_id = $1 AND t.tenant_id = $2 AND t.branch_id = $3
                AND t.status = 'called'
            RETURNING ",
            "",
        )
    };

    let row = sqlx::query(&sql)
        .bind(ticket_id)
        .bind(tenant_id)
        .bind(branch_id)
        .fetch_optional(conn)
        .await
        .map_err(db_err)?;
    row.as_ref().map(ticket_from_row).transpose()
}

/// SHA-256 hex digest of a trimmed phone number; `None` for blank input.
fn hash_phone(phone: &str) -> Option<String> {
    let trimmed = phone.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(hex::encode(Sha256::digest(trimmed.as_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_availability_accepts_working_statuses() {
        for status in ["", "active", "available", "busy", "  Active "] {
            assert!(counter_is_available(status), "{status:?}");
        }
        for status in ["break", "offline", "closed"] {
            assert!(!counter_is_available(status), "{status:?}");
        }
    }

    #[test]
    fn phone_hash_is_stable_and_never_raw() {
        let hash = hash_phone(" 08123456789 ").expect("hash");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_phone("08123456789").expect("hash"));
        assert!(!hash.contains("0812"));
        assert_eq!(hash_phone("   "), None);
    }

    #[test]
    fn column_splice_produces_plain_and_aliased_lists() {
        let plain = select_columns("SELECT ", "");
        assert!(plain.contains("ticket_id, request_id"));
        assert!(!plain.contains("t.ticket_id"));

        let aliased = select_columns("SELECT ", "tickets t WHERE t.ticket_id = $1");
        assert!(aliased.contains("t.ticket_id"));
        assert!(aliased.contains("FROM tickets t"));
    }
}
