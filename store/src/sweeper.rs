//! Auto no-show sweeper.
//!
//! A timer-driven task that reclaims called-but-unarrived tickets. Each tick
//! runs one self-contained transaction: claim stale `called` rows with
//! `FOR UPDATE SKIP LOCKED`, re-check the per-service grace, and apply the
//! no-show outcome honoring the policy's `return_to_queue`. Restart-safe
//! because a sweep only ever touches rows still in `called`.

use crate::db_err;
use crate::events::{append_event, no_show_payload};
use crate::store::{
    apply_no_show, get_service_policy, select_columns, ticket_from_row, TicketStore,
};
use chrono::Utc;
use sqlx::Row;
use std::time::Duration;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info};
use waitline_core::{EventType, QueueError};

/// Upper bound for one sweep transaction.
const SWEEP_TIMEOUT: Duration = Duration::from_secs(10);

/// One sweep pass. Returns the number of tickets processed.
pub(crate) async fn sweep_once(
    store: &TicketStore,
    grace: Duration,
    batch_size: i64,
) -> Result<usize, QueueError> {
    if grace.is_zero() {
        return Ok(0);
    }
    let batch_size = if batch_size <= 0 { 100 } else { batch_size };

    let mut tx = store.pool().begin().await.map_err(db_err)?;

    let cutoff = Utc::now()
        - chrono::Duration::from_std(grace)
            .map_err(|e| QueueError::internal(format!("grace out of range: {e}")))?;
    let sql = select_columns(
        "SELECT ",
        r"tickets t
          WHERE t.status = 'called' AND t.called_at <= $1
          ORDER BY t.called_at ASC
          FOR UPDATE SKIP LOCKED
          LIMIT $2",
    );
    let rows = sqlx::query(&sql)
        .bind(cutoff)
        .bind(batch_size)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?;

    let mut processed = 0;
    for row in &rows {
        let ticket = ticket_from_row(row)?;
        let policy = get_service_policy(
            &mut tx,
            ticket.tenant_id,
            ticket.branch_id,
            ticket.service_id,
        )
        .await?;

        let (effective_grace, return_to_queue) = match policy {
            Some(policy) => (
                Duration::from_secs(u64::try_from(policy.no_show_grace_seconds).unwrap_or(0)),
                policy.return_to_queue,
            ),
            None => (grace, store.options().no_show_return_to_queue),
        };

        let Some(called_at) = ticket.called_at else {
            continue;
        };
        let waited = Utc::now().signed_duration_since(called_at);
        if waited
            < chrono::Duration::from_std(effective_grace)
                .unwrap_or_else(|_| chrono::Duration::zero())
        {
            continue;
        }

        let Some(updated) = apply_no_show(
            &mut tx,
            ticket.tenant_id,
            ticket.branch_id,
            ticket.ticket_id,
            return_to_queue,
        )
        .await?
        else {
            // Claimed row changed under us; the next tick will see it.
            continue;
        };

        append_event(
            &mut tx,
            updated.tenant_id,
            updated.ticket_id,
            EventType::NoShow,
            no_show_payload(&updated, return_to_queue),
        )
        .await?;
        processed += 1;
    }

    tx.commit().await.map_err(db_err)?;
    if processed > 0 {
        metrics::counter!("waitline_no_show_swept_total").increment(processed as u64);
    }
    Ok(processed)
}

/// Timer wrapper around [`TicketStore::auto_no_show`].
pub struct NoShowSweeper {
    store: TicketStore,
    grace: Duration,
    scan_interval: Duration,
    batch_size: i64,
}

impl NoShowSweeper {
    /// Create a sweeper. A zero grace or interval disables it.
    #[must_use]
    pub const fn new(
        store: TicketStore,
        grace: Duration,
        scan_interval: Duration,
        batch_size: i64,
    ) -> Self {
        Self {
            store,
            grace,
            scan_interval,
            batch_size,
        }
    }

    /// Run the sweep loop until the task is aborted. Each tick is bounded at
    /// ten seconds; an overrunning or failing sweep only skips that tick.
    pub async fn run(self) {
        if self.grace.is_zero() || self.scan_interval.is_zero() {
            info!("no-show sweeper disabled");
            return;
        }

        let mut ticker = interval(self.scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            grace_seconds = self.grace.as_secs(),
            interval_seconds = self.scan_interval.as_secs(),
            "no-show sweeper started"
        );

        loop {
            ticker.tick().await;
            match timeout(
                SWEEP_TIMEOUT,
                sweep_once(&self.store, self.grace, self.batch_size),
            )
            .await
            {
                Ok(Ok(0)) => debug!("no-show sweep found nothing"),
                Ok(Ok(count)) => info!(count, "no-show sweep reclaimed tickets"),
                Ok(Err(err)) => error!(error = %err, "no-show sweep failed"),
                Err(_) => error!("no-show sweep timed out"),
            }
        }
    }
}
