//! Outbox tailing shared by the realtime hub and the notification worker.
//!
//! Each consumer owns one durable compound cursor `(created_at, event_id)`
//! and pages the outbox in that lexicographic order. The two consumers make
//! independent progress; cleanup deletes only rows older than the *minimum*
//! of the two cursor times, so a slow notifier never loses events to a fast
//! hub.

#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use thiserror::Error;
use uuid::Uuid;
use waitline_core::OutboxEvent;

/// Outbox access failure.
#[derive(Debug, Error)]
pub enum OutboxError {
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),
}

/// The two independent outbox consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consumer {
    Realtime,
    Notifications,
}

impl Consumer {
    const fn table(self) -> &'static str {
        match self {
            Self::Realtime => "realtime_offsets",
            Self::Notifications => "notification_offsets",
        }
    }
}

/// Durable position in the outbox. Ordering is `(created_at, event_id)`,
/// matching the order events are consumed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboxCursor {
    pub last_event_time: DateTime<Utc>,
    pub last_event_id: Uuid,
}

impl OutboxCursor {
    /// The position before the first event.
    #[must_use]
    pub const fn origin() -> Self {
        Self {
            last_event_time: DateTime::<Utc>::UNIX_EPOCH,
            last_event_id: Uuid::nil(),
        }
    }

    /// Move the cursor past `event`.
    pub fn advance(&mut self, event: &OutboxEvent) {
        self.last_event_time = event.created_at;
        self.last_event_id = event.event_id;
    }
}

impl Default for OutboxCursor {
    fn default() -> Self {
        Self::origin()
    }
}

/// Cursor persistence and outbox paging.
#[derive(Clone)]
pub struct OutboxStore {
    pool: PgPool,
}

impl OutboxStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Load a consumer's cursor, or the origin if none was ever saved.
    pub async fn get_cursor(&self, consumer: Consumer) -> Result<OutboxCursor, OutboxError> {
        let sql = format!(
            "SELECT last_event_time, last_event_id FROM {} WHERE id = 1",
            consumer.table()
        );
        let row = sqlx::query(&sql).fetch_optional(&self.pool).await?;
        let Some(row) = row else {
            return Ok(OutboxCursor::origin());
        };
        Ok(OutboxCursor {
            last_event_time: row.try_get("last_event_time")?,
            last_event_id: row.try_get("last_event_id")?,
        })
    }

    /// Persist a consumer's cursor.
    pub async fn save_cursor(
        &self,
        consumer: Consumer,
        cursor: OutboxCursor,
    ) -> Result<(), OutboxError> {
        let sql = format!(
            r"
            INSERT INTO {} (id, last_event_time, last_event_id)
            VALUES (1, $1, $2)
            ON CONFLICT (id) DO UPDATE
            SET last_event_time = EXCLUDED.last_event_time,
                last_event_id = EXCLUDED.last_event_id
            ",
            consumer.table()
        );
        sqlx::query(&sql)
            .bind(cursor.last_event_time)
            .bind(cursor.last_event_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Page events strictly after the cursor, oldest first.
    pub async fn list_after(
        &self,
        cursor: OutboxCursor,
        limit: i64,
    ) -> Result<Vec<OutboxEvent>, OutboxError> {
        let limit = if limit <= 0 { 100 } else { limit };
        let rows = sqlx::query(
            r"
            SELECT event_id, tenant_id, type, payload_json, created_at
            FROM outbox_events
            WHERE created_at > $1 OR (created_at = $1 AND event_id > $2)
            ORDER BY created_at ASC, event_id ASC
            LIMIT $3
            ",
        )
        .bind(cursor.last_event_time)
        .bind(cursor.last_event_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(OutboxEvent {
                    event_id: row.try_get("event_id")?,
                    tenant_id: row.try_get("tenant_id")?,
                    event_type: row.try_get("type")?,
                    payload: row.try_get("payload_json")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    /// Delete outbox rows both consumers have moved past.
    ///
    /// A consumer that never saved a cursor pins cleanup at the origin, so
    /// nothing is deleted until both have made progress.
    pub async fn cleanup(&self) -> Result<u64, OutboxError> {
        let realtime = self.get_cursor(Consumer::Realtime).await?;
        let notifications = self.get_cursor(Consumer::Notifications).await?;
        let min_time = realtime
            .last_event_time
            .min(notifications.last_event_time);
        if min_time == DateTime::<Utc>::UNIX_EPOCH {
            return Ok(0);
        }

        let result = sqlx::query("DELETE FROM outbox_events WHERE created_at < $1")
            .bind(min_time)
            .execute(&self.pool)
            .await?;
        let deleted = result.rows_affected();
        if deleted > 0 {
            tracing::debug!(deleted, "purged outbox rows behind both cursors");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_sorts_before_everything() {
        let origin = OutboxCursor::origin();
        assert_eq!(origin.last_event_time, DateTime::<Utc>::UNIX_EPOCH);
        assert!(origin.last_event_id.is_nil());
    }

    #[test]
    fn advance_tracks_the_event() {
        let mut cursor = OutboxCursor::origin();
        let event = OutboxEvent {
            event_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            event_type: "ticket.created".to_string(),
            payload: serde_json::json!({}),
            created_at: Utc::now(),
        };
        cursor.advance(&event);
        assert_eq!(cursor.last_event_time, event.created_at);
        assert_eq!(cursor.last_event_id, event.event_id);
    }
}
