//! Persistence for notifications, preferences, templates and the DLQ.

use crate::NotifyError;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

/// Delivery status of a notification row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
}

impl NotificationStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A persisted notification.
#[derive(Debug, Clone)]
pub struct Notification {
    pub notification_id: Uuid,
    pub tenant_id: Uuid,
    pub channel: String,
    pub recipient: String,
    pub status: NotificationStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub message: String,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

fn notification_from_row(row: &PgRow) -> Result<Notification, NotifyError> {
    let status_raw: String = row.try_get("status")?;
    let status = NotificationStatus::parse(&status_raw).unwrap_or(NotificationStatus::Failed);
    Ok(Notification {
        notification_id: row.try_get("notification_id")?,
        tenant_id: row.try_get("tenant_id")?,
        channel: row.try_get("channel")?,
        recipient: row.try_get("recipient")?,
        status,
        attempts: row.try_get("attempts")?,
        last_error: row.try_get("last_error")?,
        message: row.try_get("message")?,
        next_attempt_at: row.try_get("next_attempt_at")?,
        created_at: row.try_get("created_at")?,
        sent_at: row.try_get("sent_at")?,
    })
}

/// PostgreSQL store for the notification worker.
#[derive(Clone)]
pub struct NotificationStore {
    pool: PgPool,
}

impl NotificationStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Whether the tenant receives notifications. Absent rows default to
    /// enabled.
    pub async fn notifications_enabled(&self, tenant_id: Uuid) -> Result<bool, NotifyError> {
        let row =
            sqlx::query("SELECT enabled FROM tenant_notification_prefs WHERE tenant_id = $1")
                .bind(tenant_id)
                .fetch_optional(&self.pool)
                .await?;
        match row {
            Some(row) => Ok(row.try_get("enabled")?),
            None => Ok(true),
        }
    }

    /// Tenant template override, if one exists.
    pub async fn get_template(
        &self,
        tenant_id: Uuid,
        template_id: &str,
        lang: &str,
        channel: &str,
    ) -> Result<Option<String>, NotifyError> {
        let row = sqlx::query(
            r"
            SELECT body
            FROM notification_templates
            WHERE tenant_id = $1 AND template_id = $2 AND lang = $3 AND channel = $4
            ",
        )
        .bind(tenant_id)
        .bind(template_id)
        .bind(lang)
        .bind(channel)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| row.try_get("body"))
            .transpose()
            .map_err(Into::into)
    }

    /// Whether a recipient opted out of this channel.
    pub async fn is_suppressed(
        &self,
        tenant_id: Uuid,
        channel: &str,
        recipient: &str,
    ) -> Result<bool, NotifyError> {
        let row = sqlx::query(
            r"
            SELECT EXISTS (
                SELECT 1 FROM notification_suppressions
                WHERE tenant_id = $1 AND channel = $2 AND recipient = $3
            ) AS suppressed
            ",
        )
        .bind(tenant_id)
        .bind(channel)
        .bind(recipient)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("suppressed")?)
    }

    /// A ticket's 1-based position in its waiting queue; 0 when not waiting.
    pub async fn queue_position(
        &self,
        tenant_id: Uuid,
        branch_id: Uuid,
        service_id: Uuid,
        ticket_id: Uuid,
    ) -> Result<i64, NotifyError> {
        let row = sqlx::query(
            r"
            WITH ordered AS (
                SELECT ticket_id, ROW_NUMBER() OVER (ORDER BY created_at ASC) AS pos
                FROM tickets
                WHERE tenant_id = $1 AND branch_id = $2 AND service_id = $3
                    AND status = 'waiting'
            )
            SELECT pos FROM ordered WHERE ticket_id = $4
            ",
        )
        .bind(tenant_id)
        .bind(branch_id)
        .bind(service_id)
        .bind(ticket_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(row.try_get("pos")?),
            None => Ok(0),
        }
    }

    /// Insert a pending notification due immediately.
    pub async fn insert_pending(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        channel: &str,
        recipient: &str,
        message: &str,
    ) -> Result<Uuid, NotifyError> {
        let notification_id = Uuid::new_v4();
        sqlx::query(
            r"
            INSERT INTO notifications
                (notification_id, tenant_id, channel, recipient, status, attempts,
                 message, next_attempt_at, created_at)
            VALUES ($1, $2, $3, $4, 'pending', 0, $5, NOW(), NOW())
            ",
        )
        .bind(notification_id)
        .bind(tenant_id)
        .bind(channel)
        .bind(recipient)
        .bind(message)
        .execute(conn)
        .await?;
        Ok(notification_id)
    }

    /// Claim due pending notifications with skip-locked semantics, so
    /// multiple worker replicas never redeliver the same row.
    pub async fn claim_due(
        &self,
        conn: &mut PgConnection,
        limit: i64,
    ) -> Result<Vec<Notification>, NotifyError> {
        let limit = if limit <= 0 { 50 } else { limit };
        let rows = sqlx::query(
            r"
            SELECT notification_id, tenant_id, channel, recipient, status, attempts,
                   last_error, message, next_attempt_at, created_at, sent_at
            FROM notifications
            WHERE status = 'pending' AND next_attempt_at IS NOT NULL
                AND next_attempt_at <= NOW()
            ORDER BY next_attempt_at ASC
            FOR UPDATE SKIP LOCKED
            LIMIT $1
            ",
        )
        .bind(limit)
        .fetch_all(conn)
        .await?;
        rows.iter().map(notification_from_row).collect()
    }

    /// Record a successful delivery.
    pub async fn mark_sent(
        &self,
        conn: &mut PgConnection,
        notification_id: Uuid,
    ) -> Result<(), NotifyError> {
        sqlx::query(
            r"
            UPDATE notifications
            SET status = 'sent', sent_at = NOW(), last_error = NULL,
                next_attempt_at = NULL, attempts = attempts + 1
            WHERE notification_id = $1
            ",
        )
        .bind(notification_id)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Record a failed attempt that will be retried.
    pub async fn mark_retry(
        &self,
        conn: &mut PgConnection,
        notification_id: Uuid,
        last_error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<(), NotifyError> {
        sqlx::query(
            r"
            UPDATE notifications
            SET status = 'pending', last_error = $2, attempts = attempts + 1,
                next_attempt_at = $3
            WHERE notification_id = $1
            ",
        )
        .bind(notification_id)
        .bind(last_error)
        .bind(next_attempt_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Record a terminal failure.
    pub async fn mark_failed(
        &self,
        conn: &mut PgConnection,
        notification_id: Uuid,
        last_error: &str,
    ) -> Result<(), NotifyError> {
        sqlx::query(
            r"
            UPDATE notifications
            SET status = 'failed', last_error = $2, attempts = attempts + 1,
                next_attempt_at = NULL
            WHERE notification_id = $1
            ",
        )
        .bind(notification_id)
        .bind(last_error)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Park a notification that exhausted its attempts.
    pub async fn insert_dlq(
        &self,
        conn: &mut PgConnection,
        notification_id: Uuid,
        reason: &str,
    ) -> Result<(), NotifyError> {
        sqlx::query(
            r"
            INSERT INTO notification_dlq (dlq_id, notification_id, reason, created_at)
            VALUES ($1, $2, $3, NOW())
            ",
        )
        .bind(Uuid::new_v4())
        .bind(notification_id)
        .bind(reason)
        .execute(conn)
        .await?;
        Ok(())
    }
}
