//! The notification worker's two loops.
//!
//! The outbox loop tails new events and fans each into channel-specific
//! pending notifications, delivering immediately. The retry loop redelivers
//! pending rows whose `next_attempt_at` has passed. Backoff is
//! `min(5 min, 5 s × 2^(attempts−1))`; a notification that exhausts
//! `max_attempts` goes `failed` and lands in the DLQ.

use crate::provider::{Channel, ProviderSet};
use crate::store::{Notification, NotificationStore};
use crate::template::{
    default_template, render, template_for_event, DEFAULT_LANG, REMINDER_TEMPLATE,
};
use crate::NotifyError;
use chrono::Utc;
use serde_json::Value;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use waitline_core::{EventType, OutboxEvent};
use waitline_outbox::{Consumer, OutboxStore};

/// Worker tuning, from the environment surface.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub poll_interval: Duration,
    pub batch_size: i64,
    pub max_attempts: i32,
    pub reminder_threshold: i64,
    pub lang: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 50,
            max_attempts: 3,
            reminder_threshold: 3,
            lang: DEFAULT_LANG.to_string(),
        }
    }
}

/// Retry delay after `attempts` tries: `min(5 min, 5 s × 2^(attempts−1))`.
#[must_use]
pub fn backoff(attempts: i32) -> Duration {
    let exponent = attempts.saturating_sub(1).clamp(0, 16) as u32;
    let delay = Duration::from_secs(5).saturating_mul(2u32.saturating_pow(exponent));
    delay.min(Duration::from_secs(300))
}

/// Outbox-driven notification worker.
#[derive(Clone)]
pub struct Worker {
    store: NotificationStore,
    outbox: OutboxStore,
    providers: ProviderSet,
    http: reqwest::Client,
    config: WorkerConfig,
}

impl Worker {
    #[must_use]
    pub fn new(
        store: NotificationStore,
        outbox: OutboxStore,
        providers: ProviderSet,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            outbox,
            providers,
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Run the outbox tail loop until aborted.
    pub async fn run_outbox_loop(self) {
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            poll_seconds = self.config.poll_interval.as_secs(),
            batch_size = self.config.batch_size,
            "notification worker started"
        );
        loop {
            ticker.tick().await;
            if let Err(err) = self.run_outbox_once().await {
                error!(error = %err, "notification outbox tick failed");
            }
        }
    }

    /// Run the pending-retry loop until aborted.
    pub async fn run_retry_loop(self) {
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = self.run_due_once().await {
                error!(error = %err, "notification retry tick failed");
            }
        }
    }

    /// One outbox tick: consume a batch and advance the cursor. A failing
    /// event is logged and skipped; the cursor still advances so one poison
    /// event cannot wedge the stream.
    pub async fn run_outbox_once(&self) -> Result<usize, NotifyError> {
        let mut cursor = self.outbox.get_cursor(Consumer::Notifications).await?;
        let events = self.outbox.list_after(cursor, self.config.batch_size).await?;
        if events.is_empty() {
            return Ok(0);
        }

        let count = events.len();
        for event in &events {
            if let Err(err) = self.process_event(event).await {
                error!(event_id = %event.event_id, error = %err, "failed to process event");
            }
            cursor.advance(event);
        }
        self.outbox
            .save_cursor(Consumer::Notifications, cursor)
            .await?;
        debug!(count, "processed outbox events");
        Ok(count)
    }

    /// One retry tick: claim due pending rows and redeliver them.
    pub async fn run_due_once(&self) -> Result<usize, NotifyError> {
        let mut tx = self.store.pool().begin().await?;
        let due = self.store.claim_due(&mut tx, self.config.batch_size).await?;
        if due.is_empty() {
            tx.commit().await?;
            return Ok(0);
        }

        let count = due.len();
        for notification in &due {
            self.deliver(&mut tx, notification).await?;
        }
        tx.commit().await?;
        info!(count, "redelivered due notifications");
        Ok(count)
    }

    async fn process_event(&self, event: &OutboxEvent) -> Result<(), NotifyError> {
        let Some(kind) = EventType::parse(&event.event_type) else {
            return Ok(());
        };
        let Some(template_id) = template_for_event(kind) else {
            return Ok(());
        };
        if !self.store.notifications_enabled(event.tenant_id).await? {
            return Ok(());
        }

        let channels = pick_channels(&event.payload);
        if channels.is_empty() {
            return Ok(());
        }

        for (channel, recipient) in &channels {
            self.send_templated(event, template_id, *channel, recipient, None)
                .await?;
        }

        // A freshly created ticket near the head of its queue also gets a
        // reminder carrying how many tickets are ahead of it.
        if kind == EventType::Created {
            if let Some(ahead) = self.reminder_position(event).await? {
                for (channel, recipient) in &channels {
                    self.send_templated(event, REMINDER_TEMPLATE, *channel, recipient, Some(ahead))
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Number of tickets ahead, when at or under the reminder threshold.
    async fn reminder_position(&self, event: &OutboxEvent) -> Result<Option<i64>, NotifyError> {
        let (Some(ticket_id), Some(branch_id), Some(service_id)) = (
            payload_uuid(&event.payload, "ticket_id"),
            payload_uuid(&event.payload, "branch_id"),
            payload_uuid(&event.payload, "service_id"),
        ) else {
            return Ok(None);
        };

        let position = self
            .store
            .queue_position(event.tenant_id, branch_id, service_id, ticket_id)
            .await?;
        if position <= 0 {
            return Ok(None);
        }
        let ahead = position - 1;
        if ahead <= self.config.reminder_threshold {
            Ok(Some(ahead))
        } else {
            Ok(None)
        }
    }

    async fn send_templated(
        &self,
        event: &OutboxEvent,
        template_id: &str,
        channel: Channel,
        recipient: &str,
        queue_position: Option<i64>,
    ) -> Result<(), NotifyError> {
        if self
            .store
            .is_suppressed(event.tenant_id, channel.as_str(), recipient)
            .await?
        {
            debug!(channel = %channel, "recipient suppressed");
            return Ok(());
        }

        let body = match self
            .store
            .get_template(event.tenant_id, template_id, &self.config.lang, channel.as_str())
            .await?
        {
            Some(body) => body,
            None => match default_template(template_id, &self.config.lang) {
                Some(body) => body.to_string(),
                None => return Ok(()),
            },
        };
        let message = render(&body, &event.payload, queue_position);

        let mut tx = self.store.pool().begin().await?;
        let notification_id = self
            .store
            .insert_pending(&mut tx, event.tenant_id, channel.as_str(), recipient, &message)
            .await?;
        let notification = Notification {
            notification_id,
            tenant_id: event.tenant_id,
            channel: channel.as_str().to_string(),
            recipient: recipient.to_string(),
            status: crate::store::NotificationStatus::Pending,
            attempts: 0,
            last_error: None,
            message,
            next_attempt_at: Some(Utc::now()),
            created_at: Utc::now(),
            sent_at: None,
        };
        self.deliver(&mut tx, &notification).await?;
        tx.commit().await?;
        Ok(())
    }

    /// One delivery attempt plus bookkeeping. Never returns a provider
    /// error; only database failures propagate.
    async fn deliver(
        &self,
        conn: &mut sqlx::PgConnection,
        notification: &Notification,
    ) -> Result<(), NotifyError> {
        let Some(channel) = parse_channel(&notification.channel) else {
            warn!(channel = %notification.channel, "unknown channel, dropping");
            self.store
                .mark_failed(conn, notification.notification_id, "unknown channel")
                .await?;
            return Ok(());
        };

        let provider = self.providers.for_channel(channel);
        match provider
            .send(&self.http, &notification.recipient, &notification.message)
            .await
        {
            Ok(()) => {
                self.store
                    .mark_sent(conn, notification.notification_id)
                    .await?;
                metrics::counter!("waitline_notifications_sent_total").increment(1);
            }
            Err(err) => {
                let attempts = notification.attempts + 1;
                if attempts >= self.config.max_attempts {
                    self.store
                        .mark_failed(conn, notification.notification_id, &err.to_string())
                        .await?;
                    self.store
                        .insert_dlq(conn, notification.notification_id, "max attempts reached")
                        .await?;
                    metrics::counter!("waitline_notifications_failed_total").increment(1);
                    warn!(
                        notification_id = %notification.notification_id,
                        attempts,
                        "notification dead-lettered"
                    );
                } else {
                    let next_attempt_at = Utc::now()
                        + chrono::Duration::from_std(backoff(attempts))
                            .unwrap_or_else(|_| chrono::Duration::seconds(300));
                    self.store
                        .mark_retry(
                            conn,
                            notification.notification_id,
                            &err.to_string(),
                            next_attempt_at,
                        )
                        .await?;
                    debug!(
                        notification_id = %notification.notification_id,
                        attempts,
                        "notification scheduled for retry"
                    );
                }
            }
        }
        Ok(())
    }
}

/// Channel targets from payload fields: `phone → sms`, `email → email`,
/// `whatsapp → whatsapp`, `device_token → push`.
#[must_use]
pub fn pick_channels(payload: &Value) -> Vec<(Channel, String)> {
    let mut channels = Vec::new();
    for (key, channel) in [
        ("phone", Channel::Sms),
        ("email", Channel::Email),
        ("whatsapp", Channel::Whatsapp),
        ("device_token", Channel::Push),
    ] {
        if let Some(Value::String(recipient)) = payload.get(key) {
            if !recipient.is_empty() {
                channels.push((channel, recipient.clone()));
            }
        }
    }
    channels
}

fn parse_channel(s: &str) -> Option<Channel> {
    match s {
        "sms" => Some(Channel::Sms),
        "email" => Some(Channel::Email),
        "whatsapp" => Some(Channel::Whatsapp),
        "push" => Some(Channel::Push),
        _ => None,
    }
}

fn payload_uuid(payload: &Value, key: &str) -> Option<Uuid> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .and_then(|raw| Uuid::parse_str(raw).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn backoff_doubles_and_caps_at_five_minutes() {
        assert_eq!(backoff(1), Duration::from_secs(5));
        assert_eq!(backoff(2), Duration::from_secs(10));
        assert_eq!(backoff(3), Duration::from_secs(20));
        assert_eq!(backoff(4), Duration::from_secs(40));
        assert_eq!(backoff(7), Duration::from_secs(300));
        assert_eq!(backoff(30), Duration::from_secs(300));
        // Defensive floor for bad input.
        assert_eq!(backoff(0), Duration::from_secs(5));
    }

    #[test]
    fn channels_come_from_payload_fields() {
        let payload = json!({
            "phone": "a1b2c3",
            "email": "guest@example.com",
            "device_token": "tok-1",
            "ticket_number": "CS-001",
        });
        let channels = pick_channels(&payload);
        assert_eq!(channels.len(), 3);
        assert!(channels.contains(&(Channel::Sms, "a1b2c3".to_string())));
        assert!(channels.contains(&(Channel::Email, "guest@example.com".to_string())));
        assert!(channels.contains(&(Channel::Push, "tok-1".to_string())));
    }

    #[test]
    fn empty_and_missing_recipients_select_nothing() {
        assert!(pick_channels(&json!({})).is_empty());
        assert!(pick_channels(&json!({"phone": "", "email": null})).is_empty());
    }

    #[test]
    fn channel_round_trip() {
        for channel in [Channel::Sms, Channel::Email, Channel::Whatsapp, Channel::Push] {
            assert_eq!(parse_channel(channel.as_str()), Some(channel));
        }
        assert_eq!(parse_channel("fax"), None);
    }
}
