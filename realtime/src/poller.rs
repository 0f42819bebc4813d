//! Outbox broadcast poller.
//!
//! Tails `outbox_events` with the realtime compound cursor and pushes each
//! event to matching hub subscribers. The loop body is awaited inline, which
//! keeps ticks single-flight; after a successful batch the cursor is
//! persisted and rows behind both consumers are purged.

use crate::hub::Hub;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};
use uuid::Uuid;
use waitline_core::OutboxEvent;
use waitline_outbox::{Consumer, OutboxStore};

/// Wire envelope for server-to-client messages.
#[derive(Debug, Serialize)]
struct EventEnvelope<'a> {
    #[serde(rename = "type")]
    event_type: &'a str,
    payload: &'a serde_json::Value,
    created_at: DateTime<Utc>,
}

/// Background task tailing the outbox into the hub.
pub struct BroadcastPoller {
    hub: Arc<Hub>,
    outbox: OutboxStore,
    poll_interval: Duration,
    batch_size: i64,
}

impl BroadcastPoller {
    #[must_use]
    pub const fn new(
        hub: Arc<Hub>,
        outbox: OutboxStore,
        poll_interval: Duration,
        batch_size: i64,
    ) -> Self {
        Self {
            hub,
            outbox,
            poll_interval,
            batch_size,
        }
    }

    /// Run until the task is aborted.
    pub async fn run(self) {
        let mut cursor = match self.outbox.get_cursor(Consumer::Realtime).await {
            Ok(cursor) => cursor,
            Err(err) => {
                error!(error = %err, "failed to load realtime cursor, starting at origin");
                waitline_outbox::OutboxCursor::origin()
            }
        };

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            poll_seconds = self.poll_interval.as_secs(),
            batch_size = self.batch_size,
            "realtime poller started"
        );

        loop {
            ticker.tick().await;

            let events = match self.outbox.list_after(cursor, self.batch_size).await {
                Ok(events) => events,
                Err(err) => {
                    error!(error = %err, "outbox poll failed");
                    continue;
                }
            };
            if events.is_empty() {
                continue;
            }

            let count = events.len();
            for event in &events {
                self.broadcast_event(event).await;
                cursor.advance(event);
            }
            debug!(count, "broadcast outbox events");
            metrics::counter!("waitline_realtime_broadcast_total").increment(count as u64);

            if let Err(err) = self.outbox.save_cursor(Consumer::Realtime, cursor).await {
                error!(error = %err, "failed to persist realtime cursor");
                continue;
            }
            if let Err(err) = self.outbox.cleanup().await {
                error!(error = %err, "outbox cleanup failed");
            }
        }
    }

    async fn broadcast_event(&self, event: &OutboxEvent) {
        let envelope = EventEnvelope {
            event_type: &event.event_type,
            payload: &event.payload,
            created_at: event.created_at,
        };
        let Ok(message) = serde_json::to_string(&envelope) else {
            error!(event_id = %event.event_id, "failed to serialize event envelope");
            return;
        };

        let branch_id = payload_uuid(&event.payload, "branch_id");
        let service_id = payload_uuid(&event.payload, "service_id");
        self.hub
            .broadcast(event.tenant_id, branch_id, service_id, &message)
            .await;
    }
}

fn payload_uuid(payload: &serde_json::Value, key: &str) -> Option<Uuid> {
    payload
        .get(key)
        .and_then(serde_json::Value::as_str)
        .and_then(|raw| Uuid::parse_str(raw).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_uuid_parses_valid_fields() {
        let id = Uuid::new_v4();
        let payload = json!({"branch_id": id.to_string(), "service_id": null, "other": 7});
        assert_eq!(payload_uuid(&payload, "branch_id"), Some(id));
        assert_eq!(payload_uuid(&payload, "service_id"), None);
        assert_eq!(payload_uuid(&payload, "missing"), None);
        assert_eq!(payload_uuid(&payload, "other"), None);
    }

    #[test]
    fn envelope_shape_matches_the_transport_contract() {
        let payload = json!({"ticket_number": "CS-001"});
        let envelope = EventEnvelope {
            event_type: "ticket.called",
            payload: &payload,
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&envelope).expect("serialize");
        assert_eq!(value["type"], "ticket.called");
        assert_eq!(value["payload"]["ticket_number"], "CS-001");
        assert!(value.get("created_at").is_some());
    }
}
