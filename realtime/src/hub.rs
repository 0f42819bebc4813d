//! Client registry and subscription fan-out.
//!
//! The hub's only in-process state is the client map behind a read-write
//! lock; broadcasts take the shared lock. Per-client send queues are
//! bounded, and a full queue drops the message rather than blocking the
//! poller. Clients recover through REST snapshots.

use axum::extract::ws::Message;
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

/// Bounded depth of each client's send queue.
pub const CLIENT_QUEUE_DEPTH: usize = 16;

/// A client's scope filter. Omitted fields match any event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Subscription {
    pub tenant_id: Option<Uuid>,
    pub branch_id: Option<Uuid>,
    pub service_id: Option<Uuid>,
}

impl Subscription {
    /// Whether an event with this scope reaches the subscriber.
    #[must_use]
    pub fn matches(&self, tenant_id: Uuid, branch_id: Option<Uuid>, service_id: Option<Uuid>) -> bool {
        if let Some(sub_tenant) = self.tenant_id {
            if sub_tenant != tenant_id {
                return false;
            }
        }
        if let Some(sub_branch) = self.branch_id {
            if branch_id != Some(sub_branch) {
                return false;
            }
        }
        if let Some(sub_service) = self.service_id {
            if service_id != Some(sub_service) {
                return false;
            }
        }
        true
    }
}

/// Client message on the realtime transport.
#[derive(Debug, Deserialize)]
pub struct ClientMessage {
    pub action: String,
    #[serde(default)]
    pub branch_id: Option<Uuid>,
    #[serde(default)]
    pub service_id: Option<Uuid>,
}

struct ClientEntry {
    sender: mpsc::Sender<Message>,
    /// `None` until the first subscribe; such clients receive nothing.
    subscription: Option<Subscription>,
}

/// Connected-client registry.
#[derive(Default)]
pub struct Hub {
    clients: RwLock<HashMap<Uuid, ClientEntry>>,
}

impl Hub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client and return the receiving end of its send queue.
    pub async fn register(&self, client_id: Uuid) -> mpsc::Receiver<Message> {
        let (sender, receiver) = mpsc::channel(CLIENT_QUEUE_DEPTH);
        let mut clients = self.clients.write().await;
        clients.insert(
            client_id,
            ClientEntry {
                sender,
                subscription: None,
            },
        );
        receiver
    }

    /// Remove a client; its queue closes when the sender drops.
    pub async fn unregister(&self, client_id: Uuid) {
        self.clients.write().await.remove(&client_id);
    }

    /// Replace a client's subscription. `None` stops all delivery.
    pub async fn set_subscription(&self, client_id: Uuid, subscription: Option<Subscription>) {
        if let Some(entry) = self.clients.write().await.get_mut(&client_id) {
            entry.subscription = subscription;
        }
    }

    /// Push a close frame through a client's queue, waiting for space.
    pub async fn send_close(&self, client_id: Uuid, code: u16, reason: &'static str) {
        let sender = {
            let clients = self.clients.read().await;
            clients.get(&client_id).map(|entry| entry.sender.clone())
        };
        if let Some(sender) = sender {
            let frame = axum::extract::ws::CloseFrame {
                code,
                reason: std::borrow::Cow::Borrowed(reason),
            };
            let _ = sender.send(Message::Close(Some(frame))).await;
        }
    }

    /// Number of connected clients.
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Deliver one event to every matching subscriber.
    ///
    /// Sends are non-blocking: a client whose queue is full loses the
    /// message (logged, never retried).
    pub async fn broadcast(
        &self,
        tenant_id: Uuid,
        branch_id: Option<Uuid>,
        service_id: Option<Uuid>,
        message: &str,
    ) {
        let clients = self.clients.read().await;
        for (client_id, entry) in clients.iter() {
            let Some(subscription) = entry.subscription else {
                continue;
            };
            if !subscription.matches(tenant_id, branch_id, service_id) {
                continue;
            }
            match entry.sender.try_send(Message::Text(message.to_string())) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    metrics::counter!("waitline_realtime_dropped_total").increment(1);
                    warn!(client_id = %client_id, "client queue full, dropping event");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(client_id = %client_id, "client queue closed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_subscription_matches_everything() {
        let sub = Subscription::default();
        assert!(sub.matches(Uuid::new_v4(), Some(Uuid::new_v4()), None));
        assert!(sub.matches(Uuid::new_v4(), None, Some(Uuid::new_v4())));
    }

    #[test]
    fn tenant_filter_is_exact() {
        let tenant = Uuid::new_v4();
        let sub = Subscription {
            tenant_id: Some(tenant),
            ..Subscription::default()
        };
        assert!(sub.matches(tenant, None, None));
        assert!(!sub.matches(Uuid::new_v4(), None, None));
    }

    #[test]
    fn branch_and_service_filters_require_payload_fields() {
        let branch = Uuid::new_v4();
        let service = Uuid::new_v4();
        let sub = Subscription {
            tenant_id: None,
            branch_id: Some(branch),
            service_id: Some(service),
        };
        assert!(sub.matches(Uuid::new_v4(), Some(branch), Some(service)));
        // An event without the field cannot match a set filter.
        assert!(!sub.matches(Uuid::new_v4(), None, Some(service)));
        assert!(!sub.matches(Uuid::new_v4(), Some(branch), None));
        assert!(!sub.matches(Uuid::new_v4(), Some(Uuid::new_v4()), Some(service)));
    }

    #[tokio::test]
    async fn broadcast_reaches_matching_clients_only() {
        let hub = Hub::new();
        let tenant = Uuid::new_v4();
        let branch = Uuid::new_v4();

        let scoped = Uuid::new_v4();
        let mut scoped_rx = hub.register(scoped).await;
        hub.set_subscription(
            scoped,
            Some(Subscription {
                tenant_id: Some(tenant),
                branch_id: Some(branch),
                service_id: None,
            }),
        )
        .await;

        let elsewhere = Uuid::new_v4();
        let mut elsewhere_rx = hub.register(elsewhere).await;
        hub.set_subscription(
            elsewhere,
            Some(Subscription {
                tenant_id: Some(tenant),
                branch_id: Some(Uuid::new_v4()),
                service_id: None,
            }),
        )
        .await;

        hub.broadcast(tenant, Some(branch), None, "called").await;

        let message = scoped_rx.try_recv().expect("scoped client receives");
        assert!(matches!(message, Message::Text(text) if text == "called"));
        assert!(elsewhere_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let hub = Hub::new();
        let tenant = Uuid::new_v4();
        let client = Uuid::new_v4();
        let mut rx = hub.register(client).await;
        hub.set_subscription(
            client,
            Some(Subscription {
                tenant_id: Some(tenant),
                ..Subscription::default()
            }),
        )
        .await;

        for i in 0..(CLIENT_QUEUE_DEPTH + 5) {
            hub.broadcast(tenant, None, None, &format!("event-{i}")).await;
        }

        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, CLIENT_QUEUE_DEPTH);
    }

    #[tokio::test]
    async fn unregister_closes_the_queue() {
        let hub = Hub::new();
        let client = Uuid::new_v4();
        let mut rx = hub.register(client).await;
        assert_eq!(hub.client_count().await, 1);
        hub.unregister(client).await;
        assert_eq!(hub.client_count().await, 0);
        assert!(rx.recv().await.is_none());
    }
}
