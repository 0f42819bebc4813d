//! WebSocket session handling for the `/realtime` mount.
//!
//! Close codes: 4001 missing session, 4002 invalid session, 4003 access
//! denied. A subscribe that exceeds the caller's allowed scope closes the
//! socket permanently rather than silently narrowing it.

use crate::hub::{ClientMessage, Hub, Subscription};
use crate::session::SessionStore;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const CLOSE_MISSING_SESSION: u16 = 4001;
const CLOSE_INVALID_SESSION: u16 = 4002;
const CLOSE_ACCESS_DENIED: u16 = 4003;

/// Shared state for the realtime mount.
#[derive(Clone)]
pub struct RealtimeState {
    pub hub: Arc<Hub>,
    pub sessions: SessionStore,
}

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    #[serde(default)]
    session_id: Option<String>,
}

/// Upgrade handler for `GET /realtime`.
///
/// The session token comes from the `Authorization: Bearer` header or the
/// `session_id` query parameter.
pub async fn realtime_handler(
    ws: WebSocketUpgrade,
    State(state): State<RealtimeState>,
    headers: HeaderMap,
    Query(params): Query<ConnectParams>,
) -> Response {
    let token = bearer_token(&headers).or(params.session_id);
    ws.on_upgrade(move |socket| handle_session(socket, state, token))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let header = headers.get("authorization")?.to_str().ok()?;
    let mut parts = header.split_whitespace();
    let scheme = parts.next()?;
    let token = parts.next()?;
    if parts.next().is_some() || !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.to_string())
}

async fn close_with(mut socket: WebSocket, code: u16, reason: &'static str) {
    let frame = CloseFrame {
        code,
        reason: Cow::Borrowed(reason),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

async fn handle_session(socket: WebSocket, state: RealtimeState, token: Option<String>) {
    let Some(token) = token else {
        return close_with(socket, CLOSE_MISSING_SESSION, "missing session").await;
    };
    let Ok(session_id) = Uuid::parse_str(token.trim()) else {
        return close_with(socket, CLOSE_INVALID_SESSION, "invalid session").await;
    };

    let session = match state.sessions.get_session(session_id).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            return close_with(socket, CLOSE_INVALID_SESSION, "invalid session").await;
        }
        Err(err) => {
            warn!(error = %err, "session lookup failed");
            return close_with(socket, CLOSE_ACCESS_DENIED, "access lookup failed").await;
        }
    };
    let access = match state.sessions.get_access(session.user_id).await {
        Ok(access) => access,
        Err(err) => {
            warn!(error = %err, "access lookup failed");
            return close_with(socket, CLOSE_ACCESS_DENIED, "access lookup failed").await;
        }
    };

    let client_id = Uuid::new_v4();
    let mut queue = state.hub.register(client_id).await;
    info!(client_id = %client_id, tenant_id = %session.tenant_id, "realtime client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Forward the bounded queue to the socket. The queue closing (either
    // side unregistering) ends the task.
    let mut send_task = tokio::spawn(async move {
        while let Some(message) = queue.recv().await {
            let is_close = matches!(message, Message::Close(_));
            if ws_tx.send(message).await.is_err() {
                break;
            }
            if is_close {
                break;
            }
        }
    });

    let hub = Arc::clone(&state.hub);
    let tenant_id = session.tenant_id;
    let mut recv_task = {
        let hub = Arc::clone(&hub);
        tokio::spawn(async move {
            while let Some(Ok(message)) = ws_rx.next().await {
                let text = match message {
                    Message::Text(text) => text,
                    Message::Close(_) => break,
                    _ => continue,
                };
                let Ok(parsed) = serde_json::from_str::<ClientMessage>(&text) else {
                    debug!(client_id = %client_id, "ignoring malformed client message");
                    continue;
                };
                match parsed.action.as_str() {
                    "subscribe" => {
                        if !access.allows(parsed.branch_id, parsed.service_id) {
                            warn!(client_id = %client_id, "subscription exceeds allowed scope");
                            hub.send_close(client_id, CLOSE_ACCESS_DENIED, "access denied").await;
                            break;
                        }
                        hub.set_subscription(
                            client_id,
                            Some(Subscription {
                                tenant_id: Some(tenant_id),
                                branch_id: parsed.branch_id,
                                service_id: parsed.service_id,
                            }),
                        )
                        .await;
                    }
                    "unsubscribe" => {
                        hub.set_subscription(client_id, None).await;
                    }
                    other => {
                        debug!(client_id = %client_id, action = other, "unknown action");
                    }
                }
            }
        })
    };

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => {
            // Unregistering drops the queue's sender; the send task drains
            // what is already queued (a close frame included) and exits.
            state.hub.unregister(client_id).await;
            let _ = tokio::time::timeout(std::time::Duration::from_secs(5), send_task).await;
        }
    }

    state.hub.unregister(client_id).await;
    info!(client_id = %client_id, "realtime client disconnected");
}
