//! Queue, event-log and reference-data endpoints.

use crate::error::ApiError;
use crate::extract::{parse_optional_uuid, parse_uuid, ApiJson};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use waitline_core::ticket::{Counter, Service};
use waitline_core::{OutboxEvent, Ticket, TicketEvent};

#[derive(Debug, Deserialize)]
pub struct QueueQuery {
    #[serde(default)]
    tenant_id: String,
    #[serde(default)]
    branch_id: String,
    #[serde(default)]
    service_id: Option<String>,
}

/// GET /api/queues — waiting and held tickets, oldest first.
pub async fn list_queue(
    State(state): State<AppState>,
    Query(query): Query<QueueQuery>,
) -> Result<Json<Vec<Ticket>>, ApiError> {
    let tenant_id = parse_uuid("tenant_id", &query.tenant_id, "")?;
    let branch_id = parse_uuid("branch_id", &query.branch_id, "")?;
    let service_id = parse_optional_uuid("service_id", query.service_id.as_deref(), "")?;

    let tickets = state
        .store
        .list_queue(tenant_id, branch_id, service_id)
        .await?;
    Ok(Json(tickets))
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    tenant_id: String,
    #[serde(default)]
    after: Option<String>,
    #[serde(default)]
    limit: Option<String>,
}

/// GET /api/events — tenant-scoped outbox tail.
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Vec<OutboxEvent>>, ApiError> {
    let tenant_id = parse_uuid("tenant_id", &query.tenant_id, "")?;

    let after = match query.after.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| ApiError::invalid_request("after must be an RFC3339 timestamp"))?,
        ),
    };
    let limit = match query.limit.as_deref().map(str::trim) {
        None | Some("") => 100,
        Some(raw) => raw
            .parse::<i64>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| ApiError::invalid_request("limit must be a positive integer"))?,
    };

    let events = state
        .store
        .list_outbox_events(tenant_id, after, limit)
        .await?;
    Ok(Json(events))
}

#[derive(Debug, Deserialize)]
pub struct TenantQuery {
    #[serde(default)]
    tenant_id: String,
    #[serde(default)]
    branch_id: Option<String>,
}

/// GET /api/tickets/:id/events — a ticket's hash-chained log.
pub async fn ticket_events(
    State(state): State<AppState>,
    Path(ticket_id): Path<String>,
    Query(query): Query<TenantQuery>,
) -> Result<Json<Vec<TicketEvent>>, ApiError> {
    let ticket_id = parse_uuid("ticket_id", &ticket_id, "")?;
    let tenant_id = parse_uuid("tenant_id", &query.tenant_id, "")?;

    let events = state.store.list_ticket_events(tenant_id, ticket_id).await?;
    Ok(Json(events))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckinRequest {
    #[serde(default)]
    request_id: String,
    #[serde(default)]
    tenant_id: String,
    #[serde(default)]
    branch_id: String,
    #[serde(default)]
    appointment_id: String,
}

/// POST /api/appointments/checkin
pub async fn appointment_checkin(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CheckinRequest>,
) -> Result<Json<Ticket>, ApiError> {
    let request_id = parse_uuid("request_id", &req.request_id, &req.request_id)?;
    let tenant_id = parse_uuid("tenant_id", &req.tenant_id, &req.request_id)?;
    let branch_id = parse_uuid("branch_id", &req.branch_id, &req.request_id)?;
    let appointment_id = parse_uuid("appointment_id", &req.appointment_id, &req.request_id)?;

    let ticket = state
        .store
        .check_in_appointment(request_id, tenant_id, branch_id, appointment_id)
        .await
        .map_err(|err| ApiError::from(err).with_request_id(&req.request_id))?;
    Ok(Json(ticket))
}

#[derive(Debug, Deserialize)]
pub struct BranchQuery {
    #[serde(default)]
    tenant_id: String,
    #[serde(default)]
    branch_id: String,
}

/// GET /api/counters
pub async fn list_counters(
    State(state): State<AppState>,
    Query(query): Query<BranchQuery>,
) -> Result<Json<Vec<Counter>>, ApiError> {
    let tenant_id = parse_uuid("tenant_id", &query.tenant_id, "")?;
    let branch_id = parse_uuid("branch_id", &query.branch_id, "")?;

    let counters = state.store.list_counters(tenant_id, branch_id).await?;
    Ok(Json(counters))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CounterStatusRequest {
    #[serde(default)]
    tenant_id: String,
    #[serde(default)]
    branch_id: String,
    #[serde(default)]
    status: String,
}

/// PUT /api/counters/:id/status
pub async fn update_counter_status(
    State(state): State<AppState>,
    Path(counter_id): Path<String>,
    ApiJson(req): ApiJson<CounterStatusRequest>,
) -> Result<StatusCode, ApiError> {
    let counter_id = parse_uuid("counter_id", &counter_id, "")?;
    let tenant_id = parse_uuid("tenant_id", &req.tenant_id, "")?;
    let branch_id = parse_uuid("branch_id", &req.branch_id, "")?;

    let status = req.status.trim().to_ascii_lowercase();
    if status.is_empty() {
        return Err(ApiError::invalid_request("status is required"));
    }

    state
        .store
        .update_counter_status(tenant_id, branch_id, counter_id, &status)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/services
pub async fn list_services(
    State(state): State<AppState>,
    Query(query): Query<BranchQuery>,
) -> Result<Json<Vec<Service>>, ApiError> {
    let tenant_id = parse_uuid("tenant_id", &query.tenant_id, "")?;
    let branch_id = parse_uuid("branch_id", &query.branch_id, "")?;

    let services = state.store.list_services(tenant_id, branch_id).await?;
    Ok(Json(services))
}
