//! Mutating ticket endpoints and single-ticket reads.

use crate::error::ApiError;
use crate::extract::{is_valid_phone, parse_optional_uuid, parse_uuid, ApiJson};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use waitline_core::Ticket;
use waitline_store::{CallNextInput, CreateTicketInput, TicketActionInput};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateTicketRequest {
    #[serde(default)]
    request_id: String,
    #[serde(default)]
    tenant_id: String,
    #[serde(default)]
    branch_id: String,
    #[serde(default)]
    service_id: String,
    #[serde(default)]
    area_id: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    priority_class: Option<String>,
    #[serde(default)]
    phone: Option<String>,
}

/// POST /api/tickets
pub async fn create_ticket(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateTicketRequest>,
) -> Result<Json<Ticket>, ApiError> {
    let request_id = parse_uuid("request_id", &req.request_id, &req.request_id)?;
    let tenant_id = parse_uuid("tenant_id", &req.tenant_id, &req.request_id)?;
    let branch_id = parse_uuid("branch_id", &req.branch_id, &req.request_id)?;
    let service_id = parse_uuid("service_id", &req.service_id, &req.request_id)?;
    let area_id = parse_optional_uuid("area_id", req.area_id.as_deref(), &req.request_id)?;

    let phone = req.phone.as_deref().map(str::trim).filter(|p| !p.is_empty());
    if let Some(phone) = phone {
        if !is_valid_phone(phone) {
            return Err(ApiError::invalid_request("phone must be 8-16 digits")
                .with_request_id(&req.request_id));
        }
    }

    let ticket = state
        .store
        .create_ticket(CreateTicketInput {
            request_id,
            tenant_id,
            branch_id,
            service_id,
            area_id,
            channel: req.channel.clone().map(|c| c.trim().to_string()),
            priority_class: req.priority_class.clone().map(|c| c.trim().to_string()),
            phone: phone.map(ToString::to_string),
        })
        .await
        .map_err(|err| ApiError::from(err).with_request_id(&req.request_id))?;
    Ok(Json(ticket))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallNextRequest {
    #[serde(default)]
    request_id: String,
    #[serde(default)]
    tenant_id: String,
    #[serde(default)]
    branch_id: String,
    #[serde(default)]
    service_id: String,
    #[serde(default)]
    counter_id: String,
}

/// POST /api/tickets/actions/call-next
pub async fn call_next(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CallNextRequest>,
) -> Result<Json<Ticket>, ApiError> {
    let request_id = parse_uuid("request_id", &req.request_id, &req.request_id)?;
    let tenant_id = parse_uuid("tenant_id", &req.tenant_id, &req.request_id)?;
    let branch_id = parse_uuid("branch_id", &req.branch_id, &req.request_id)?;
    let service_id = parse_uuid("service_id", &req.service_id, &req.request_id)?;
    let counter_id = parse_uuid("counter_id", &req.counter_id, &req.request_id)?;

    let ticket = state
        .store
        .call_next(CallNextInput {
            request_id,
            tenant_id,
            branch_id,
            service_id,
            counter_id,
        })
        .await
        .map_err(|err| ApiError::from(err).with_request_id(&req.request_id))?;
    Ok(Json(ticket))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TicketActionRequest {
    #[serde(default)]
    request_id: String,
    #[serde(default)]
    tenant_id: String,
    #[serde(default)]
    branch_id: String,
    #[serde(default)]
    counter_id: Option<String>,
}

/// POST /api/tickets/:id/actions/:action
///
/// `action` is one of start, complete, cancel, recall, hold, unhold,
/// no-show. Transfer has its own route and body.
pub async fn ticket_action(
    State(state): State<AppState>,
    Path((ticket_id, action)): Path<(String, String)>,
    ApiJson(req): ApiJson<TicketActionRequest>,
) -> Result<Json<Ticket>, ApiError> {
    let ticket_id = parse_uuid("ticket_id", &ticket_id, &req.request_id)?;
    let input = TicketActionInput {
        request_id: parse_uuid("request_id", &req.request_id, &req.request_id)?,
        tenant_id: parse_uuid("tenant_id", &req.tenant_id, &req.request_id)?,
        branch_id: parse_uuid("branch_id", &req.branch_id, &req.request_id)?,
        ticket_id,
        counter_id: parse_optional_uuid("counter_id", req.counter_id.as_deref(), &req.request_id)?,
        to_service_id: None,
        reason: None,
    };

    let result = match action.as_str() {
        "start" => state.store.start_serving(input).await,
        "complete" => state.store.complete(input).await,
        "cancel" => state.store.cancel(input).await,
        "recall" => state.store.recall(input).await,
        "hold" => state.store.hold(input).await,
        "unhold" => state.store.unhold(input).await,
        "no-show" => state.store.no_show(input).await,
        _ => {
            return Err(ApiError::new(
                StatusCode::NOT_FOUND,
                "invalid_request",
                format!("unknown action {action:?}"),
            )
            .with_request_id(&req.request_id));
        }
    };

    result
        .map(Json)
        .map_err(|err| ApiError::from(err).with_request_id(&req.request_id))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransferRequest {
    #[serde(default)]
    request_id: String,
    #[serde(default)]
    tenant_id: String,
    #[serde(default)]
    branch_id: String,
    #[serde(default)]
    to_service_id: String,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    counter_id: Option<String>,
}

/// POST /api/tickets/:id/actions/transfer
pub async fn transfer(
    State(state): State<AppState>,
    Path(ticket_id): Path<String>,
    ApiJson(req): ApiJson<TransferRequest>,
) -> Result<Json<Ticket>, ApiError> {
    let ticket_id = parse_uuid("ticket_id", &ticket_id, &req.request_id)?;
    let reason = req
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(ToString::to_string);

    let ticket = state
        .store
        .transfer(TicketActionInput {
            request_id: parse_uuid("request_id", &req.request_id, &req.request_id)?,
            tenant_id: parse_uuid("tenant_id", &req.tenant_id, &req.request_id)?,
            branch_id: parse_uuid("branch_id", &req.branch_id, &req.request_id)?,
            ticket_id,
            counter_id: parse_optional_uuid(
                "counter_id",
                req.counter_id.as_deref(),
                &req.request_id,
            )?,
            to_service_id: Some(parse_uuid(
                "to_service_id",
                &req.to_service_id,
                &req.request_id,
            )?),
            reason,
        })
        .await
        .map_err(|err| ApiError::from(err).with_request_id(&req.request_id))?;
    Ok(Json(ticket))
}

#[derive(Debug, Deserialize)]
pub struct ScopeQuery {
    #[serde(default)]
    tenant_id: String,
    #[serde(default)]
    branch_id: String,
    #[serde(default)]
    service_id: Option<String>,
    #[serde(default)]
    counter_id: Option<String>,
}

/// GET /api/tickets/:id
pub async fn get_ticket(
    State(state): State<AppState>,
    Path(ticket_id): Path<String>,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<Ticket>, ApiError> {
    let ticket_id = parse_uuid("ticket_id", &ticket_id, "")?;
    let tenant_id = parse_uuid("tenant_id", &query.tenant_id, "")?;
    let branch_id = parse_uuid("branch_id", &query.branch_id, "")?;

    let ticket = state
        .store
        .get_ticket(tenant_id, branch_id, ticket_id)
        .await?;
    Ok(Json(ticket))
}

/// GET /api/tickets/snapshot
pub async fn snapshot(
    State(state): State<AppState>,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<Vec<Ticket>>, ApiError> {
    let tenant_id = parse_uuid("tenant_id", &query.tenant_id, "")?;
    let branch_id = parse_uuid("branch_id", &query.branch_id, "")?;
    let service_id = parse_uuid(
        "service_id",
        query.service_id.as_deref().unwrap_or_default(),
        "",
    )?;

    let tickets = state
        .store
        .snapshot_tickets(tenant_id, branch_id, service_id)
        .await?;
    Ok(Json(tickets))
}

/// GET /api/tickets/active
pub async fn active_ticket(
    State(state): State<AppState>,
    Query(query): Query<ScopeQuery>,
) -> Result<Response, ApiError> {
    let tenant_id = parse_uuid("tenant_id", &query.tenant_id, "")?;
    let branch_id = parse_uuid("branch_id", &query.branch_id, "")?;
    let counter_id = parse_uuid(
        "counter_id",
        query.counter_id.as_deref().unwrap_or_default(),
        "",
    )?;

    let ticket = state
        .store
        .get_active_ticket(tenant_id, branch_id, counter_id)
        .await?;
    Ok(match ticket {
        Some(ticket) => Json(ticket).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}
