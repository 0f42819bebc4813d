//! Error envelope and status mapping.
//!
//! Every failure leaves the API as
//! `{"request_id": "...", "error": {"code": "...", "message": "..."}}` with
//! the status code fixed per error kind. Store errors map one-for-one;
//! anything unexpected was already collapsed to `internal_error` below.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;
use waitline_core::QueueError;

/// An API failure carrying its wire representation.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    request_id: String,
}

impl ApiError {
    #[must_use]
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            request_id: String::new(),
        }
    }

    /// Attach the request id echoed in the envelope.
    #[must_use]
    pub fn with_request_id(mut self, request_id: &str) -> Self {
        self.request_id = request_id.to_string();
        self
    }

    /// 400 with code `invalid_request`.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
    }

    /// 400 with code `invalid_json`.
    #[must_use]
    pub fn invalid_json() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_json", "invalid JSON payload")
    }

    /// 429 with code `rate_limited`.
    #[must_use]
    pub fn rate_limited() -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, "rate_limited", "too many requests")
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        let status = match &err {
            QueueError::ServiceNotFound
            | QueueError::BranchNotFound
            | QueueError::TicketNotFound
            | QueueError::CounterNotFound => StatusCode::NOT_FOUND,
            QueueError::InvalidState
            | QueueError::CounterMismatch
            | QueueError::CounterUnavailable
            | QueueError::QueueEmpty
            | QueueError::HolidayClosed => StatusCode::CONFLICT,
            QueueError::AccessDenied => StatusCode::FORBIDDEN,
            QueueError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match &err {
            // Internal details stay in the logs, not on the wire.
            QueueError::Internal(detail) => {
                error!(detail = %detail, "internal error");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        Self::new(status, err.code(), message)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

#[derive(Serialize)]
struct ErrorEnvelope {
    request_id: String,
    error: ErrorBody,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorEnvelope {
            request_id: self.request_id,
            error: ErrorBody {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_documented_statuses() {
        let cases = [
            (QueueError::ServiceNotFound, StatusCode::NOT_FOUND, "service_not_found"),
            (QueueError::TicketNotFound, StatusCode::NOT_FOUND, "ticket_not_found"),
            (QueueError::CounterNotFound, StatusCode::NOT_FOUND, "counter_not_found"),
            (QueueError::BranchNotFound, StatusCode::NOT_FOUND, "branch_not_found"),
            (QueueError::InvalidState, StatusCode::CONFLICT, "invalid_state"),
            (QueueError::CounterMismatch, StatusCode::CONFLICT, "counter_mismatch"),
            (QueueError::CounterUnavailable, StatusCode::CONFLICT, "counter_unavailable"),
            (QueueError::QueueEmpty, StatusCode::CONFLICT, "queue_empty"),
            (QueueError::HolidayClosed, StatusCode::CONFLICT, "holiday_closed"),
            (QueueError::AccessDenied, StatusCode::FORBIDDEN, "access_denied"),
        ];
        for (err, status, code) in cases {
            let api: ApiError = err.into();
            assert_eq!(api.status(), status, "{code}");
            assert_eq!(api.code(), code);
        }
    }

    #[test]
    fn internal_errors_hide_their_detail() {
        let api: ApiError = QueueError::internal("pool exhausted").into();
        assert_eq!(api.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.code(), "internal_error");
        assert_eq!(api.message, "internal server error");
    }

    #[test]
    fn envelope_shape() {
        let api = ApiError::invalid_request("tenant_id is required")
            .with_request_id("req-1");
        let response = api.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
