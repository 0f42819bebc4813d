//! Error kinds surfaced by the queue core.
//!
//! The set is closed: every failure a component reports to its caller is one
//! of these kinds, and the HTTP layer maps them one-for-one onto wire codes
//! and status codes. Anything unexpected collapses into [`QueueError::Internal`]
//! after being logged.

use thiserror::Error;

/// Domain failure reported by the queue core.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("service not found")]
    ServiceNotFound,

    #[error("branch not found")]
    BranchNotFound,

    #[error("ticket not found")]
    TicketNotFound,

    #[error("counter not found")]
    CounterNotFound,

    #[error("counter unavailable")]
    CounterUnavailable,

    #[error("ticket assigned to different counter")]
    CounterMismatch,

    #[error("ticket state does not allow this action")]
    InvalidState,

    #[error("no tickets available")]
    QueueEmpty,

    #[error("appointments are closed for this holiday")]
    HolidayClosed,

    #[error("access denied")]
    AccessDenied,

    #[error("internal error: {0}")]
    Internal(String),
}

impl QueueError {
    /// Wrap an unexpected lower-level failure.
    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::Internal(err.to_string())
    }

    /// Stable wire code for the error envelope.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ServiceNotFound => "service_not_found",
            Self::BranchNotFound => "branch_not_found",
            Self::TicketNotFound => "ticket_not_found",
            Self::CounterNotFound => "counter_not_found",
            Self::CounterUnavailable => "counter_unavailable",
            Self::CounterMismatch => "counter_mismatch",
            Self::InvalidState => "invalid_state",
            Self::QueueEmpty => "queue_empty",
            Self::HolidayClosed => "holiday_closed",
            Self::AccessDenied => "access_denied",
            Self::Internal(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(QueueError::QueueEmpty.code(), "queue_empty");
        assert_eq!(QueueError::CounterMismatch.code(), "counter_mismatch");
        assert_eq!(QueueError::internal("boom").code(), "internal_error");
    }

    #[test]
    fn internal_preserves_source_message() {
        let err = QueueError::internal("connection reset");
        assert_eq!(err.to_string(), "internal error: connection reset");
    }
}
