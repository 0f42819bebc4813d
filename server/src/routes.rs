//! Router assembly.

use crate::handlers::{queues, tickets};
use crate::ratelimit::{rate_limit_middleware, RateLimiter};
use crate::state::AppState;
use axum::routing::{get, post, put};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use waitline_realtime::{realtime_handler, RealtimeState};

/// Build the full router: ticket surface, reference reads, realtime mount,
/// health and metrics, wrapped in rate limiting and request tracing.
pub fn build_router(
    state: AppState,
    realtime: RealtimeState,
    limiter: Arc<RateLimiter>,
    metrics: Option<PrometheusHandle>,
) -> Router {
    let api = Router::new()
        .route("/api/tickets", post(tickets::create_ticket))
        .route("/api/tickets/actions/call-next", post(tickets::call_next))
        .route("/api/tickets/snapshot", get(tickets::snapshot))
        .route("/api/tickets/active", get(tickets::active_ticket))
        .route("/api/tickets/:id", get(tickets::get_ticket))
        .route("/api/tickets/:id/events", get(queues::ticket_events))
        .route(
            "/api/tickets/:id/actions/transfer",
            post(tickets::transfer),
        )
        .route(
            "/api/tickets/:id/actions/:action",
            post(tickets::ticket_action),
        )
        .route("/api/queues", get(queues::list_queue))
        .route("/api/appointments/checkin", post(queues::appointment_checkin))
        .route("/api/events", get(queues::list_events))
        .route("/api/counters", get(queues::list_counters))
        .route("/api/counters/:id/status", put(queues::update_counter_status))
        .route("/api/services", get(queues::list_services))
        .with_state(state)
        .layer(axum::middleware::from_fn_with_state(
            limiter,
            rate_limit_middleware,
        ));

    let realtime_routes = Router::new()
        .route("/realtime", get(realtime_handler))
        .with_state(realtime);

    let mut router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .merge(api)
        .merge(realtime_routes);

    if let Some(handle) = metrics {
        router = router.route("/metrics", get(move || async move { handle.render() }));
    }

    router.layer(TraceLayer::new_for_http())
}
