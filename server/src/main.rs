//! Waitline queue core server.
//!
//! One process hosts the ticket HTTP surface, the realtime hub and the
//! three background tasks: no-show sweeper, realtime broadcast poller and
//! notification worker. The database is the only shared authority; every
//! task talks to it through the same pool.

use metrics_exporter_prometheus::PrometheusBuilder;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use waitline_notify::{NotificationStore, ProviderSet, Worker, WorkerConfig};
use waitline_outbox::OutboxStore;
use waitline_realtime::{BroadcastPoller, Hub, RealtimeState, SessionStore};
use waitline_server::ratelimit::RateLimiter;
use waitline_server::{build_router, AppState, Config};
use waitline_store::{NoShowSweeper, StoreOptions, TicketStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "waitline=info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(Config::from_env());
    info!(port = config.port, "starting waitline server");

    let metrics_handle = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(err) => {
            warn!(error = %err, "metrics recorder unavailable");
            None
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("../migrations").run(&pool).await?;
    info!("database migrations applied");

    let store = TicketStore::new(
        pool.clone(),
        StoreOptions {
            no_show_return_to_queue: config.no_show.return_to_queue,
            priority_streak_limit: config.priority_streak_limit,
        },
    );

    // Background tasks share the pool, never the request path.
    let sweeper = NoShowSweeper::new(
        store.clone(),
        config.no_show.grace,
        config.no_show.scan_interval,
        config.no_show.batch_size,
    );
    let sweeper_task = tokio::spawn(sweeper.run());

    let hub = Arc::new(Hub::new());
    let outbox = OutboxStore::new(pool.clone());
    let poller = BroadcastPoller::new(
        Arc::clone(&hub),
        outbox.clone(),
        config.realtime.poll_interval,
        config.realtime.batch_size,
    );
    let poller_task = tokio::spawn(poller.run());

    let worker = Worker::new(
        NotificationStore::new(pool.clone()),
        outbox,
        ProviderSet::from_config(&config.notifications.providers),
        WorkerConfig {
            poll_interval: config.notifications.poll_interval,
            batch_size: config.notifications.batch_size,
            max_attempts: config.notifications.max_attempts,
            reminder_threshold: config.notifications.reminder_threshold,
            lang: config.notifications.lang.clone(),
        },
    );
    let outbox_task = tokio::spawn(worker.clone().run_outbox_loop());
    let retry_task = tokio::spawn(worker.run_retry_loop());

    let state = AppState::new(Arc::clone(&config), store);
    let realtime = RealtimeState {
        hub,
        sessions: SessionStore::new(pool.clone()),
    };
    let limiter = Arc::new(RateLimiter::new(&config.rate_limit));
    let router = build_router(state, realtime, limiter, metrics_handle);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweeper_task.abort();
    poller_task.abort();
    outbox_task.abort();
    retry_task.abort();
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}
