//! HTTP surface for the waitline queue core.
//!
//! Maps the store's error kinds one-for-one onto wire codes and status
//! codes, enforces request validation and rate limits, and wires the
//! background tasks (sweeper, realtime poller, notification worker) around
//! the shared connection pool.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod ratelimit;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::ApiError;
pub use routes::build_router;
pub use state::AppState;
