//! Shared application state.

use crate::config::Config;
use std::sync::Arc;
use waitline_store::TicketStore;

/// State shared by the HTTP handlers. Cloned per request; everything inside
/// is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: TicketStore,
}

impl AppState {
    #[must_use]
    pub fn new(config: Arc<Config>, store: TicketStore) -> Self {
        Self { config, store }
    }
}
