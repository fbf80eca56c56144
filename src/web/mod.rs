//! Web gateway: shared application state, routes, and the HTTP server.

pub mod routes;
pub mod server;
pub mod state;
pub mod workers;

use crate::core::config::Config;
use crate::storage::Store;
use std::sync::Arc;
use workers::{DiscoveryController, PollController};

/// Shared state behind every route handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Store,
    pub discovery: Arc<DiscoveryController>,
    pub poll: Arc<PollController>,
}

impl AppState {
    /// Build the application state from a loaded configuration.
    pub fn new(config: Arc<Config>) -> Self {
        let store = Store::new(config.paths.db_path());
        let discovery = Arc::new(DiscoveryController::new(
            config.network.clone(),
            store.clone(),
        ));
        let poll = Arc::new(PollController::new(config.network.clone(), store.clone()));
        Self {
            config,
            store,
            discovery,
            poll,
        }
    }
}
