use std::sync::Arc;
use std::time::Instant;

use crate::auth::AuthService;
use crate::config::ServerConfig;
use crate::storage::UserStore;

/// Main server state shared across all handlers
pub struct ServerState {
    pub config: ServerConfig,
    pub auth: Arc<AuthService>,
    pub user_store: Arc<dyn UserStore>,
    pub start_time: Instant,
}

impl ServerState {
    pub fn new(config: ServerConfig, auth: Arc<AuthService>, user_store: Arc<dyn UserStore>) -> Self {
        Self {
            config,
            auth,
            user_store,
            start_time: Instant::now(),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
