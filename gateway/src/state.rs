//! Application state for the SQL gateway.

use std::sync::Arc;

use common::config::AppConfig;
use common::middleware::{IdentityProvider, JwtIdentityProvider};

use crate::dispatcher::Dispatcher;
use crate::registry::ProfileStore;
use crate::service::{ConnectionService, QueryService};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn ProfileStore>,
    pub dispatcher: Dispatcher,
    pub identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    /// Creates a new application state verifying tokens with the configured secret.
    pub fn new(config: AppConfig, store: Arc<dyn ProfileStore>) -> Self {
        Self {
            identity: Arc::new(JwtIdentityProvider::new(&config.jwt_secret)),
            dispatcher: Dispatcher::new(config.connect_timeout()),
            config,
            store,
        }
    }

    pub fn connection_service(&self) -> ConnectionService {
        ConnectionService::new(self.store.clone(), self.dispatcher.clone())
    }

    pub fn query_service(&self) -> QueryService {
        QueryService::new(
            self.store.clone(),
            self.dispatcher.clone(),
            self.config.default_targets.clone(),
        )
    }
}
