use std::sync::Arc;

use crate::config::ServerConfig;
use crate::core::orchestrator::CallOrchestrator;
use crate::core::registry::CallRegistry;
use crate::errors::call_error::CallResult;

/// Application state that can be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub registry: Arc<CallRegistry>,
    pub orchestrator: Arc<CallOrchestrator>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> CallResult<Arc<Self>> {
        let config = Arc::new(config);
        let registry = Arc::new(CallRegistry::new());
        let orchestrator = Arc::new(CallOrchestrator::new(config.clone(), registry.clone())?);

        Ok(Arc::new(Self {
            config,
            registry,
            orchestrator,
        }))
    }
}
