//! Application state for query service.

use std::sync::Arc;

use common::config::AppConfig;
use query_core::{DataService, DialogueAdapter, PoolManager};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub pool: Arc<PoolManager>,
    pub service: Arc<DataService>,
    pub dialogue: Arc<DialogueAdapter>,
}

impl AppState {
    /// Wires the core around an open pool.
    pub fn new(config: AppConfig, pool: PoolManager) -> Self {
        let pool = Arc::new(pool);
        let service = Arc::new(DataService::new(pool.clone(), config.query));
        let dialogue = Arc::new(DialogueAdapter::new(service.clone()));
        Self {
            config,
            pool,
            service,
            dialogue,
        }
    }
}
