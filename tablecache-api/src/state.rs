//! Shared application state for Axum routers.

use std::sync::Arc;

use tablecache_storage::Registry;

use crate::config::ApiConfig;
use crate::engine::Engine;

/// Connection and cached-table records, whichever backend holds them.
pub type SharedRegistry = Arc<dyn Registry>;

/// Introspection, refresh and cache administration.
pub type SharedEngine = Arc<dyn Engine>;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub registry: SharedRegistry,
    pub engine: SharedEngine,
    pub config: Arc<ApiConfig>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(registry: SharedRegistry, engine: SharedEngine, config: ApiConfig) -> Self {
        Self {
            registry,
            engine,
            config: Arc::new(config),
            start_time: std::time::Instant::now(),
        }
    }
}

crate::impl_from_ref!(SharedRegistry, registry);
crate::impl_from_ref!(SharedEngine, engine);
crate::impl_from_ref!(Arc<ApiConfig>, config);
crate::impl_from_ref!(std::time::Instant, start_time);
