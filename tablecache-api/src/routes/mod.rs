//! REST API Routes Module
//!
//! Route handlers organized by resource:
//! - Connections, with live introspection and connection-wide refresh
//! - Cached tables, with per-table refresh and snapshot reads
//! - Cache administration
//! - Health check endpoints (Kubernetes-compatible)
//! - CORS support for browser-based clients

pub mod cache;
pub mod cached_tables;
pub mod connections;
pub mod health;

use std::time::Duration;

use axum::{
    http::{header, HeaderValue, Method},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::state::AppState;

// Re-export route creation functions for convenience
pub use cache::create_router as cache_router;
pub use cached_tables::create_router as cached_tables_router;
pub use connections::create_router as connections_router;
pub use health::create_router as health_router;

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from ApiConfig.
///
/// In development mode (empty origins), allows all origins.
/// In production mode, only allows configured origins.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: Development mode - allowing all origins");
        cors.allow_origin(Any)
    } else {
        tracing::info!(
            "CORS: Production mode - allowing origins: {:?}",
            config.cors_origins
        );
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the complete API router.
///
/// - Connections under /api/v1/connections
/// - Cached tables under /api/v1/cached-tables
/// - Cache administration under /api/v1/cache
/// - Health checks at /health/* and /api/v1/health/*
pub fn create_api_router(state: AppState) -> Router {
    let allow_flush = state.config.allow_flush;
    let cors = build_cors_layer(&state.config);

    let api_routes = Router::new()
        .nest("/connections", connections::create_router())
        .nest("/cached-tables", cached_tables::create_router())
        .nest("/cache", cache::create_router(allow_flush))
        .nest("/health", health::create_router());

    Router::new()
        .nest("/api/v1", api_routes)
        .nest("/health", health::create_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
