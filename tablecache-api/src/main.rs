//! Tablecache API Server Entry Point
//!
//! Bootstraps configuration, prepares the registry schema, connects the
//! cache store and starts the Axum HTTP server.

use std::sync::Arc;

use axum::Router;
use tablecache_api::telemetry::{init_tracing, TelemetryConfig};
use tablecache_api::{
    create_api_router, ApiConfig, ApiError, ApiResult, AppState, DbConfig, PgRegistry,
};
use tablecache_core::CacheSettings;
use tablecache_storage::{
    CacheCoordinator, PgRelationalStore, RedisConnector, RefreshPolicy, SchemaIntrospector,
    TableRefresher,
};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::from_env();
    init_tracing(&telemetry_config)?;

    let db_config = DbConfig::from_env();
    let registry = PgRegistry::from_config(&db_config)?;
    registry.bootstrap().await?;

    let cache_settings = CacheSettings::from_env()?;
    let connector = RedisConnector::new(&cache_settings.url).map_err(|e| {
        ApiError::cache_unavailable(format!("Invalid cache store URL: {}", e))
    })?;
    let policy = RefreshPolicy::from_settings(&cache_settings);
    let cache = Arc::new(CacheCoordinator::new(connector, cache_settings));

    let introspector = SchemaIntrospector::new(Arc::new(PgRelationalStore::new()));
    let engine = TableRefresher::new(introspector, cache, policy);

    let api_config = ApiConfig::from_env();
    let addr = api_config.bind_addr()?;
    let state = AppState::new(Arc::new(registry), Arc::new(engine), api_config);

    let app: Router = create_api_router(state);

    tracing::info!(%addr, "Starting tablecache API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
