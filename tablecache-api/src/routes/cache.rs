//! Cache Administration Routes
//!
//! Counters, server info, per-key TTL, pattern invalidation and the guarded
//! full flush. The flush route exists only when `allow_flush` is set.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use tracing::{info, warn};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
    types::{ApiResponse, ClearPatternResponse, FlushQuery, KeyTtlResponse, PatternQuery},
};

/// GET /api/v1/cache/stats - Hit/miss counters since startup
pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::ok(state.engine.cache_stats()))
}

/// GET /api/v1/cache/info - Connection state, server details and redacted config
pub async fn info(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::ok(state.engine.cache_info().await))
}

/// GET /api/v1/cache/keys/{key}/ttl - Remaining lifetime of one key
pub async fn key_ttl(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<impl IntoResponse> {
    if key.trim().is_empty() {
        return Err(ApiError::missing_field("key"));
    }
    let ttl = state.engine.key_ttl(&key).await;
    Ok(Json(ApiResponse::ok(KeyTtlResponse {
        key,
        ttl: ttl.as_seconds(),
        state: ttl,
    })))
}

/// DELETE /api/v1/cache/keys?pattern=... - Delete keys matching a glob
pub async fn clear_pattern(
    State(state): State<AppState>,
    Query(query): Query<PatternQuery>,
) -> ApiResult<impl IntoResponse> {
    let pattern = query.pattern.trim().to_string();
    if pattern.is_empty() {
        return Err(ApiError::missing_field("pattern"));
    }
    if pattern == "*" {
        return Err(ApiError::invalid_input(
            "Refusing to clear every key by pattern; use the flush endpoint",
        ));
    }

    let deleted = state.engine.clear_pattern(&pattern).await;
    info!(pattern = %pattern, deleted, "cache pattern cleared");
    Ok(Json(ApiResponse::ok(ClearPatternResponse { pattern, deleted })))
}

/// POST /api/v1/cache/flush?confirm=true - Remove every key
pub async fn flush(
    State(state): State<AppState>,
    Query(query): Query<FlushQuery>,
) -> ApiResult<impl IntoResponse> {
    if !query.confirm {
        return Err(ApiError::invalid_input(
            "Flushing the cache requires confirm=true",
        ));
    }

    warn!("cache flush requested");
    if !state.engine.flush_all().await {
        return Err(ApiError::cache_unavailable("Cache flush failed"));
    }
    Ok(Json(
        ApiResponse::ok(serde_json::json!({ "flushed": true })).with_message("Cache flushed"),
    ))
}

/// Create the cache admin router.
pub fn create_router(allow_flush: bool) -> axum::Router<AppState> {
    let router = axum::Router::new()
        .route("/stats", axum::routing::get(stats))
        .route("/info", axum::routing::get(info))
        .route("/keys", axum::routing::delete(clear_pattern))
        .route("/keys/:key/ttl", axum::routing::get(key_ttl));

    if allow_flush {
        router.route("/flush", axum::routing::post(flush))
    } else {
        router
    }
}
