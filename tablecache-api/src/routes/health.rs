//! Health Check Endpoints
//!
//! Provides Kubernetes-compatible health check endpoints:
//! - /health/ping - Simple liveness check
//! - /health/ready - Cache store connectivity check
//! - /health/live - Process alive check

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use tablecache_core::{overall_status, HealthCheck, HealthStatus};

use crate::state::{AppState, SharedEngine};

// ============================================================================
// TYPES
// ============================================================================

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthDetails {
    pub checks: Vec<HealthCheck>,
    pub version: String,
    pub uptime_seconds: u64,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /health/ping - Simple pong response
pub async fn ping() -> impl IntoResponse {
    (StatusCode::OK, "pong")
}

/// GET /health/live - Process liveness check
pub async fn liveness() -> impl IntoResponse {
    let response = HealthResponse {
        status: HealthStatus::Healthy,
        message: Some("Process is alive".to_string()),
        details: None,
    };
    (StatusCode::OK, Json(response))
}

/// GET /health/ready - Readiness check (cache store liveness)
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let checks = vec![check_cache(&state.engine).await];
    let status = overall_status(&checks);

    let response = HealthResponse {
        status: status.clone(),
        message: None,
        details: Some(HealthDetails {
            checks,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.start_time.elapsed().as_secs(),
        }),
    };

    let status_code = if status.is_serving() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(response))
}

async fn check_cache(engine: &SharedEngine) -> HealthCheck {
    let start = std::time::Instant::now();
    let healthy = engine.cache_healthy().await;
    let elapsed = i64::try_from(start.elapsed().as_millis()).unwrap_or(i64::MAX);

    if healthy {
        HealthCheck::healthy("cache").with_response_time(elapsed)
    } else {
        HealthCheck::unhealthy("cache", "Cache store did not answer ping").with_response_time(elapsed)
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create health check router
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/ping", get(ping))
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
}
