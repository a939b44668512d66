//! Cached Table REST API Routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tablecache_core::{CachedTableDescriptor, EntityId};
use tablecache_storage::{CachedTableRegistry, CachedTableUpdate};
use tracing::{debug, info};

use crate::{
    error::{ApiError, ApiResult},
    routes::connections::load_connection,
    state::{AppState, SharedEngine, SharedRegistry},
    types::{
        ApiResponse, CachedTableResponse, CreateCachedTableRequest, DeleteResponse,
        ListCachedTablesQuery, RefreshQuery, UpdateCachedTableRequest,
    },
};

async fn load_cached_table(
    registry: &SharedRegistry,
    id: EntityId,
) -> ApiResult<CachedTableDescriptor> {
    registry
        .get_cached_table(id)
        .await?
        .ok_or_else(|| ApiError::cached_table_not_found(id))
}

fn with_key(engine: &SharedEngine, table: CachedTableDescriptor) -> CachedTableResponse {
    let cache_key = engine.cache_key(&table).ok().map(|k| k.into_string());
    CachedTableResponse { table, cache_key }
}

// ============================================================================
// CRUD HANDLERS
// ============================================================================

/// POST /api/v1/cached-tables - Start caching a table
pub async fn create_cached_table(
    State(state): State<AppState>,
    Json(req): Json<CreateCachedTableRequest>,
) -> ApiResult<impl IntoResponse> {
    let table = req.into_descriptor()?;
    state.registry.insert_cached_table(&table).await?;

    info!(
        cached_table_id = %table.cached_table_id,
        table = %table.table_name,
        connection_id = %table.connection_id,
        "cached table registered"
    );
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::created(with_key(&state.engine, table))),
    ))
}

/// GET /api/v1/cached-tables - List cached tables, optionally for one connection
pub async fn list_cached_tables(
    State(state): State<AppState>,
    Query(params): Query<ListCachedTablesQuery>,
) -> ApiResult<impl IntoResponse> {
    let tables = match params.connection_id {
        Some(connection_id) => {
            state
                .registry
                .list_cached_tables_for_connection(connection_id)
                .await?
        }
        None => state.registry.list_cached_tables().await?,
    };

    let tables: Vec<CachedTableResponse> = tables
        .into_iter()
        .map(|t| with_key(&state.engine, t))
        .collect();
    Ok(Json(ApiResponse::ok(tables)))
}

/// GET /api/v1/cached-tables/{id} - Get a cached table
pub async fn get_cached_table(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> ApiResult<impl IntoResponse> {
    let table = load_cached_table(&state.registry, id).await?;
    Ok(Json(ApiResponse::ok(with_key(&state.engine, table))))
}

/// PUT /api/v1/cached-tables/{id} - Update a cached table
///
/// The entry cached under the previous definition is dropped.
pub async fn update_cached_table(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
    Json(req): Json<UpdateCachedTableRequest>,
) -> ApiResult<impl IntoResponse> {
    let previous = load_cached_table(&state.registry, id).await?;
    let updated = state
        .registry
        .update_cached_table(id, CachedTableUpdate::from(req))
        .await?;

    let invalidated = state.engine.invalidate(&previous).await?;
    debug!(cached_table_id = %id, invalidated, "cached table updated");
    Ok(Json(ApiResponse::ok(with_key(&state.engine, updated))))
}

/// DELETE /api/v1/cached-tables/{id} - Stop caching a table and drop its entry
pub async fn delete_cached_table(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> ApiResult<impl IntoResponse> {
    let table = load_cached_table(&state.registry, id).await?;
    let invalidated_keys = state.engine.invalidate(&table).await?;
    state.registry.delete_cached_table(id).await?;

    info!(cached_table_id = %id, invalidated_keys, "cached table deleted");
    Ok(Json(ApiResponse::ok(DeleteResponse {
        id,
        invalidated_keys,
    })))
}

// ============================================================================
// REFRESH AND SNAPSHOT HANDLERS
// ============================================================================

/// POST /api/v1/cached-tables/{id}/refresh - Refresh one table's snapshot
///
/// `force=true` rebuilds even a fresh entry, inactive tables included.
pub async fn refresh_cached_table(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
    Query(query): Query<RefreshQuery>,
) -> ApiResult<impl IntoResponse> {
    let table = load_cached_table(&state.registry, id).await?;
    let connection = load_connection(&state.registry, table.connection_id).await?;

    let outcome = state
        .engine
        .refresh(&connection, &table, query.mode())
        .await?;
    Ok(Json(ApiResponse::ok(outcome)))
}

/// GET /api/v1/cached-tables/{id}/snapshot - Read the cached snapshot
pub async fn get_snapshot(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> ApiResult<impl IntoResponse> {
    let table = load_cached_table(&state.registry, id).await?;
    let snapshot = state
        .engine
        .cached_snapshot(&table)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("No cached snapshot for {}", table.table_name)))?;
    Ok(Json(ApiResponse::ok(snapshot)))
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the cached-table router.
pub fn create_router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/",
            axum::routing::get(list_cached_tables).post(create_cached_table),
        )
        .route(
            "/:id",
            axum::routing::get(get_cached_table)
                .put(update_cached_table)
                .delete(delete_cached_table),
        )
        .route("/:id/refresh", axum::routing::post(refresh_cached_table))
        .route("/:id/snapshot", axum::routing::get(get_snapshot))
}
