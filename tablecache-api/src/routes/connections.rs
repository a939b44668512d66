//! Connection REST API Routes
//!
//! CRUD for registered external databases, plus live introspection and a
//! connection-wide refresh of its cached tables.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tablecache_core::{ConnectionDescriptor, EntityId};
use tablecache_storage::{CachedTableRegistry, ConnectionRegistry};
use tracing::info;

use crate::{
    error::{ApiError, ApiResult},
    state::{AppState, SharedEngine, SharedRegistry},
    types::{
        ApiResponse, ConnectionResponse, CreateConnectionRequest, DeleteResponse, RefreshQuery,
        TableRefreshItem, UpdateConnectionRequest,
    },
};

pub(crate) async fn load_connection(
    registry: &SharedRegistry,
    id: EntityId,
) -> ApiResult<ConnectionDescriptor> {
    registry
        .get_connection(id)
        .await?
        .ok_or_else(|| ApiError::connection_not_found(id))
}

/// Drop the cache entries of every cached table on a connection.
async fn invalidate_connection(
    registry: &SharedRegistry,
    engine: &SharedEngine,
    id: EntityId,
) -> ApiResult<u64> {
    let mut invalidated = 0;
    for table in registry.list_cached_tables_for_connection(id).await? {
        invalidated += engine.invalidate(&table).await?;
    }
    Ok(invalidated)
}

// ============================================================================
// CRUD HANDLERS
// ============================================================================

/// POST /api/v1/connections - Register a connection
pub async fn create_connection(
    State(state): State<AppState>,
    Json(req): Json<CreateConnectionRequest>,
) -> ApiResult<impl IntoResponse> {
    let descriptor = req.into_descriptor()?;
    state.registry.insert_connection(&descriptor).await?;

    info!(
        connection_id = %descriptor.connection_id,
        dialect = %descriptor.dialect,
        target = %descriptor.target(),
        "connection registered"
    );
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::created(ConnectionResponse::from(descriptor))),
    ))
}

/// GET /api/v1/connections - List connections
pub async fn list_connections(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let connections: Vec<ConnectionResponse> = state
        .registry
        .list_connections()
        .await?
        .into_iter()
        .map(ConnectionResponse::from)
        .collect();
    Ok(Json(ApiResponse::ok(connections)))
}

/// GET /api/v1/connections/{id} - Get a connection
pub async fn get_connection(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> ApiResult<impl IntoResponse> {
    let connection = load_connection(&state.registry, id).await?;
    Ok(Json(ApiResponse::ok(ConnectionResponse::from(connection))))
}

/// PUT /api/v1/connections/{id} - Update a connection
///
/// Cached snapshots taken through the old settings are dropped.
pub async fn update_connection(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
    Json(req): Json<UpdateConnectionRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.name.is_none()
        && req.host.is_none()
        && req.port.is_none()
        && req.user.is_none()
        && req.password.is_none()
        && req.database.is_none()
        && req.ssl_enabled.is_none()
        && req.dialect.is_none()
    {
        return Err(ApiError::invalid_input(
            "At least one field must be provided for update",
        ));
    }

    let updated = state.registry.update_connection(id, req.into_update()?).await?;
    let invalidated = invalidate_connection(&state.registry, &state.engine, id).await?;

    info!(connection_id = %id, invalidated, "connection updated");
    Ok(Json(ApiResponse::ok(ConnectionResponse::from(updated))))
}

/// DELETE /api/v1/connections/{id} - Delete a connection and its cached tables
pub async fn delete_connection(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> ApiResult<impl IntoResponse> {
    load_connection(&state.registry, id).await?;

    let invalidated_keys = invalidate_connection(&state.registry, &state.engine, id).await?;
    state.registry.delete_connection(id).await?;

    Ok(Json(ApiResponse::ok(DeleteResponse {
        id,
        invalidated_keys,
    })))
}

// ============================================================================
// INTROSPECTION HANDLERS
// ============================================================================

/// GET /api/v1/connections/{id}/databases - Databases on the target server
pub async fn list_databases(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> ApiResult<impl IntoResponse> {
    let connection = load_connection(&state.registry, id).await?;
    let databases = state.engine.list_databases(&connection).await?;
    Ok(Json(ApiResponse::ok(databases)))
}

/// GET /api/v1/connections/{id}/schemas - Schemas in the target database
pub async fn list_schemas(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> ApiResult<impl IntoResponse> {
    let connection = load_connection(&state.registry, id).await?;
    let schemas = state.engine.list_schemas(&connection).await?;
    Ok(Json(ApiResponse::ok(schemas)))
}

/// GET /api/v1/connections/{id}/tables - Base tables in the target database
pub async fn list_tables(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> ApiResult<impl IntoResponse> {
    let connection = load_connection(&state.registry, id).await?;
    let tables = state.engine.list_tables(&connection).await?;
    Ok(Json(ApiResponse::ok(tables)))
}

/// GET /api/v1/connections/{id}/tables/{table}/columns - Live columns of one table
pub async fn list_columns(
    State(state): State<AppState>,
    Path((id, table)): Path<(EntityId, String)>,
) -> ApiResult<impl IntoResponse> {
    let connection = load_connection(&state.registry, id).await?;
    let columns = state.engine.list_columns(&connection, &table).await?;
    Ok(Json(ApiResponse::ok(columns)))
}

// ============================================================================
// REFRESH HANDLER
// ============================================================================

/// POST /api/v1/connections/{id}/refresh - Refresh every cached table on a connection
///
/// Per-table failures are reported in the body; the request itself succeeds.
pub async fn refresh_connection(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
    Query(query): Query<RefreshQuery>,
) -> ApiResult<impl IntoResponse> {
    let connection = load_connection(&state.registry, id).await?;
    let tables = state.registry.list_cached_tables_for_connection(id).await?;

    let results: Vec<TableRefreshItem> = state
        .engine
        .refresh_all(&connection, &tables, query.mode())
        .await
        .into_iter()
        .map(TableRefreshItem::from)
        .collect();

    let failed = results.iter().filter(|r| r.error.is_some()).count();
    info!(connection_id = %id, tables = results.len(), failed, "connection refreshed");
    Ok(Json(ApiResponse::ok(results)))
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the connection router.
pub fn create_router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/",
            axum::routing::get(list_connections).post(create_connection),
        )
        .route(
            "/:id",
            axum::routing::get(get_connection)
                .put(update_connection)
                .delete(delete_connection),
        )
        .route("/:id/databases", axum::routing::get(list_databases))
        .route("/:id/schemas", axum::routing::get(list_schemas))
        .route("/:id/tables", axum::routing::get(list_tables))
        .route("/:id/tables/:table/columns", axum::routing::get(list_columns))
        .route("/:id/refresh", axum::routing::post(refresh_connection))
}
