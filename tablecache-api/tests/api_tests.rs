//! HTTP-level tests for the tablecache API
//!
//! The router runs against the in-memory registry, a scripted relational
//! store and an in-memory cache, driven request by request with `oneshot`.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tablecache_api::{create_api_router, ApiConfig, AppState};
use tablecache_storage::{
    CacheCoordinator, DialectCatalog, InMemoryRegistry, RefreshPolicy, SchemaIntrospector,
    TableRefresher,
};
use tablecache_test_utils::{fixtures, CacheSettings, Dialect, MockRelationalStore, MemoryConnector, RowSet};
use tower::ServiceExt;

// ============================================================================
// HARNESS
// ============================================================================

fn app_with(store: MockRelationalStore, config: ApiConfig) -> Router {
    let settings = CacheSettings::default();
    let policy = RefreshPolicy::from_settings(&settings);
    let cache = Arc::new(CacheCoordinator::new(MemoryConnector::new(), settings));
    let engine = TableRefresher::new(SchemaIntrospector::new(Arc::new(store)), cache, policy);

    let state = AppState::new(Arc::new(InMemoryRegistry::new()), Arc::new(engine), config);
    create_api_router(state)
}

fn app(store: MockRelationalStore) -> Router {
    app_with(store, ApiConfig::default())
}

fn orders_store() -> MockRelationalStore {
    fixtures::orders_store().with_result(
        DialectCatalog::lookup(Dialect::Postgresql).database_list,
        RowSet::new(
            vec!["datname".to_string()],
            vec![vec![json!("sales")], vec![json!("hr")]],
        ),
    )
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request should build");

    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("router should answer");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, value)
}

async fn create_connection(app: &Router) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/api/v1/connections",
        Some(json!({
            "name": "sales",
            "host": "localhost",
            "username": "reader",
            "password": "s3cret",
            "database": "sales",
            "sql_engine": "postgresql"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["data"]["connection_id"]
        .as_str()
        .expect("connection id")
        .to_string()
}

async fn create_table(app: &Router, connection_id: &str, primary_key: &str, active: bool) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/api/v1/cached-tables",
        Some(json!({
            "table_name": "orders",
            "field_list": ["total", "status"],
            "interval": "1h",
            "connection_id": connection_id,
            "is_active": active,
            "primary_key": primary_key
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["data"]["cached_table_id"]
        .as_str()
        .expect("cached table id")
        .to_string()
}

// ============================================================================
// HEALTH
// ============================================================================

#[tokio::test]
async fn test_health_endpoints() {
    let app = app(MockRelationalStore::new());

    let (status, body) = send(&app, "GET", "/health/ping", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("pong"));

    let (status, body) = send(&app, "GET", "/api/v1/health/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

// ============================================================================
// CONNECTIONS
// ============================================================================

#[tokio::test]
async fn test_create_connection_fills_default_port_and_hides_secret() {
    let app = app(MockRelationalStore::new());
    let id = create_connection(&app).await;

    let (status, body) = send(&app, "GET", &format!("/api/v1/connections/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["status_code"], 200);
    assert_eq!(body["data"]["port"], 5432);
    assert_eq!(body["data"]["dialect"], "postgresql");
    assert_eq!(body["data"]["target"], "localhost:5432/sales");
    assert!(!body.to_string().contains("s3cret"));
}

#[tokio::test]
async fn test_create_connection_rejects_unknown_dialect() {
    let app = app(MockRelationalStore::new());
    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/connections",
        Some(json!({
            "name": "legacy",
            "host": "db",
            "user": "u",
            "dialect": "db2"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "UNSUPPORTED_DIALECT");
}

#[tokio::test]
async fn test_create_connection_requires_host_for_network_dialects() {
    let app = app(MockRelationalStore::new());
    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/connections",
        Some(json!({ "name": "broken", "user": "u", "dialect": "mysql" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "MISSING_FIELD");
}

#[tokio::test]
async fn test_unknown_connection_is_not_found() {
    let app = app(MockRelationalStore::new());
    let id = tablecache_test_utils::new_entity_id();
    let (status, body) = send(&app, "GET", &format!("/api/v1/connections/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "CONNECTION_NOT_FOUND");
}

#[tokio::test]
async fn test_update_connection() {
    let app = app(MockRelationalStore::new());
    let id = create_connection(&app).await;
    let uri = format!("/api/v1/connections/{}", id);

    let (status, _) = send(&app, "PUT", &uri, Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, "PUT", &uri, Some(json!({ "port": 6432, "database": "" }))).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["port"], 6432);
    assert_eq!(body["data"]["database"], Value::Null);
}

#[tokio::test]
async fn test_delete_connection_cascades_to_cached_tables() {
    let app = app(orders_store());
    let connection_id = create_connection(&app).await;
    let table_id = create_table(&app, &connection_id, "id", true).await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/v1/cached-tables/{}/refresh", table_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let (status, body) = send(
        &app,
        "DELETE",
        &format!("/api/v1/connections/{}", connection_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["invalidated_keys"], 1);

    let (status, _) = send(&app, "GET", &format!("/api/v1/cached-tables/{}", table_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_same_table_on_two_connections_is_cached_separately() {
    let app = app(orders_store());
    let first = create_connection(&app).await;
    let second = create_connection(&app).await;
    let first_table = create_table(&app, &first, "id", true).await;
    let second_table = create_table(&app, &second, "id", true).await;

    let (_, body) = send(&app, "GET", &format!("/api/v1/cached-tables/{}", first_table), None).await;
    let first_key = body["data"]["cache_key"].clone();
    let (_, body) = send(&app, "GET", &format!("/api/v1/cached-tables/{}", second_table), None).await;
    assert_ne!(first_key, body["data"]["cache_key"]);

    for table_id in [&first_table, &second_table] {
        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/v1/cached-tables/{}/refresh", table_id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["data"]["outcome"], "refreshed");
    }

    let (status, body) = send(&app, "DELETE", &format!("/api/v1/connections/{}", first), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["invalidated_keys"], 1);

    let (status, _) = send(
        &app,
        "GET",
        &format!("/api/v1/cached-tables/{}/snapshot", second_table),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

// ============================================================================
// INTROSPECTION
// ============================================================================

#[tokio::test]
async fn test_introspection_routes() {
    let app = app(orders_store());
    let id = create_connection(&app).await;

    let (status, body) = send(&app, "GET", &format!("/api/v1/connections/{}/databases", id), None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"], json!(["sales", "hr"]));

    let (status, body) = send(&app, "GET", &format!("/api/v1/connections/{}/schemas", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!(["public", "reporting"]));

    let (status, body) = send(&app, "GET", &format!("/api/v1/connections/{}/tables", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!(["orders"]));

    let (status, body) = send(
        &app,
        "GET",
        &format!("/api/v1/connections/{}/tables/orders/columns", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["name"], "id");
    assert_eq!(body["data"][0]["nullable"], false);
}

#[tokio::test]
async fn test_columns_of_missing_table_is_not_found() {
    let app = app(orders_store());
    let id = create_connection(&app).await;

    let (status, body) = send(
        &app,
        "GET",
        &format!("/api/v1/connections/{}/tables/ghosts/columns", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "TABLE_NOT_FOUND");
}

#[tokio::test]
async fn test_unreachable_target_is_bad_gateway() {
    let app = app(MockRelationalStore::new().fail_connect("connection refused"));
    let id = create_connection(&app).await;

    let (status, body) = send(&app, "GET", &format!("/api/v1/connections/{}/tables", id), None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(!body.to_string().contains("s3cret"));
}

// ============================================================================
// CACHED TABLES AND REFRESH
// ============================================================================

#[tokio::test]
async fn test_cached_table_requires_existing_connection() {
    let app = app(MockRelationalStore::new());
    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/cached-tables",
        Some(json!({
            "table_name": "orders",
            "connection_id": tablecache_test_utils::new_entity_id(),
            "primary_key": "id"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "CONNECTION_NOT_FOUND");
}

#[tokio::test]
async fn test_cached_table_response_carries_key_and_defaults() {
    let app = app(MockRelationalStore::new());
    let connection_id = create_connection(&app).await;
    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/cached-tables",
        Some(json!({
            "table_name": "orders",
            "connection_id": connection_id,
            "primary_key": "id"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status_code"], 201);
    assert_eq!(
        body["data"]["cache_key"],
        format!("cache:orders:{}", connection_id)
    );
    assert_eq!(body["data"]["is_active"], false);
    assert_eq!(body["data"]["refresh_interval"], 0);
}

#[tokio::test]
async fn test_refresh_then_fresh_then_forced() {
    let app = app(orders_store());
    let connection_id = create_connection(&app).await;
    let table_id = create_table(&app, &connection_id, "id", true).await;
    let uri = format!("/api/v1/cached-tables/{}/refresh", table_id);

    let (status, body) = send(&app, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["outcome"], "refreshed");
    assert_eq!(body["data"]["row_count"], 3);
    assert_eq!(body["data"]["max_id"], 42);

    let (_, body) = send(&app, "POST", &uri, None).await;
    assert_eq!(body["data"]["outcome"], "fresh");

    let (_, body) = send(&app, "POST", &format!("{}?force=true", uri), None).await;
    assert_eq!(body["data"]["outcome"], "refreshed");

    let (status, body) = send(
        &app,
        "GET",
        &format!("/api/v1/cached-tables/{}/snapshot", table_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["columns"], json!(["id", "total", "status"]));
    assert_eq!(body["data"]["rows"].as_array().map(Vec::len), Some(3));
}

#[tokio::test]
async fn test_inactive_table_is_skipped_unless_forced() {
    let app = app(orders_store());
    let connection_id = create_connection(&app).await;
    let table_id = create_table(&app, &connection_id, "id", false).await;
    let uri = format!("/api/v1/cached-tables/{}/refresh", table_id);

    let (_, body) = send(&app, "POST", &uri, None).await;
    assert_eq!(body["data"]["outcome"], "skipped");
    assert_eq!(body["data"]["reason"], "inactive");

    let (_, body) = send(&app, "POST", &format!("{}?force=true", uri), None).await;
    assert_eq!(body["data"]["outcome"], "refreshed");
}

#[tokio::test]
async fn test_schema_drift_is_conflict_and_leaves_no_snapshot() {
    let app = app(orders_store());
    let connection_id = create_connection(&app).await;
    let table_id = create_table(&app, &connection_id, "order_id", true).await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/v1/cached-tables/{}/refresh", table_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "SCHEMA_DRIFT");

    let (status, _) = send(
        &app,
        "GET",
        &format!("/api/v1/cached-tables/{}/snapshot", table_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_connection_refresh_reports_per_table_results() {
    let app = app(orders_store());
    let connection_id = create_connection(&app).await;
    create_table(&app, &connection_id, "id", true).await;
    create_table(&app, &connection_id, "order_id", true).await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/v1/connections/{}/refresh?force=true", connection_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let items = body["data"].as_array().cloned().unwrap_or_default();
    assert_eq!(items.len(), 2);
    let failed: Vec<&Value> = items.iter().filter(|i| !i["error"].is_null()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["error"]["code"], "SCHEMA_DRIFT");
}

#[tokio::test]
async fn test_list_cached_tables_filters_by_connection() {
    let app = app(MockRelationalStore::new());
    let first = create_connection(&app).await;
    let second = create_connection(&app).await;
    create_table(&app, &first, "id", true).await;
    create_table(&app, &second, "id", true).await;

    let (_, body) = send(&app, "GET", "/api/v1/cached-tables", None).await;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(2));

    let (_, body) = send(
        &app,
        "GET",
        &format!("/api/v1/cached-tables?connection_id={}", first),
        None,
    )
    .await;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["data"][0]["connection_id"], first.as_str());
}

#[tokio::test]
async fn test_update_cached_table_drops_previous_entry() {
    let app = app(orders_store());
    let connection_id = create_connection(&app).await;
    let table_id = create_table(&app, &connection_id, "id", true).await;

    send(
        &app,
        "POST",
        &format!("/api/v1/cached-tables/{}/refresh", table_id),
        None,
    )
    .await;
    let ttl_uri = format!("/api/v1/cache/keys/cache:orders:{}/ttl", connection_id);
    let (_, body) = send(&app, "GET", &ttl_uri, None).await;
    assert!(body["data"]["ttl"].as_i64().unwrap_or(0) > 0);

    let (status, body) = send(
        &app,
        "PUT",
        &format!("/api/v1/cached-tables/{}", table_id),
        Some(json!({ "field_list": ["total"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["field_list"], json!(["total"]));

    let (_, body) = send(&app, "GET", &ttl_uri, None).await;
    assert_eq!(body["data"]["ttl"], -2);
}

// ============================================================================
// CACHE ADMINISTRATION
// ============================================================================

#[tokio::test]
async fn test_cache_stats_and_info() {
    let app = app(MockRelationalStore::new());

    let (status, body) = send(&app, "GET", "/api/v1/cache/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_requests"], 0);

    let (status, body) = send(&app, "GET", "/api/v1/cache/info", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].is_object());
}

#[tokio::test]
async fn test_clear_pattern_guards() {
    let app = app(MockRelationalStore::new());

    let (status, _) = send(&app, "DELETE", "/api/v1/cache/keys?pattern=*", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, "DELETE", "/api/v1/cache/keys?pattern=cache:orders:*", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["deleted"], 0);
}

#[tokio::test]
async fn test_flush_is_hidden_unless_enabled() {
    let app = app(MockRelationalStore::new());
    let (status, _) = send(&app, "POST", "/api/v1/cache/flush?confirm=true", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_flush_requires_confirmation() {
    let app = app_with(
        MockRelationalStore::new(),
        ApiConfig::default().with_allow_flush(true),
    );

    let (status, _) = send(&app, "POST", "/api/v1/cache/flush", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, "POST", "/api/v1/cache/flush?confirm=true", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["flushed"], true);
}

// ============================================================================
// REGISTRY BACKED BY POSTGRES
// ============================================================================

#[cfg(feature = "db-tests")]
mod db_tests {
    use tablecache_api::{DbConfig, PgRegistry};
    use tablecache_storage::{CachedTableRegistry, ConnectionRegistry};
    use tablecache_test_utils::fixtures;

    #[tokio::test]
    async fn test_pg_registry_round_trip() -> tablecache_api::ApiResult<()> {
        let registry = PgRegistry::from_config(&DbConfig::from_env())?;
        registry.bootstrap().await?;

        let connection = fixtures::pg_connection();
        registry.insert_connection(&connection).await?;
        let table = fixtures::orders_table(connection.connection_id);
        registry.insert_cached_table(&table).await?;

        assert_eq!(
            registry.get_connection(connection.connection_id).await?,
            Some(connection.clone())
        );
        assert_eq!(
            registry.get_cached_table(table.cached_table_id).await?,
            Some(table.clone())
        );

        registry.delete_connection(connection.connection_id).await?;
        assert_eq!(registry.get_cached_table(table.cached_table_id).await?, None);
        Ok(())
    }
}
