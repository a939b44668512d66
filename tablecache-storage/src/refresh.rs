//! Table refresh: ties introspection, key derivation and the cache together.
//!
//! For one cached-table record:
//!
//! 1. derive the cache key;
//! 2. unless forced, ask the cache for the key's TTL and stop if the entry is
//!    still fresh;
//! 3. reflect the live table and check the tracked primary key still exists
//!    (schema drift fails the refresh and leaves the cache untouched);
//! 4. read the row snapshot and write it under the same key with the table's
//!    refresh interval as TTL.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tablecache_core::{
    CacheSettings, CachedTableDescriptor, ConnectionDescriptor, EntityId, RefreshError,
    Timestamp, ValidationError,
};
use tracing::{debug, info, warn};

use crate::cache::{table_pattern, CacheCoordinator, CacheKey, CacheKeyBuilder, KeyTtl, KeyValueConnector};
use crate::introspect::{RelationalStore, Row, RowSet, SchemaIntrospector, StoreHandle};
use crate::query::SelectQuery;

// ============================================================================
// POLICY AND OUTCOMES
// ============================================================================

/// Refresh knobs taken from the cache settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshPolicy {
    pub key_prefix: String,
    /// Entries with fewer seconds left than this are refreshed early.
    pub low_water_secs: i64,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            key_prefix: "cache".to_string(),
            low_water_secs: 60,
        }
    }
}

impl RefreshPolicy {
    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self {
            key_prefix: settings.key_prefix.clone(),
            low_water_secs: settings.low_water_secs,
        }
    }

    /// Whether an entry with this TTL should be rebuilt.
    pub fn is_stale(&self, ttl: KeyTtl) -> bool {
        match ttl {
            KeyTtl::Absent => true,
            KeyTtl::Persistent => false,
            KeyTtl::Expires(secs) => i64::try_from(secs).unwrap_or(i64::MAX) < self.low_water_secs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshMode {
    /// Rebuild only absent or nearly expired entries.
    IfStale,
    /// Rebuild regardless of the current entry, inactive tables included.
    Force,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefreshOutcome {
    Skipped { key: CacheKey, reason: SkipReason },
    Fresh { key: CacheKey, ttl: KeyTtl },
    Refreshed { key: CacheKey, row_count: usize, max_id: i64 },
}

impl RefreshOutcome {
    pub fn key(&self) -> &CacheKey {
        match self {
            RefreshOutcome::Skipped { key, .. }
            | RefreshOutcome::Fresh { key, .. }
            | RefreshOutcome::Refreshed { key, .. } => key,
        }
    }
}

/// The cached artifact for one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub table: String,
    pub primary_key: String,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub max_id: i64,
    pub refreshed_at: Timestamp,
}

/// Largest integer primary key in a snapshot, 0 when there are no rows.
///
/// Integer strings count; other non-integer values are ignored. A row
/// without the column fails.
pub fn max_primary_key(rows: &[Row], primary_key: &str) -> Result<i64, ValidationError> {
    let mut max_id = 0i64;
    for row in rows {
        let value = row
            .get(primary_key)
            .ok_or_else(|| ValidationError::RequiredFieldMissing {
                field: primary_key.to_string(),
            })?;
        let id = match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse::<i64>().ok(),
            _ => None,
        };
        if let Some(id) = id {
            max_id = max_id.max(id);
        }
    }
    Ok(max_id)
}

/// Columns to select: tracked fields present on the live table, or every
/// live column when none are tracked. The primary key always comes first.
pub fn reconcile_fields(table: &CachedTableDescriptor, live_columns: &[String]) -> Vec<String> {
    let tracked: Vec<&String> = if table.field_list.is_empty() {
        live_columns.iter().collect()
    } else {
        table.field_list.iter().collect()
    };

    let mut columns = vec![table.primary_key.clone()];
    for field in tracked {
        if columns.contains(field) {
            continue;
        }
        if live_columns.contains(field) {
            columns.push(field.clone());
        } else {
            warn!(
                table = %table.table_name,
                field = %field,
                "tracked field missing from live table, dropped"
            );
        }
    }
    columns
}

// ============================================================================
// SNAPSHOT SOURCE
// ============================================================================

/// Reads a table's rows for caching.
#[async_trait]
pub trait SnapshotSource<R: RelationalStore>: Send + Sync {
    async fn fetch(
        &self,
        store: &R,
        handle: &R::Handle,
        table: &str,
        columns: &[String],
    ) -> Result<RowSet, RefreshError>;
}

/// Plain `SELECT cols FROM table` through the relational store.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlSnapshotSource;

#[async_trait]
impl<R: RelationalStore> SnapshotSource<R> for SqlSnapshotSource {
    async fn fetch(
        &self,
        store: &R,
        handle: &R::Handle,
        table: &str,
        columns: &[String],
    ) -> Result<RowSet, RefreshError> {
        let failed = |reason: String| RefreshError::SnapshotFailed {
            table: table.to_string(),
            reason,
        };
        let statement = SelectQuery::new(table)
            .columns(columns.iter().cloned())
            .build(handle.dialect())
            .map_err(|e| failed(e.to_string()))?;
        store
            .execute(handle, &statement)
            .await
            .map_err(|e| failed(e.to_string()))
    }
}

// ============================================================================
// REFRESHER
// ============================================================================

/// Result of one table in a batch refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRefreshResult {
    pub cached_table_id: EntityId,
    pub table_name: String,
    pub result: Result<RefreshOutcome, RefreshError>,
}

pub struct TableRefresher<R, C, S = SqlSnapshotSource>
where
    R: RelationalStore,
    C: KeyValueConnector,
{
    introspector: SchemaIntrospector<R>,
    cache: Arc<CacheCoordinator<C>>,
    source: S,
    policy: RefreshPolicy,
}

impl<R, C> TableRefresher<R, C, SqlSnapshotSource>
where
    R: RelationalStore,
    C: KeyValueConnector,
{
    pub fn new(
        introspector: SchemaIntrospector<R>,
        cache: Arc<CacheCoordinator<C>>,
        policy: RefreshPolicy,
    ) -> Self {
        Self::with_source(introspector, cache, SqlSnapshotSource, policy)
    }
}

impl<R, C, S> TableRefresher<R, C, S>
where
    R: RelationalStore,
    C: KeyValueConnector,
    S: SnapshotSource<R>,
{
    pub fn with_source(
        introspector: SchemaIntrospector<R>,
        cache: Arc<CacheCoordinator<C>>,
        source: S,
        policy: RefreshPolicy,
    ) -> Self {
        Self {
            introspector,
            cache,
            source,
            policy,
        }
    }

    pub fn policy(&self) -> &RefreshPolicy {
        &self.policy
    }

    pub fn cache(&self) -> &Arc<CacheCoordinator<C>> {
        &self.cache
    }

    pub fn introspector(&self) -> &SchemaIntrospector<R> {
        &self.introspector
    }

    pub fn key_for(&self, table: &CachedTableDescriptor) -> Result<CacheKey, RefreshError> {
        Ok(CacheKeyBuilder::for_table(&self.policy.key_prefix, table).build()?)
    }

    /// Refresh one table's cache entry.
    pub async fn refresh(
        &self,
        connection: &ConnectionDescriptor,
        table: &CachedTableDescriptor,
        mode: RefreshMode,
    ) -> Result<RefreshOutcome, RefreshError> {
        if table.connection_id != connection.connection_id {
            return Err(RefreshError::ConnectionNotFound {
                connection_id: table.connection_id,
                table: table.table_name.clone(),
            });
        }

        let key = self.key_for(table)?;

        if mode == RefreshMode::IfStale {
            if !table.is_active {
                debug!(table = %table.table_name, "inactive table skipped");
                return Ok(RefreshOutcome::Skipped {
                    key,
                    reason: SkipReason::Inactive,
                });
            }
            let ttl = self.cache.get_ttl(key.as_str()).await;
            if !self.policy.is_stale(ttl) {
                debug!(key = %key, ttl = ttl.as_seconds(), "cache entry fresh");
                return Ok(RefreshOutcome::Fresh { key, ttl });
            }
        }

        let handle = self.introspector.connect(connection).await?;
        let live = self
            .introspector
            .list_columns(&handle, &table.table_name)
            .await?;
        let live_columns: Vec<String> = live.into_iter().map(|c| c.name).collect();

        if !live_columns.contains(&table.primary_key) {
            warn!(
                table = %table.table_name,
                primary_key = %table.primary_key,
                "schema drift, refresh halted"
            );
            return Err(RefreshError::SchemaDrift {
                table: table.table_name.clone(),
                primary_key: table.primary_key.clone(),
                live_columns,
            });
        }

        let columns = reconcile_fields(table, &live_columns);
        let rows = self
            .source
            .fetch(self.introspector.store(), &handle, &table.table_name, &columns)
            .await?;

        let columns = rows.columns.clone();
        let rows = rows.into_mappings();
        let max_id = max_primary_key(&rows, &table.primary_key).map_err(|e| {
            RefreshError::SnapshotFailed {
                table: table.table_name.clone(),
                reason: e.to_string(),
            }
        })?;
        let row_count = rows.len();

        let snapshot = TableSnapshot {
            table: table.table_name.clone(),
            primary_key: table.primary_key.clone(),
            columns,
            rows,
            max_id,
            refreshed_at: Utc::now(),
        };

        // zero interval: store without expiry rather than with the default TTL
        let ttl = table.refresh_interval.ttl_secs().unwrap_or(0);
        if !self.cache.set_serialized(key.as_str(), &snapshot, Some(ttl)).await {
            return Err(RefreshError::CacheWriteFailed {
                key: key.into_string(),
            });
        }

        info!(key = %key, row_count, max_id, ttl, "table refreshed");
        Ok(RefreshOutcome::Refreshed {
            key,
            row_count,
            max_id,
        })
    }

    /// Refresh several tables of one connection in order. One failure does
    /// not stop the rest.
    pub async fn refresh_all(
        &self,
        connection: &ConnectionDescriptor,
        tables: &[CachedTableDescriptor],
        mode: RefreshMode,
    ) -> Vec<TableRefreshResult> {
        let mut results = Vec::with_capacity(tables.len());
        for table in tables {
            let result = self.refresh(connection, table, mode).await;
            if let Err(e) = &result {
                warn!(table = %table.table_name, error = %e, "table refresh failed");
            }
            results.push(TableRefreshResult {
                cached_table_id: table.cached_table_id,
                table_name: table.table_name.clone(),
                result,
            });
        }
        results
    }

    /// Read the cached snapshot for a table, if any.
    pub async fn cached_snapshot(
        &self,
        table: &CachedTableDescriptor,
    ) -> Result<Option<TableSnapshot>, RefreshError> {
        let key = self.key_for(table)?;
        Ok(self.cache.get_json(key.as_str()).await)
    }

    /// Drop a table's entry and any scoped entries under it.
    pub async fn invalidate(&self, table: &CachedTableDescriptor) -> Result<u64, RefreshError> {
        let key = self.key_for(table)?;
        let mut removed = u64::from(self.cache.delete(key.as_str()).await);
        removed += self
            .cache
            .clear_pattern(&table_pattern(&self.policy.key_prefix, table))
            .await;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryConnector;
    use crate::mock::{MockCall, MockRelationalStore};
    use serde_json::json;
    use tablecache_core::{new_entity_id, ColumnDescriptor, Dialect, RefreshInterval};

    fn connection() -> ConnectionDescriptor {
        ConnectionDescriptor {
            connection_id: new_entity_id(),
            name: "sales".to_string(),
            host: "localhost".to_string(),
            port: 5432,
            user: "reader".to_string(),
            secret: "pw".to_string(),
            database: Some("sales".to_string()),
            ssl_enabled: false,
            dialect: Dialect::Postgresql,
        }
    }

    fn table(connection_id: EntityId, fields: &[&str]) -> CachedTableDescriptor {
        CachedTableDescriptor {
            cached_table_id: new_entity_id(),
            table_name: "orders".to_string(),
            field_list: fields.iter().map(|f| f.to_string()).collect(),
            refresh_interval: RefreshInterval::from_secs(3600),
            connection_id,
            is_active: true,
            primary_key: "id".to_string(),
        }
    }

    fn store() -> MockRelationalStore {
        MockRelationalStore::new()
            .with_table(
                "orders",
                vec![
                    ColumnDescriptor::new("id", "integer", false),
                    ColumnDescriptor::new("total", "numeric", true),
                ],
            )
            .with_rows(
                "orders",
                RowSet::new(
                    vec!["id".to_string(), "total".to_string()],
                    vec![vec![json!(3), json!(9.5)], vec![json!(11), json!(2.0)]],
                ),
            )
    }

    fn refresher(
        store: MockRelationalStore,
    ) -> TableRefresher<MockRelationalStore, MemoryConnector> {
        let cache = Arc::new(CacheCoordinator::new(
            MemoryConnector::new(),
            CacheSettings::default(),
        ));
        TableRefresher::new(
            SchemaIntrospector::new(Arc::new(store)),
            cache,
            RefreshPolicy::default(),
        )
    }

    #[test]
    fn test_staleness() {
        let policy = RefreshPolicy::default();
        assert!(policy.is_stale(KeyTtl::Absent));
        assert!(policy.is_stale(KeyTtl::Expires(59)));
        assert!(!policy.is_stale(KeyTtl::Expires(60)));
        assert!(!policy.is_stale(KeyTtl::Persistent));
    }

    #[test]
    fn test_max_primary_key() {
        let rows: Vec<Row> = vec![
            json!({"id": 4}).as_object().cloned().unwrap(),
            json!({"id": "12"}).as_object().cloned().unwrap(),
            json!({"id": 7}).as_object().cloned().unwrap(),
        ];
        assert_eq!(max_primary_key(&rows, "id").unwrap(), 12);
        assert_eq!(max_primary_key(&[], "id").unwrap(), 0);
        assert!(max_primary_key(&rows, "order_id").is_err());
    }

    #[test]
    fn test_reconcile_fields_drops_missing_and_keeps_pk() {
        let descriptor = table(new_entity_id(), &["total", "discount"]);
        let live = vec!["id".to_string(), "total".to_string()];
        assert_eq!(reconcile_fields(&descriptor, &live), vec!["id", "total"]);

        let all = table(new_entity_id(), &[]);
        assert_eq!(reconcile_fields(&all, &live), vec!["id", "total"]);
    }

    #[tokio::test]
    async fn test_refresh_writes_snapshot_with_interval_ttl() {
        let conn = connection();
        let descriptor = table(conn.connection_id, &["total"]);
        let refresher = refresher(store());

        let outcome = refresher
            .refresh(&conn, &descriptor, RefreshMode::IfStale)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            RefreshOutcome::Refreshed {
                key: refresher.key_for(&descriptor).unwrap(),
                row_count: 2,
                max_id: 11,
            }
        );

        let key = outcome.key().clone();
        assert_eq!(key.as_str(), format!("cache:orders:{}", conn.connection_id));
        match refresher.cache().get_ttl(key.as_str()).await {
            KeyTtl::Expires(secs) => assert!(secs > 3590 && secs <= 3600),
            other => panic!("unexpected ttl {:?}", other),
        }

        let snapshot = refresher.cached_snapshot(&descriptor).await.unwrap().unwrap();
        assert_eq!(snapshot.columns, vec!["id", "total"]);
        assert_eq!(snapshot.rows.len(), 2);
        assert_eq!(snapshot.max_id, 11);
    }

    #[tokio::test]
    async fn test_second_refresh_is_fresh() {
        let conn = connection();
        let descriptor = table(conn.connection_id, &[]);
        let refresher = refresher(store());

        refresher.refresh(&conn, &descriptor, RefreshMode::IfStale).await.unwrap();
        let second = refresher
            .refresh(&conn, &descriptor, RefreshMode::IfStale)
            .await
            .unwrap();
        assert!(matches!(second, RefreshOutcome::Fresh { .. }));

        let forced = refresher
            .refresh(&conn, &descriptor, RefreshMode::Force)
            .await
            .unwrap();
        assert!(matches!(forced, RefreshOutcome::Refreshed { .. }));
    }

    #[tokio::test]
    async fn test_inactive_table_is_skipped() {
        let conn = connection();
        let mut descriptor = table(conn.connection_id, &[]);
        descriptor.is_active = false;
        let refresher = refresher(store());

        let outcome = refresher
            .refresh(&conn, &descriptor, RefreshMode::IfStale)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            RefreshOutcome::Skipped { reason: SkipReason::Inactive, .. }
        ));
    }

    #[tokio::test]
    async fn test_zero_interval_stores_without_expiry() {
        let conn = connection();
        let mut descriptor = table(conn.connection_id, &[]);
        descriptor.refresh_interval = RefreshInterval::NEVER;
        let refresher = refresher(store());

        refresher.refresh(&conn, &descriptor, RefreshMode::IfStale).await.unwrap();
        let key = refresher.key_for(&descriptor).unwrap();
        assert_eq!(refresher.cache().get_ttl(key.as_str()).await, KeyTtl::Persistent);
    }

    #[tokio::test]
    async fn test_mismatched_connection_rejected() {
        let descriptor = table(new_entity_id(), &[]);
        let refresher = refresher(store());
        let err = refresher
            .refresh(&connection(), &descriptor, RefreshMode::Force)
            .await
            .unwrap_err();
        assert!(matches!(err, RefreshError::ConnectionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_invalidate_removes_entry() {
        let conn = connection();
        let descriptor = table(conn.connection_id, &[]);
        let refresher = refresher(store());
        refresher.refresh(&conn, &descriptor, RefreshMode::Force).await.unwrap();
        let scoped = CacheKeyBuilder::for_table("cache", &descriptor)
            .extra("page-2")
            .build()
            .unwrap();
        refresher.cache().set(scoped.as_str(), "scoped", None).await;

        assert_eq!(refresher.invalidate(&descriptor).await.unwrap(), 2);
        assert!(refresher.cached_snapshot(&descriptor).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_same_table_on_two_connections_is_cached_separately() {
        let first = connection();
        let second = connection();
        let first_orders = table(first.connection_id, &[]);
        let second_orders = table(second.connection_id, &[]);
        let refresher = refresher(store());

        refresher
            .refresh(&first, &first_orders, RefreshMode::IfStale)
            .await
            .unwrap();
        let outcome = refresher
            .refresh(&second, &second_orders, RefreshMode::IfStale)
            .await
            .unwrap();

        assert!(matches!(outcome, RefreshOutcome::Refreshed { .. }));
        assert_ne!(
            refresher.key_for(&first_orders).unwrap(),
            refresher.key_for(&second_orders).unwrap()
        );
        let opened: Vec<EntityId> = refresher
            .introspector()
            .store()
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                MockCall::Open { connection_id } => Some(connection_id),
                _ => None,
            })
            .collect();
        assert_eq!(opened, vec![first.connection_id, second.connection_id]);

        // dropping one connection's entry leaves the other in place
        assert_eq!(refresher.invalidate(&first_orders).await.unwrap(), 1);
        assert!(refresher.cached_snapshot(&first_orders).await.unwrap().is_none());
        assert!(refresher.cached_snapshot(&second_orders).await.unwrap().is_some());
    }
}
