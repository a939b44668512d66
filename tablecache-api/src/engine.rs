//! Object-safe facade over the storage engine.
//!
//! The introspector, refresher and cache coordinator are generic over their
//! transports. Handlers only need a fixed set of operations, so they talk to
//! `Arc<dyn Engine>` and the router state stays a plain struct.

use async_trait::async_trait;
use tablecache_core::{
    CachedTableDescriptor, ColumnDescriptor, ConnectionDescriptor, IntrospectionError,
    RefreshError,
};
use tablecache_storage::{
    CacheInfo, CacheKey, CacheStatsSnapshot, KeyTtl, KeyValueConnector, RefreshMode,
    RefreshOutcome, RelationalStore, SnapshotSource, TableRefreshResult, TableRefresher,
    TableSnapshot,
};

#[async_trait]
pub trait Engine: Send + Sync {
    // ========================================================================
    // Introspection
    // ========================================================================

    async fn list_databases(&self, connection: &ConnectionDescriptor) -> Result<Vec<String>, IntrospectionError>;

    async fn list_schemas(&self, connection: &ConnectionDescriptor) -> Result<Vec<String>, IntrospectionError>;

    async fn list_tables(&self, connection: &ConnectionDescriptor) -> Result<Vec<String>, IntrospectionError>;

    async fn list_columns(
        &self,
        connection: &ConnectionDescriptor,
        table: &str,
    ) -> Result<Vec<ColumnDescriptor>, IntrospectionError>;

    // ========================================================================
    // Refresh
    // ========================================================================

    fn cache_key(&self, table: &CachedTableDescriptor) -> Result<CacheKey, RefreshError>;

    async fn refresh(
        &self,
        connection: &ConnectionDescriptor,
        table: &CachedTableDescriptor,
        mode: RefreshMode,
    ) -> Result<RefreshOutcome, RefreshError>;

    async fn refresh_all(
        &self,
        connection: &ConnectionDescriptor,
        tables: &[CachedTableDescriptor],
        mode: RefreshMode,
    ) -> Vec<TableRefreshResult>;

    async fn cached_snapshot(&self, table: &CachedTableDescriptor) -> Result<Option<TableSnapshot>, RefreshError>;

    async fn invalidate(&self, table: &CachedTableDescriptor) -> Result<u64, RefreshError>;

    // ========================================================================
    // Cache administration
    // ========================================================================

    fn cache_stats(&self) -> CacheStatsSnapshot;

    async fn cache_info(&self) -> CacheInfo;

    async fn key_ttl(&self, key: &str) -> KeyTtl;

    async fn clear_pattern(&self, pattern: &str) -> u64;

    async fn flush_all(&self) -> bool;

    async fn cache_healthy(&self) -> bool;
}

#[async_trait]
impl<R, C, S> Engine for TableRefresher<R, C, S>
where
    R: RelationalStore + 'static,
    C: KeyValueConnector + 'static,
    S: SnapshotSource<R> + 'static,
{
    async fn list_databases(&self, connection: &ConnectionDescriptor) -> Result<Vec<String>, IntrospectionError> {
        let introspector = self.introspector();
        let handle = introspector.connect(connection).await?;
        introspector.list_databases(&handle, connection.dialect).await
    }

    async fn list_schemas(&self, connection: &ConnectionDescriptor) -> Result<Vec<String>, IntrospectionError> {
        let introspector = self.introspector();
        let handle = introspector.connect(connection).await?;
        introspector.list_schemas(&handle).await
    }

    async fn list_tables(&self, connection: &ConnectionDescriptor) -> Result<Vec<String>, IntrospectionError> {
        let introspector = self.introspector();
        let handle = introspector.connect(connection).await?;
        introspector.list_tables(&handle).await
    }

    async fn list_columns(
        &self,
        connection: &ConnectionDescriptor,
        table: &str,
    ) -> Result<Vec<ColumnDescriptor>, IntrospectionError> {
        let introspector = self.introspector();
        let handle = introspector.connect(connection).await?;
        introspector.list_columns(&handle, table).await
    }

    fn cache_key(&self, table: &CachedTableDescriptor) -> Result<CacheKey, RefreshError> {
        self.key_for(table)
    }

    async fn refresh(
        &self,
        connection: &ConnectionDescriptor,
        table: &CachedTableDescriptor,
        mode: RefreshMode,
    ) -> Result<RefreshOutcome, RefreshError> {
        TableRefresher::refresh(self, connection, table, mode).await
    }

    async fn refresh_all(
        &self,
        connection: &ConnectionDescriptor,
        tables: &[CachedTableDescriptor],
        mode: RefreshMode,
    ) -> Vec<TableRefreshResult> {
        TableRefresher::refresh_all(self, connection, tables, mode).await
    }

    async fn cached_snapshot(&self, table: &CachedTableDescriptor) -> Result<Option<TableSnapshot>, RefreshError> {
        TableRefresher::cached_snapshot(self, table).await
    }

    async fn invalidate(&self, table: &CachedTableDescriptor) -> Result<u64, RefreshError> {
        TableRefresher::invalidate(self, table).await
    }

    fn cache_stats(&self) -> CacheStatsSnapshot {
        self.cache().stats()
    }

    async fn cache_info(&self) -> CacheInfo {
        self.cache().info().await
    }

    async fn key_ttl(&self, key: &str) -> KeyTtl {
        self.cache().get_ttl(key).await
    }

    async fn clear_pattern(&self, pattern: &str) -> u64 {
        self.cache().clear_pattern(pattern).await
    }

    async fn flush_all(&self) -> bool {
        self.cache().flush_all().await
    }

    async fn cache_healthy(&self) -> bool {
        self.cache().health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tablecache_core::{new_entity_id, CacheSettings, Dialect};
    use tablecache_storage::mock::MockRelationalStore;
    use tablecache_storage::{
        CacheCoordinator, MemoryConnector, RefreshPolicy, RowSet, SchemaIntrospector,
    };

    fn engine(store: MockRelationalStore) -> Arc<dyn Engine> {
        let settings = CacheSettings::default();
        Arc::new(TableRefresher::new(
            SchemaIntrospector::new(Arc::new(store)),
            Arc::new(CacheCoordinator::new(MemoryConnector::new(), settings.clone())),
            RefreshPolicy::from_settings(&settings),
        ))
    }

    fn connection() -> ConnectionDescriptor {
        ConnectionDescriptor {
            connection_id: new_entity_id(),
            name: "warehouse".to_string(),
            host: "db.internal".to_string(),
            port: 5432,
            user: "reader".to_string(),
            secret: "pw".to_string(),
            database: Some("sales".to_string()),
            ssl_enabled: false,
            dialect: Dialect::Postgresql,
        }
    }

    #[tokio::test]
    async fn test_list_databases_through_facade() {
        let store = MockRelationalStore::new().with_result(
            "SELECT datname FROM pg_database WHERE datistemplate = false",
            RowSet::new(
                vec!["datname".to_string()],
                vec![vec![serde_json::json!("sales")], vec![serde_json::json!("hr")]],
            ),
        );
        let names = engine(store).list_databases(&connection()).await.unwrap();
        assert_eq!(names, vec!["sales".to_string(), "hr".to_string()]);
    }

    #[tokio::test]
    async fn test_cache_admin_starts_empty() {
        let engine = engine(MockRelationalStore::new());
        assert!(engine.cache_healthy().await);
        assert_eq!(engine.key_ttl("cache:none").await, KeyTtl::Absent);
        assert_eq!(engine.cache_stats().total_requests, 0);
    }
}
