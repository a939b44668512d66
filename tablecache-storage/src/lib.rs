//! Tablecache Storage - Introspection, Cache Keys and Cache Coordination
//!
//! Engine crate: discovers the schema of registered external databases,
//! derives cache keys for cached-table snapshots and keeps those snapshots
//! in a key-value store.
//! The HTTP surface lives in tablecache-api.

pub mod cache;
pub mod catalog;
pub mod introspect;
pub mod mock;
pub mod postgres;
pub mod query;
pub mod refresh;
pub mod registry;

pub use catalog::{CatalogEntry, DialectCatalog};
pub use introspect::{
    RelationalStore, Row, RowSet, SchemaIntrospector, Statement, StoreError, StoreHandle,
};
pub use postgres::{PgHandle, PgRelationalStore};
pub use query::{validate_identifier, SelectQuery};
pub use refresh::{
    max_primary_key, reconcile_fields, RefreshMode, RefreshOutcome, RefreshPolicy, SkipReason,
    SnapshotSource, SqlSnapshotSource, TableRefreshResult, TableRefresher, TableSnapshot,
};
pub use registry::{
    CachedTableRegistry, CachedTableUpdate, ConnectionRegistry, ConnectionUpdate,
    InMemoryRegistry, Registry,
};

// Re-export cache types for API integration
pub use cache::{
    build_key, table_pattern, CacheCoordinator, CacheInfo, CacheKey, CacheKeyBuilder,
    CacheStatsSnapshot, CacheValue, ConnectionState, KeyTtl, KeyValueConnector, KeyValueStore,
    KvError, MemoryConnector, MemoryKeyValueStore, RedisConnector, RedisKeyValueStore,
    ServerInfo,
};
