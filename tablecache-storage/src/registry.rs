//! Registries for connection and cached-table records.
//!
//! Plain persisted records: the engine reads them, the HTTP layer edits them.
//! Deleting a connection deletes its cached tables.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tablecache_core::{
    CachedTableDescriptor, ConnectionDescriptor, Dialect, EntityId, RefreshInterval,
    RegistryError,
};
use tokio::sync::RwLock;
use tracing::info;

// ============================================================================
// UPDATE TYPES
// ============================================================================

/// Update payload for connections.
#[derive(Debug, Clone, Default)]
pub struct ConnectionUpdate {
    pub name: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub secret: Option<String>,
    /// `Some(None)` clears the target database
    pub database: Option<Option<String>>,
    pub ssl_enabled: Option<bool>,
    pub dialect: Option<Dialect>,
}

impl ConnectionUpdate {
    /// Apply to a record and re-validate it.
    pub fn apply(self, target: &mut ConnectionDescriptor) -> Result<(), RegistryError> {
        if let Some(name) = self.name {
            target.name = name;
        }
        if let Some(host) = self.host {
            target.host = host;
        }
        if let Some(port) = self.port {
            target.port = port;
        }
        if let Some(user) = self.user {
            target.user = user;
        }
        if let Some(secret) = self.secret {
            target.secret = secret;
        }
        if let Some(database) = self.database {
            target.database = database;
        }
        if let Some(ssl_enabled) = self.ssl_enabled {
            target.ssl_enabled = ssl_enabled;
        }
        if let Some(dialect) = self.dialect {
            target.dialect = dialect;
        }
        target.validate()?;
        Ok(())
    }
}

/// Update payload for cached tables.
#[derive(Debug, Clone, Default)]
pub struct CachedTableUpdate {
    pub table_name: Option<String>,
    pub field_list: Option<Vec<String>>,
    pub refresh_interval: Option<RefreshInterval>,
    pub is_active: Option<bool>,
    pub primary_key: Option<String>,
}

impl CachedTableUpdate {
    pub fn apply(self, target: &mut CachedTableDescriptor) -> Result<(), RegistryError> {
        if let Some(table_name) = self.table_name {
            target.table_name = table_name;
        }
        if let Some(field_list) = self.field_list {
            target.field_list = field_list;
        }
        if let Some(refresh_interval) = self.refresh_interval {
            target.refresh_interval = refresh_interval;
        }
        if let Some(is_active) = self.is_active {
            target.is_active = is_active;
        }
        if let Some(primary_key) = self.primary_key {
            target.primary_key = primary_key;
        }
        target.validate()?;
        Ok(())
    }
}

// ============================================================================
// REGISTRY TRAITS
// ============================================================================

#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    async fn get_connection(&self, id: EntityId) -> Result<Option<ConnectionDescriptor>, RegistryError>;

    async fn list_connections(&self) -> Result<Vec<ConnectionDescriptor>, RegistryError>;

    async fn insert_connection(&self, connection: &ConnectionDescriptor) -> Result<(), RegistryError>;

    async fn update_connection(
        &self,
        id: EntityId,
        update: ConnectionUpdate,
    ) -> Result<ConnectionDescriptor, RegistryError>;

    /// Delete a connection and every cached table that references it.
    async fn delete_connection(&self, id: EntityId) -> Result<(), RegistryError>;
}

#[async_trait]
pub trait CachedTableRegistry: Send + Sync {
    async fn get_cached_table(&self, id: EntityId) -> Result<Option<CachedTableDescriptor>, RegistryError>;

    async fn list_cached_tables(&self) -> Result<Vec<CachedTableDescriptor>, RegistryError>;

    async fn list_cached_tables_for_connection(
        &self,
        connection_id: EntityId,
    ) -> Result<Vec<CachedTableDescriptor>, RegistryError>;

    /// Fails with `NotFound` when the owning connection is not registered.
    async fn insert_cached_table(&self, table: &CachedTableDescriptor) -> Result<(), RegistryError>;

    async fn update_cached_table(
        &self,
        id: EntityId,
        update: CachedTableUpdate,
    ) -> Result<CachedTableDescriptor, RegistryError>;

    async fn delete_cached_table(&self, id: EntityId) -> Result<(), RegistryError>;
}

/// Both registries behind one object.
pub trait Registry: ConnectionRegistry + CachedTableRegistry {}

impl<T: ConnectionRegistry + CachedTableRegistry> Registry for T {}

/// Entity names carried by `RegistryError`.
pub const CONNECTION: &str = "Connection";
pub const CACHED_TABLE: &str = "CachedTable";

// ============================================================================
// IN-MEMORY REGISTRY
// ============================================================================

#[derive(Debug, Default)]
struct Records {
    connections: BTreeMap<EntityId, ConnectionDescriptor>,
    cached_tables: BTreeMap<EntityId, CachedTableDescriptor>,
}

/// Registry held in process memory. Both record kinds share one lock so the
/// cascade on connection delete is atomic.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    records: RwLock<Records>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConnectionRegistry for InMemoryRegistry {
    async fn get_connection(&self, id: EntityId) -> Result<Option<ConnectionDescriptor>, RegistryError> {
        Ok(self.records.read().await.connections.get(&id).cloned())
    }

    async fn list_connections(&self) -> Result<Vec<ConnectionDescriptor>, RegistryError> {
        Ok(self.records.read().await.connections.values().cloned().collect())
    }

    async fn insert_connection(&self, connection: &ConnectionDescriptor) -> Result<(), RegistryError> {
        connection.validate()?;
        let mut records = self.records.write().await;
        if records.connections.contains_key(&connection.connection_id) {
            return Err(RegistryError::Conflict {
                entity: CONNECTION,
                reason: format!("id {} already exists", connection.connection_id),
            });
        }
        records
            .connections
            .insert(connection.connection_id, connection.clone());
        Ok(())
    }

    async fn update_connection(
        &self,
        id: EntityId,
        update: ConnectionUpdate,
    ) -> Result<ConnectionDescriptor, RegistryError> {
        let mut records = self.records.write().await;
        let current = records
            .connections
            .get(&id)
            .ok_or(RegistryError::NotFound { entity: CONNECTION, id })?;

        let mut updated = current.clone();
        update.apply(&mut updated)?;
        records.connections.insert(id, updated.clone());
        Ok(updated)
    }

    async fn delete_connection(&self, id: EntityId) -> Result<(), RegistryError> {
        let mut records = self.records.write().await;
        if records.connections.remove(&id).is_none() {
            return Err(RegistryError::NotFound { entity: CONNECTION, id });
        }
        let before = records.cached_tables.len();
        records.cached_tables.retain(|_, t| t.connection_id != id);
        let cascaded = before - records.cached_tables.len();
        info!(connection_id = %id, cascaded, "deleted connection");
        Ok(())
    }
}

#[async_trait]
impl CachedTableRegistry for InMemoryRegistry {
    async fn get_cached_table(&self, id: EntityId) -> Result<Option<CachedTableDescriptor>, RegistryError> {
        Ok(self.records.read().await.cached_tables.get(&id).cloned())
    }

    async fn list_cached_tables(&self) -> Result<Vec<CachedTableDescriptor>, RegistryError> {
        Ok(self.records.read().await.cached_tables.values().cloned().collect())
    }

    async fn list_cached_tables_for_connection(
        &self,
        connection_id: EntityId,
    ) -> Result<Vec<CachedTableDescriptor>, RegistryError> {
        Ok(self
            .records
            .read()
            .await
            .cached_tables
            .values()
            .filter(|t| t.connection_id == connection_id)
            .cloned()
            .collect())
    }

    async fn insert_cached_table(&self, table: &CachedTableDescriptor) -> Result<(), RegistryError> {
        table.validate()?;
        let mut records = self.records.write().await;
        if !records.connections.contains_key(&table.connection_id) {
            return Err(RegistryError::NotFound {
                entity: CONNECTION,
                id: table.connection_id,
            });
        }
        if records.cached_tables.contains_key(&table.cached_table_id) {
            return Err(RegistryError::Conflict {
                entity: CACHED_TABLE,
                reason: format!("id {} already exists", table.cached_table_id),
            });
        }
        records
            .cached_tables
            .insert(table.cached_table_id, table.clone());
        Ok(())
    }

    async fn update_cached_table(
        &self,
        id: EntityId,
        update: CachedTableUpdate,
    ) -> Result<CachedTableDescriptor, RegistryError> {
        let mut records = self.records.write().await;
        let current = records
            .cached_tables
            .get(&id)
            .ok_or(RegistryError::NotFound { entity: CACHED_TABLE, id })?;

        let mut updated = current.clone();
        update.apply(&mut updated)?;
        records.cached_tables.insert(id, updated.clone());
        Ok(updated)
    }

    async fn delete_cached_table(&self, id: EntityId) -> Result<(), RegistryError> {
        let mut records = self.records.write().await;
        records
            .cached_tables
            .remove(&id)
            .map(|_| ())
            .ok_or(RegistryError::NotFound { entity: CACHED_TABLE, id })
    }
}
