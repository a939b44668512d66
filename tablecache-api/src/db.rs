//! Database Connection Pool Module
//!
//! Connection pooling for the registry database using deadpool-postgres,
//! and [`PgRegistry`], the persisted implementation of the connection and
//! cached-table registries.

use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use std::time::Duration;
use tablecache_core::{
    CachedTableDescriptor, ConnectionDescriptor, Dialect, EntityId, RefreshInterval,
    RegistryError,
};
use tablecache_storage::registry::{CACHED_TABLE, CONNECTION};
use tablecache_storage::{CachedTableRegistry, CachedTableUpdate, ConnectionRegistry, ConnectionUpdate};
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, Row};
use tracing::info;

use crate::error::{ApiError, ApiResult};

// ============================================================================
// DATABASE CONFIGURATION
// ============================================================================

/// Configuration for the registry database connection pool.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Connection timeout
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "tablecache".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    ///
    /// Reads `TABLECACHE_DB_HOST`, `TABLECACHE_DB_PORT`, `TABLECACHE_DB_NAME`,
    /// `TABLECACHE_DB_USER`, `TABLECACHE_DB_PASSWORD`, `TABLECACHE_DB_POOL_SIZE`
    /// and `TABLECACHE_DB_TIMEOUT` (seconds).
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("TABLECACHE_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("TABLECACHE_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            dbname: std::env::var("TABLECACHE_DB_NAME").unwrap_or_else(|_| "tablecache".to_string()),
            user: std::env::var("TABLECACHE_DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("TABLECACHE_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("TABLECACHE_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            timeout: Duration::from_secs(
                std::env::var("TABLECACHE_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.connect_timeout = Some(self.timeout);

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(deadpool_postgres::PoolConfig::new(self.max_size));

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))?;

        Ok(pool)
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS tablecache_connections (
    connection_id UUID PRIMARY KEY,
    name TEXT NOT NULL,
    host TEXT NOT NULL,
    port INTEGER NOT NULL,
    username TEXT NOT NULL,
    secret TEXT NOT NULL,
    database_name TEXT,
    ssl_enabled BOOLEAN NOT NULL DEFAULT FALSE,
    dialect TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tablecache_cached_tables (
    cached_table_id UUID PRIMARY KEY,
    table_name TEXT NOT NULL,
    field_list TEXT[] NOT NULL DEFAULT '{}',
    refresh_interval TEXT NOT NULL,
    connection_id UUID NOT NULL REFERENCES tablecache_connections(connection_id) ON DELETE CASCADE,
    is_active BOOLEAN NOT NULL DEFAULT FALSE,
    primary_key TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS tablecache_cached_tables_connection_idx
    ON tablecache_cached_tables (connection_id);
"#;

const CONNECTION_COLUMNS: &str =
    "connection_id, name, host, port, username, secret, database_name, ssl_enabled, dialect";

const CACHED_TABLE_COLUMNS: &str =
    "cached_table_id, table_name, field_list, refresh_interval, connection_id, is_active, primary_key";

// ============================================================================
// POSTGRES REGISTRY
// ============================================================================

/// Registry persisted in the service's own PostgreSQL database.
#[derive(Clone)]
pub struct PgRegistry {
    pool: Pool,
}

fn backend(e: impl std::fmt::Display) -> RegistryError {
    RegistryError::Backend {
        reason: e.to_string(),
    }
}

fn conflict_or_backend(entity: &'static str, e: tokio_postgres::Error) -> RegistryError {
    if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        RegistryError::Conflict {
            entity,
            reason: e.to_string(),
        }
    } else {
        backend(e)
    }
}

fn connection_from_row(row: &Row) -> Result<ConnectionDescriptor, RegistryError> {
    let port: i32 = row.try_get("port").map_err(backend)?;
    let dialect: String = row.try_get("dialect").map_err(backend)?;
    Ok(ConnectionDescriptor {
        connection_id: row.try_get("connection_id").map_err(backend)?,
        name: row.try_get("name").map_err(backend)?,
        host: row.try_get("host").map_err(backend)?,
        port: u16::try_from(port).map_err(|_| backend(format!("stored port {} out of range", port)))?,
        user: row.try_get("username").map_err(backend)?,
        secret: row.try_get("secret").map_err(backend)?,
        database: row.try_get("database_name").map_err(backend)?,
        ssl_enabled: row.try_get("ssl_enabled").map_err(backend)?,
        dialect: dialect.parse::<Dialect>().map_err(backend)?,
    })
}

fn cached_table_from_row(row: &Row) -> Result<CachedTableDescriptor, RegistryError> {
    let interval: String = row.try_get("refresh_interval").map_err(backend)?;
    Ok(CachedTableDescriptor {
        cached_table_id: row.try_get("cached_table_id").map_err(backend)?,
        table_name: row.try_get("table_name").map_err(backend)?,
        field_list: row.try_get("field_list").map_err(backend)?,
        refresh_interval: interval.parse::<RefreshInterval>().map_err(backend)?,
        connection_id: row.try_get("connection_id").map_err(backend)?,
        is_active: row.try_get("is_active").map_err(backend)?,
        primary_key: row.try_get("primary_key").map_err(backend)?,
    })
}

impl PgRegistry {
    /// Create a new registry over a connection pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a new registry from configuration.
    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        let pool = config.create_pool()?;
        Ok(Self::new(pool))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    /// Get a connection from the pool.
    async fn get_conn(&self) -> Result<deadpool_postgres::Object, RegistryError> {
        self.pool.get().await.map_err(backend)
    }

    /// Create the registry tables if they are missing.
    pub async fn bootstrap(&self) -> ApiResult<()> {
        let conn = self.pool.get().await?;
        conn.batch_execute(SCHEMA_SQL).await?;
        info!("registry schema ready");
        Ok(())
    }

    /// Round-trip a trivial query through the pool.
    pub async fn health_check(&self) -> ApiResult<()> {
        let conn = self.pool.get().await?;
        conn.query_one("SELECT 1", &[]).await?;
        Ok(())
    }
}

#[async_trait]
impl ConnectionRegistry for PgRegistry {
    async fn get_connection(&self, id: EntityId) -> Result<Option<ConnectionDescriptor>, RegistryError> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                &format!(
                    "SELECT {} FROM tablecache_connections WHERE connection_id = $1",
                    CONNECTION_COLUMNS
                ),
                &[&id],
            )
            .await
            .map_err(backend)?;
        row.as_ref().map(connection_from_row).transpose()
    }

    async fn list_connections(&self) -> Result<Vec<ConnectionDescriptor>, RegistryError> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM tablecache_connections ORDER BY connection_id",
                    CONNECTION_COLUMNS
                ),
                &[],
            )
            .await
            .map_err(backend)?;
        rows.iter().map(connection_from_row).collect()
    }

    async fn insert_connection(&self, connection: &ConnectionDescriptor) -> Result<(), RegistryError> {
        connection.validate()?;
        let conn = self.get_conn().await?;
        conn.execute(
            &format!(
                "INSERT INTO tablecache_connections ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
                CONNECTION_COLUMNS
            ),
            &[
                &connection.connection_id,
                &connection.name,
                &connection.host,
                &i32::from(connection.port),
                &connection.user,
                &connection.secret,
                &connection.database,
                &connection.ssl_enabled,
                &connection.dialect.as_str(),
            ],
        )
        .await
        .map_err(|e| conflict_or_backend(CONNECTION, e))?;
        Ok(())
    }

    async fn update_connection(
        &self,
        id: EntityId,
        update: ConnectionUpdate,
    ) -> Result<ConnectionDescriptor, RegistryError> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await.map_err(backend)?;

        let row = tx
            .query_opt(
                &format!(
                    "SELECT {} FROM tablecache_connections WHERE connection_id = $1 FOR UPDATE",
                    CONNECTION_COLUMNS
                ),
                &[&id],
            )
            .await
            .map_err(backend)?
            .ok_or(RegistryError::NotFound { entity: CONNECTION, id })?;

        let mut updated = connection_from_row(&row)?;
        update.apply(&mut updated)?;
        tx.execute(
            "UPDATE tablecache_connections SET name = $2, host = $3, port = $4, username = $5, \
             secret = $6, database_name = $7, ssl_enabled = $8, dialect = $9 \
             WHERE connection_id = $1",
            &[
                &id,
                &updated.name,
                &updated.host,
                &i32::from(updated.port),
                &updated.user,
                &updated.secret,
                &updated.database,
                &updated.ssl_enabled,
                &updated.dialect.as_str(),
            ],
        )
        .await
        .map_err(backend)?;
        tx.commit().await.map_err(backend)?;
        Ok(updated)
    }

    async fn delete_connection(&self, id: EntityId) -> Result<(), RegistryError> {
        let conn = self.get_conn().await?;
        let deleted = conn
            .execute(
                "DELETE FROM tablecache_connections WHERE connection_id = $1",
                &[&id],
            )
            .await
            .map_err(backend)?;
        if deleted == 0 {
            return Err(RegistryError::NotFound { entity: CONNECTION, id });
        }
        info!(connection_id = %id, "deleted connection");
        Ok(())
    }
}

#[async_trait]
impl CachedTableRegistry for PgRegistry {
    async fn get_cached_table(&self, id: EntityId) -> Result<Option<CachedTableDescriptor>, RegistryError> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                &format!(
                    "SELECT {} FROM tablecache_cached_tables WHERE cached_table_id = $1",
                    CACHED_TABLE_COLUMNS
                ),
                &[&id],
            )
            .await
            .map_err(backend)?;
        row.as_ref().map(cached_table_from_row).transpose()
    }

    async fn list_cached_tables(&self) -> Result<Vec<CachedTableDescriptor>, RegistryError> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM tablecache_cached_tables ORDER BY cached_table_id",
                    CACHED_TABLE_COLUMNS
                ),
                &[],
            )
            .await
            .map_err(backend)?;
        rows.iter().map(cached_table_from_row).collect()
    }

    async fn list_cached_tables_for_connection(
        &self,
        connection_id: EntityId,
    ) -> Result<Vec<CachedTableDescriptor>, RegistryError> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM tablecache_cached_tables WHERE connection_id = $1 \
                     ORDER BY cached_table_id",
                    CACHED_TABLE_COLUMNS
                ),
                &[&connection_id],
            )
            .await
            .map_err(backend)?;
        rows.iter().map(cached_table_from_row).collect()
    }

    async fn insert_cached_table(&self, table: &CachedTableDescriptor) -> Result<(), RegistryError> {
        table.validate()?;
        let conn = self.get_conn().await?;
        conn.execute(
            &format!(
                "INSERT INTO tablecache_cached_tables ({}) VALUES ($1, $2, $3, $4, $5, $6, $7)",
                CACHED_TABLE_COLUMNS
            ),
            &[
                &table.cached_table_id,
                &table.table_name,
                &table.field_list,
                &table.refresh_interval.to_text(),
                &table.connection_id,
                &table.is_active,
                &table.primary_key,
            ],
        )
        .await
        .map_err(|e| {
            if e.code() == Some(&SqlState::FOREIGN_KEY_VIOLATION) {
                RegistryError::NotFound {
                    entity: CONNECTION,
                    id: table.connection_id,
                }
            } else {
                conflict_or_backend(CACHED_TABLE, e)
            }
        })?;
        Ok(())
    }

    async fn update_cached_table(
        &self,
        id: EntityId,
        update: CachedTableUpdate,
    ) -> Result<CachedTableDescriptor, RegistryError> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await.map_err(backend)?;

        let row = tx
            .query_opt(
                &format!(
                    "SELECT {} FROM tablecache_cached_tables WHERE cached_table_id = $1 FOR UPDATE",
                    CACHED_TABLE_COLUMNS
                ),
                &[&id],
            )
            .await
            .map_err(backend)?
            .ok_or(RegistryError::NotFound { entity: CACHED_TABLE, id })?;

        let mut updated = cached_table_from_row(&row)?;
        update.apply(&mut updated)?;
        tx.execute(
            "UPDATE tablecache_cached_tables SET table_name = $2, field_list = $3, \
             refresh_interval = $4, is_active = $5, primary_key = $6 WHERE cached_table_id = $1",
            &[
                &id,
                &updated.table_name,
                &updated.field_list,
                &updated.refresh_interval.to_text(),
                &updated.is_active,
                &updated.primary_key,
            ],
        )
        .await
        .map_err(backend)?;
        tx.commit().await.map_err(backend)?;
        Ok(updated)
    }

    async fn delete_cached_table(&self, id: EntityId) -> Result<(), RegistryError> {
        let conn = self.get_conn().await?;
        let deleted = conn
            .execute(
                "DELETE FROM tablecache_cached_tables WHERE cached_table_id = $1",
                &[&id],
            )
            .await
            .map_err(backend)?;
        if deleted == 0 {
            return Err(RegistryError::NotFound { entity: CACHED_TABLE, id });
        }
        Ok(())
    }
}
