//! Request and response types for the REST surface.

use serde::{Deserialize, Serialize};
use tablecache_core::{
    CachedTableDescriptor, ConnectionDescriptor, Dialect, EntityId, RefreshInterval,
};
use tablecache_storage::{
    CachedTableUpdate, ConnectionUpdate, DialectCatalog, KeyTtl, RefreshMode, RefreshOutcome,
    TableRefreshResult,
};

use crate::error::{ApiError, ApiResult};

// ============================================================================
// RESPONSE ENVELOPE
// ============================================================================

/// Wrapper for successful payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self::with_status(200, data)
    }

    pub fn created(data: T) -> Self {
        Self::with_status(201, data)
    }

    pub fn with_status(status_code: u16, data: T) -> Self {
        Self {
            success: true,
            status_code,
            data: Some(data),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

// ============================================================================
// CONNECTION TYPES
// ============================================================================

/// Request to register a connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateConnectionRequest {
    pub name: String,
    #[serde(default)]
    pub host: Option<String>,
    /// Defaults to the dialect's well-known port.
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default, alias = "username")]
    pub user: Option<String>,
    #[serde(default, alias = "secret")]
    pub password: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub ssl_enabled: bool,
    #[serde(alias = "sql_engine")]
    pub dialect: String,
}

impl CreateConnectionRequest {
    /// Resolve the dialect and build a validated descriptor with a fresh id.
    pub fn into_descriptor(self) -> ApiResult<ConnectionDescriptor> {
        let (dialect, _) = DialectCatalog::lookup_name(&self.dialect)?;
        let port = self
            .port
            .or_else(|| DialectCatalog::default_port(dialect))
            .unwrap_or(0);

        let descriptor = ConnectionDescriptor {
            connection_id: tablecache_core::new_entity_id(),
            name: self.name,
            host: self.host.unwrap_or_default(),
            port,
            user: self.user.unwrap_or_default(),
            secret: self.password.unwrap_or_default(),
            database: self.database.filter(|d| !d.trim().is_empty()),
            ssl_enabled: self.ssl_enabled,
            dialect,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }
}

/// Partial update of a connection. An empty `database` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateConnectionRequest {
    pub name: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    #[serde(alias = "username")]
    pub user: Option<String>,
    #[serde(alias = "secret")]
    pub password: Option<String>,
    pub database: Option<String>,
    pub ssl_enabled: Option<bool>,
    #[serde(alias = "sql_engine")]
    pub dialect: Option<String>,
}

impl UpdateConnectionRequest {
    pub fn into_update(self) -> ApiResult<ConnectionUpdate> {
        let dialect = match self.dialect {
            Some(name) => Some(name.parse::<Dialect>()?),
            None => None,
        };
        Ok(ConnectionUpdate {
            name: self.name,
            host: self.host,
            port: self.port,
            user: self.user,
            secret: self.password,
            database: self
                .database
                .map(|d| if d.trim().is_empty() { None } else { Some(d) }),
            ssl_enabled: self.ssl_enabled,
            dialect,
        })
    }
}

/// A registered connection as returned over HTTP. Never carries the secret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionResponse {
    pub connection_id: EntityId,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub database: Option<String>,
    pub ssl_enabled: bool,
    pub dialect: Dialect,
    pub target: String,
}

impl From<ConnectionDescriptor> for ConnectionResponse {
    fn from(descriptor: ConnectionDescriptor) -> Self {
        let target = descriptor.target();
        Self {
            connection_id: descriptor.connection_id,
            name: descriptor.name,
            host: descriptor.host,
            port: descriptor.port,
            user: descriptor.user,
            database: descriptor.database,
            ssl_enabled: descriptor.ssl_enabled,
            dialect: descriptor.dialect,
            target,
        }
    }
}

/// Result of deleting a registry record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub id: EntityId,
    /// Cache entries dropped along with the record.
    pub invalidated_keys: u64,
}

// ============================================================================
// CACHED TABLE TYPES
// ============================================================================

/// Request to start mirroring a table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCachedTableRequest {
    pub table_name: String,
    #[serde(default)]
    pub field_list: Vec<String>,
    /// Seconds or `"15m"` style text. Absent means no expiration.
    #[serde(default, alias = "interval")]
    pub refresh_interval: Option<RefreshInterval>,
    pub connection_id: EntityId,
    #[serde(default)]
    pub is_active: bool,
    pub primary_key: String,
}

impl CreateCachedTableRequest {
    pub fn into_descriptor(self) -> ApiResult<CachedTableDescriptor> {
        let descriptor = CachedTableDescriptor {
            cached_table_id: tablecache_core::new_entity_id(),
            table_name: self.table_name,
            field_list: self.field_list,
            refresh_interval: self.refresh_interval.unwrap_or(RefreshInterval::NEVER),
            connection_id: self.connection_id,
            is_active: self.is_active,
            primary_key: self.primary_key,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCachedTableRequest {
    pub table_name: Option<String>,
    pub field_list: Option<Vec<String>>,
    #[serde(alias = "interval")]
    pub refresh_interval: Option<RefreshInterval>,
    pub is_active: Option<bool>,
    pub primary_key: Option<String>,
}

impl From<UpdateCachedTableRequest> for CachedTableUpdate {
    fn from(req: UpdateCachedTableRequest) -> Self {
        CachedTableUpdate {
            table_name: req.table_name,
            field_list: req.field_list,
            refresh_interval: req.refresh_interval,
            is_active: req.is_active,
            primary_key: req.primary_key,
        }
    }
}

/// A cached table together with the key its snapshot lives under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedTableResponse {
    #[serde(flatten)]
    pub table: CachedTableDescriptor,
    pub cache_key: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ListCachedTablesQuery {
    pub connection_id: Option<EntityId>,
}

// ============================================================================
// REFRESH TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RefreshQuery {
    #[serde(default)]
    pub force: bool,
}

impl RefreshQuery {
    pub fn mode(&self) -> RefreshMode {
        if self.force {
            RefreshMode::Force
        } else {
            RefreshMode::IfStale
        }
    }
}

/// One table's result in a connection-wide refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRefreshItem {
    pub cached_table_id: EntityId,
    pub table_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<RefreshOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl From<TableRefreshResult> for TableRefreshItem {
    fn from(result: TableRefreshResult) -> Self {
        let (outcome, error) = match result.result {
            Ok(outcome) => (Some(outcome), None),
            Err(e) => (None, Some(ApiError::from(e))),
        };
        Self {
            cached_table_id: result.cached_table_id,
            table_name: result.table_name,
            outcome,
            error,
        }
    }
}

// ============================================================================
// CACHE ADMIN TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternQuery {
    pub pattern: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FlushQuery {
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyTtlResponse {
    pub key: String,
    /// Seconds, `-1` for no expiry, `-2` for absent.
    pub ttl: i64,
    pub state: KeyTtl,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearPatternResponse {
    pub pattern: String,
    pub deleted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablecache_core::ValidationError;

    fn create_request(dialect: &str) -> CreateConnectionRequest {
        CreateConnectionRequest {
            name: "warehouse".to_string(),
            host: Some("db.internal".to_string()),
            port: None,
            user: Some("reader".to_string()),
            password: Some("pw".to_string()),
            database: Some("sales".to_string()),
            ssl_enabled: false,
            dialect: dialect.to_string(),
        }
    }

    #[test]
    fn test_create_connection_defaults_port() -> ApiResult<()> {
        let descriptor = create_request("mysql").into_descriptor()?;
        assert_eq!(descriptor.dialect, Dialect::Mysql);
        assert_eq!(descriptor.port, 3306);
        assert_eq!(descriptor.secret, "pw");
        Ok(())
    }

    #[test]
    fn test_create_connection_unknown_dialect() {
        let err = create_request("db2").into_descriptor().unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::UnsupportedDialect);
    }

    #[test]
    fn test_create_connection_accepts_original_field_names() -> Result<(), serde_json::Error> {
        let req: CreateConnectionRequest = serde_json::from_value(serde_json::json!({
            "name": "legacy",
            "host": "h",
            "port": 5432,
            "user": "u",
            "password": "p",
            "database": "d",
            "sql_engine": "postgresql"
        }))?;
        assert_eq!(req.dialect, "postgresql");
        assert!(!req.ssl_enabled);
        Ok(())
    }

    #[test]
    fn test_update_blank_database_clears() -> ApiResult<()> {
        let update = UpdateConnectionRequest {
            database: Some(String::new()),
            ..Default::default()
        }
        .into_update()?;
        assert_eq!(update.database, Some(None));
        Ok(())
    }

    #[test]
    fn test_connection_response_has_no_secret() -> ApiResult<()> {
        let response = ConnectionResponse::from(create_request("postgresql").into_descriptor()?);
        let json = serde_json::to_string(&response)?;
        assert!(!json.contains("\"pw\""));
        assert!(!json.contains("secret"));
        assert!(!json.contains("password"));
        Ok(())
    }

    #[test]
    fn test_cached_table_request_parses_interval_text() -> Result<(), serde_json::Error> {
        let req: CreateCachedTableRequest = serde_json::from_value(serde_json::json!({
            "table_name": "orders",
            "interval": "15m",
            "connection_id": tablecache_core::new_entity_id(),
            "primary_key": "id"
        }))?;
        assert_eq!(req.refresh_interval, Some(RefreshInterval::from_secs(900)));
        assert!(req.field_list.is_empty());
        Ok(())
    }

    #[test]
    fn test_cached_table_request_requires_primary_key() {
        let req = CreateCachedTableRequest {
            table_name: "orders".to_string(),
            field_list: vec![],
            refresh_interval: None,
            connection_id: tablecache_core::new_entity_id(),
            is_active: true,
            primary_key: " ".to_string(),
        };
        let err = req.into_descriptor().unwrap_err();
        assert_eq!(
            err,
            ApiError::from(ValidationError::RequiredFieldMissing {
                field: "primary_key".to_string()
            })
        );
    }

    #[test]
    fn test_envelope_shape() -> Result<(), serde_json::Error> {
        let json = serde_json::to_value(ApiResponse::created(vec![1, 2]))?;
        assert_eq!(json["success"], true);
        assert_eq!(json["status_code"], 201);
        assert_eq!(json["data"], serde_json::json!([1, 2]));
        assert!(json.get("message").is_none());
        Ok(())
    }

    #[test]
    fn test_refresh_query_mode() {
        assert_eq!(RefreshQuery { force: true }.mode(), RefreshMode::Force);
        assert_eq!(RefreshQuery::default().mode(), RefreshMode::IfStale);
    }
}
