//! Error types for tablecache operations

use crate::{Dialect, EntityId};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Dialect resolution errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DialectError {
    #[error("Unsupported dialect '{dialect}' ({context})")]
    Unsupported { dialect: String, context: String },
}

impl DialectError {
    /// Build an `Unsupported` error for a known dialect that lacks a capability.
    pub fn unsupported(dialect: Dialect, context: impl Into<String>) -> Self {
        DialectError::Unsupported {
            dialect: dialect.to_string(),
            context: context.into(),
        }
    }
}

/// The introspection call that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntrospectionOp {
    OpenConnection,
    ListDatabases,
    ListSchemas,
    ListTables,
    ListColumns,
}

impl fmt::Display for IntrospectionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            IntrospectionOp::OpenConnection => "open_connection",
            IntrospectionOp::ListDatabases => "list_databases",
            IntrospectionOp::ListSchemas => "list_schemas",
            IntrospectionOp::ListTables => "list_tables",
            IntrospectionOp::ListColumns => "list_columns",
        };
        f.write_str(value)
    }
}

/// Schema discovery errors. Always carry the failing call and the root cause.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IntrospectionError {
    #[error("{operation} failed: could not connect to {dialect} at {target}: {reason}")]
    Connection {
        operation: IntrospectionOp,
        dialect: Dialect,
        target: String,
        reason: String,
    },

    #[error("{operation} failed on {dialect}: {reason}")]
    QueryFailed {
        operation: IntrospectionOp,
        dialect: Dialect,
        reason: String,
    },

    #[error("{operation} failed for table {table}: {reason}")]
    TableQueryFailed {
        operation: IntrospectionOp,
        table: String,
        reason: String,
    },

    #[error("list_columns failed: table {table} does not exist")]
    TableNotFound { table: String },

    #[error("{operation} failed: result column {index} out of range for {width}-column row")]
    ColumnIndexOutOfRange {
        operation: IntrospectionOp,
        index: usize,
        width: usize,
    },

    #[error(transparent)]
    Dialect(#[from] DialectError),
}

impl IntrospectionError {
    /// The call that failed, when known.
    pub fn operation(&self) -> Option<IntrospectionOp> {
        match self {
            IntrospectionError::Connection { operation, .. }
            | IntrospectionError::QueryFailed { operation, .. }
            | IntrospectionError::TableQueryFailed { operation, .. }
            | IntrospectionError::ColumnIndexOutOfRange { operation, .. } => Some(*operation),
            IntrospectionError::TableNotFound { .. } => Some(IntrospectionOp::ListColumns),
            IntrospectionError::Dialect(_) => None,
        }
    }
}

/// Cache key construction errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("Invalid cache key input for {field}: {reason}")]
    InvalidInput { field: String, reason: String },
}

/// Table refresh errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RefreshError {
    #[error("Schema drift on {table}: primary key '{primary_key}' not in live columns {live_columns:?}")]
    SchemaDrift {
        table: String,
        primary_key: String,
        live_columns: Vec<String>,
    },

    #[error("Snapshot fetch failed for {table}: {reason}")]
    SnapshotFailed { table: String, reason: String },

    #[error("Cache write failed for key {key}")]
    CacheWriteFailed { key: String },

    #[error("Connection {connection_id} referenced by {table} is not registered")]
    ConnectionNotFound { connection_id: EntityId, table: String },

    #[error(transparent)]
    Introspection(#[from] IntrospectionError),

    #[error(transparent)]
    Key(#[from] KeyError),
}

/// Descriptor validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Registry (persisted descriptor records) errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: EntityId },

    #[error("{entity} conflict: {reason}")]
    Conflict { entity: &'static str, reason: String },

    #[error("Registry backend error: {reason}")]
    Backend { reason: String },

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Master error type for all tablecache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TablecacheError {
    #[error("Dialect error: {0}")]
    Dialect(#[from] DialectError),

    #[error("Introspection error: {0}")]
    Introspection(#[from] IntrospectionError),

    #[error("Key error: {0}")]
    Key(#[from] KeyError),

    #[error("Refresh error: {0}")]
    Refresh(#[from] RefreshError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// Result type alias for tablecache operations.
pub type TablecacheResult<T> = Result<T, TablecacheError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_unsupported_dialect_display() {
        let err = DialectError::unsupported(Dialect::Oracle, "connection string");
        let msg = format!("{}", err);
        assert!(msg.contains("oracle"));
        assert!(msg.contains("connection string"));
    }

    #[test]
    fn test_introspection_error_names_operation() {
        let err = IntrospectionError::QueryFailed {
            operation: IntrospectionOp::ListDatabases,
            dialect: Dialect::Mysql,
            reason: "access denied".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("list_databases"));
        assert!(msg.contains("mysql"));
        assert!(msg.contains("access denied"));
        assert_eq!(err.operation(), Some(IntrospectionOp::ListDatabases));
    }

    #[test]
    fn test_table_not_found_is_list_columns() {
        let err = IntrospectionError::TableNotFound {
            table: "ghost".to_string(),
        };
        assert_eq!(err.operation(), Some(IntrospectionOp::ListColumns));
        assert!(format!("{}", err).contains("ghost"));
    }

    #[test]
    fn test_schema_drift_display() {
        let err = RefreshError::SchemaDrift {
            table: "orders".to_string(),
            primary_key: "order_id".to_string(),
            live_columns: vec!["id".to_string(), "total".to_string()],
        };
        let msg = format!("{}", err);
        assert!(msg.contains("orders"));
        assert!(msg.contains("order_id"));
        assert!(msg.contains("total"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "key_prefix".to_string(),
            value: "a:b".to_string(),
            reason: "must not contain ':'".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("key_prefix"));
        assert!(msg.contains("a:b"));
    }

    #[test]
    fn test_registry_not_found_display() {
        let err = RegistryError::NotFound {
            entity: "Connection",
            id: Uuid::nil(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Connection"));
        assert!(msg.contains("00000000-0000-0000-0000-000000000000"));
    }

    #[test]
    fn test_registry_wraps_validation() {
        let err = RegistryError::from(ValidationError::RequiredFieldMissing {
            field: "host".to_string(),
        });
        assert!(matches!(err, RegistryError::Invalid(_)));
        assert!(err.to_string().contains("host"));
    }

    #[test]
    fn test_tablecache_error_from_variants() {
        let dialect = TablecacheError::from(DialectError::unsupported(Dialect::Oracle, "x"));
        assert!(matches!(dialect, TablecacheError::Dialect(_)));

        let key = TablecacheError::from(KeyError::InvalidInput {
            field: "table_name".to_string(),
            reason: "blank".to_string(),
        });
        assert!(matches!(key, TablecacheError::Key(_)));

        let refresh = TablecacheError::from(RefreshError::CacheWriteFailed {
            key: "cache:orders".to_string(),
        });
        assert!(matches!(refresh, TablecacheError::Refresh(_)));

        let validation = TablecacheError::from(ValidationError::RequiredFieldMissing {
            field: "host".to_string(),
        });
        assert!(matches!(validation, TablecacheError::Validation(_)));

        let config = TablecacheError::from(ConfigError::MissingRequired {
            field: "url".to_string(),
        });
        assert!(matches!(config, TablecacheError::Config(_)));
    }

    #[test]
    fn test_refresh_error_wraps_introspection() {
        let inner = IntrospectionError::TableNotFound {
            table: "orders".to_string(),
        };
        let err = RefreshError::from(inner.clone());
        assert_eq!(err, RefreshError::Introspection(inner));
    }
}
