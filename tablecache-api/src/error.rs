//! Error Types for the Tablecache API
//!
//! This module defines error handling for the API layer, including:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - IntoResponse implementation for Axum HTTP responses
//!
//! Engine errors are folded in through `From<TablecacheError>`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tablecache_core::{
    ConfigError, DialectError, IntrospectionError, KeyError, RefreshError, RegistryError,
    TablecacheError, ValidationError,
};

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Each error code maps to a specific HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    ValidationFailed,
    InvalidInput,
    MissingField,
    InvalidFormat,
    /// Dialect unknown, or lacking the requested capability
    UnsupportedDialect,
    InvalidCacheKey,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    EntityNotFound,
    ConnectionNotFound,
    CachedTableNotFound,
    /// The table does not exist on the live database
    TableNotFound,

    // ========================================================================
    // Conflict Errors (409)
    // ========================================================================
    EntityAlreadyExists,
    /// Tracked primary key is gone from the live table
    SchemaDrift,
    StateConflict,

    // ========================================================================
    // Server Errors (500, 502, 503)
    // ========================================================================
    InternalError,
    DatabaseError,
    /// The registered external database failed or could not be reached
    UpstreamFailed,
    CacheUnavailable,
    ServiceUnavailable,
    ConnectionPoolExhausted,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationFailed
            | ErrorCode::InvalidInput
            | ErrorCode::MissingField
            | ErrorCode::InvalidFormat
            | ErrorCode::UnsupportedDialect
            | ErrorCode::InvalidCacheKey => StatusCode::BAD_REQUEST,

            ErrorCode::EntityNotFound
            | ErrorCode::ConnectionNotFound
            | ErrorCode::CachedTableNotFound
            | ErrorCode::TableNotFound => StatusCode::NOT_FOUND,

            ErrorCode::EntityAlreadyExists | ErrorCode::SchemaDrift | ErrorCode::StateConflict => {
                StatusCode::CONFLICT
            }

            ErrorCode::UpstreamFailed => StatusCode::BAD_GATEWAY,

            ErrorCode::CacheUnavailable
            | ErrorCode::ServiceUnavailable
            | ErrorCode::ConnectionPoolExhausted => StatusCode::SERVICE_UNAVAILABLE,

            ErrorCode::InternalError | ErrorCode::DatabaseError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::ValidationFailed => "Request validation failed",
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::MissingField => "Required field is missing",
            ErrorCode::InvalidFormat => "Invalid format",
            ErrorCode::UnsupportedDialect => "Unsupported dialect",
            ErrorCode::InvalidCacheKey => "Invalid cache key input",

            ErrorCode::EntityNotFound => "Entity not found",
            ErrorCode::ConnectionNotFound => "Connection not found",
            ErrorCode::CachedTableNotFound => "Cached table not found",
            ErrorCode::TableNotFound => "Table not found on the target database",

            ErrorCode::EntityAlreadyExists => "Entity already exists",
            ErrorCode::SchemaDrift => "Live table no longer matches the cached table definition",
            ErrorCode::StateConflict => "Operation conflicts with current state",

            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database operation failed",
            ErrorCode::UpstreamFailed => "Target database operation failed",
            ErrorCode::CacheUnavailable => "Cache store unavailable",
            ErrorCode::ServiceUnavailable => "Service temporarily unavailable",
            ErrorCode::ConnectionPoolExhausted => "Connection pool exhausted",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.default_message().to_string(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingField,
            format!("Required field '{}' is missing", field),
        )
    }

    pub fn invalid_format(field: &str, expected: &str) -> Self {
        Self::new(
            ErrorCode::InvalidFormat,
            format!("Field '{}' has invalid format, expected {}", field, expected),
        )
    }

    pub fn entity_not_found(entity_type: &str, id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::EntityNotFound,
            format!("{} with id {} not found", entity_type, id),
        )
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::EntityNotFound, message)
    }

    pub fn connection_not_found(connection_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::ConnectionNotFound,
            format!("Connection {} not found", connection_id),
        )
    }

    pub fn cached_table_not_found(cached_table_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::CachedTableNotFound,
            format!("Cached table {} not found", cached_table_id),
        )
    }

    pub fn state_conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StateConflict, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    pub fn cache_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::CacheUnavailable, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }

    pub fn connection_pool_exhausted() -> Self {
        Self::from_code(ErrorCode::ConnectionPoolExhausted)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self);
        (status, body).into_response()
    }
}

// ============================================================================
// CONVERSIONS FROM ENGINE ERRORS
// ============================================================================

impl From<DialectError> for ApiError {
    fn from(err: DialectError) -> Self {
        ApiError::new(ErrorCode::UnsupportedDialect, err.to_string())
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        match &err {
            ValidationError::RequiredFieldMissing { field } => ApiError::missing_field(field),
            ValidationError::InvalidValue { field, .. } => {
                ApiError::validation_failed(err.to_string())
                    .with_details(serde_json::json!({ "field": field }))
            }
        }
    }
}

impl From<KeyError> for ApiError {
    fn from(err: KeyError) -> Self {
        ApiError::new(ErrorCode::InvalidCacheKey, err.to_string())
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::new(ErrorCode::InvalidInput, err.to_string())
    }
}

impl From<IntrospectionError> for ApiError {
    fn from(err: IntrospectionError) -> Self {
        let operation = err.operation();
        match err {
            IntrospectionError::Dialect(inner) => inner.into(),
            IntrospectionError::TableNotFound { ref table } => {
                ApiError::new(ErrorCode::TableNotFound, err.to_string())
                    .with_details(serde_json::json!({ "table": table }))
            }
            other => {
                tracing::warn!(error = %other, "introspection failed");
                ApiError::new(ErrorCode::UpstreamFailed, other.to_string())
                    .with_details(serde_json::json!({ "operation": operation }))
            }
        }
    }
}

impl From<RefreshError> for ApiError {
    fn from(err: RefreshError) -> Self {
        match err {
            RefreshError::SchemaDrift {
                ref table,
                ref primary_key,
                ref live_columns,
            } => ApiError::new(ErrorCode::SchemaDrift, err.to_string()).with_details(
                serde_json::json!({
                    "table": table,
                    "primary_key": primary_key,
                    "live_columns": live_columns,
                }),
            ),
            RefreshError::SnapshotFailed { .. } => {
                ApiError::new(ErrorCode::UpstreamFailed, err.to_string())
            }
            RefreshError::CacheWriteFailed { .. } => {
                ApiError::new(ErrorCode::CacheUnavailable, err.to_string())
            }
            RefreshError::ConnectionNotFound { connection_id, .. } => {
                ApiError::connection_not_found(connection_id)
            }
            RefreshError::Introspection(inner) => inner.into(),
            RefreshError::Key(inner) => inner.into(),
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound { entity: "Connection", id } => {
                ApiError::connection_not_found(id)
            }
            RegistryError::NotFound { entity: "CachedTable", id } => {
                ApiError::cached_table_not_found(id)
            }
            RegistryError::NotFound { entity, id } => ApiError::entity_not_found(entity, id),
            RegistryError::Conflict { .. } => {
                ApiError::new(ErrorCode::EntityAlreadyExists, err.to_string())
            }
            RegistryError::Backend { reason } => {
                tracing::error!(reason = %reason, "registry backend error");
                ApiError::database_error("Registry operation failed")
            }
            RegistryError::Invalid(inner) => inner.into(),
        }
    }
}

impl From<TablecacheError> for ApiError {
    fn from(err: TablecacheError) -> Self {
        match err {
            TablecacheError::Dialect(e) => e.into(),
            TablecacheError::Introspection(e) => e.into(),
            TablecacheError::Key(e) => e.into(),
            TablecacheError::Refresh(e) => e.into(),
            TablecacheError::Validation(e) => e.into(),
            TablecacheError::Config(e) => e.into(),
            TablecacheError::Registry(e) => e.into(),
        }
    }
}

// ============================================================================
// CONVERSIONS FROM STANDARD ERRORS
// ============================================================================

/// Convert from tokio_postgres::Error to ApiError.
impl From<tokio_postgres::Error> for ApiError {
    fn from(err: tokio_postgres::Error) -> Self {
        // Log the full error for debugging
        tracing::error!("Database error: {:?}", err);

        // Return a generic database error to avoid leaking internal details
        ApiError::database_error("Database operation failed")
    }
}

/// Convert from deadpool_postgres::PoolError to ApiError.
impl From<deadpool_postgres::PoolError> for ApiError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        tracing::error!("Connection pool error: {:?}", err);

        match err {
            deadpool_postgres::PoolError::Timeout(_) => ApiError::connection_pool_exhausted(),
            deadpool_postgres::PoolError::Closed => {
                ApiError::service_unavailable("Database connection pool is closed")
            }
            _ => ApiError::database_error("Failed to acquire database connection"),
        }
    }
}

/// Convert from serde_json::Error to ApiError.
impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::invalid_input(format!("Invalid JSON: {}", err))
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
