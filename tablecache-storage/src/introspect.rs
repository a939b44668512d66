//! Runtime schema discovery against a registered relational store.
//!
//! [`RelationalStore`] is the transport seam: it opens handles and runs the
//! few statements the engine needs. [`SchemaIntrospector`] layers the dialect
//! catalog on top and turns every transport failure into an
//! [`IntrospectionError`] naming the call that failed.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tablecache_core::{
    ColumnDescriptor, ConnectionDescriptor, Dialect, DialectError, IntrospectionError,
    IntrospectionOp,
};
use thiserror::Error;
use tracing::debug;

use crate::catalog::DialectCatalog;

// ============================================================================
// TRANSPORT TYPES
// ============================================================================

/// A statement plus its ordered bind parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    /// A statement with no parameters.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// One row converted to a column-name mapping.
pub type Row = serde_json::Map<String, Value>;

/// Positional result of a statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RowSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Convert each positional row into a name -> value mapping.
    pub fn into_mappings(self) -> Vec<Row> {
        let columns = self.columns;
        self.rows
            .into_iter()
            .map(|values| columns.iter().cloned().zip(values).collect())
            .collect()
    }
}

/// Failure reported by a relational store adapter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error(transparent)]
    Dialect(#[from] DialectError),
}

// ============================================================================
// RELATIONAL STORE SEAM
// ============================================================================

/// An open connection handle that knows which dialect it speaks.
pub trait StoreHandle: Send + Sync {
    fn dialect(&self) -> Dialect;
}

/// Transport to an external relational database.
///
/// Implementations issue only catalog and select statements.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    type Handle: StoreHandle;

    /// Open a handle for a registered connection.
    async fn open_connection(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Self::Handle, StoreError>;

    /// Run a statement and return its rows.
    async fn execute(
        &self,
        handle: &Self::Handle,
        statement: &Statement,
    ) -> Result<RowSet, StoreError>;

    /// Reflect one table. `None` when the table does not exist.
    async fn reflect_table(
        &self,
        handle: &Self::Handle,
        table: &str,
    ) -> Result<Option<Vec<ColumnDescriptor>>, StoreError>;

    /// Schema names visible through the handle.
    async fn list_schema_names(&self, handle: &Self::Handle) -> Result<Vec<String>, StoreError>;

    /// Base table names (views excluded).
    async fn list_table_names(&self, handle: &Self::Handle) -> Result<Vec<String>, StoreError>;
}

// ============================================================================
// SCHEMA INTROSPECTOR
// ============================================================================

/// Dialect-aware schema discovery over a [`RelationalStore`].
pub struct SchemaIntrospector<R: RelationalStore> {
    store: Arc<R>,
}

impl<R: RelationalStore> Clone for SchemaIntrospector<R> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<R: RelationalStore> SchemaIntrospector<R> {
    pub fn new(store: Arc<R>) -> Self {
        Self { store }
    }

    /// The underlying store, for data-plane reads.
    pub fn store(&self) -> &Arc<R> {
        &self.store
    }

    /// Open a handle to the connection's target database.
    pub async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<R::Handle, IntrospectionError> {
        debug!(
            dialect = %descriptor.dialect,
            target = %descriptor.target(),
            "opening introspection connection"
        );
        self.store
            .open_connection(descriptor)
            .await
            .map_err(|e| match e {
                StoreError::Dialect(inner) => IntrospectionError::Dialect(inner),
                other => IntrospectionError::Connection {
                    operation: IntrospectionOp::OpenConnection,
                    dialect: descriptor.dialect,
                    target: descriptor.target(),
                    reason: other.to_string(),
                },
            })
    }

    /// List databases using the dialect's catalog statement.
    ///
    /// Either the full list or an error: a row too narrow for the catalog
    /// column, or a null name, fails the whole call.
    pub async fn list_databases(
        &self,
        handle: &R::Handle,
        dialect: Dialect,
    ) -> Result<Vec<String>, IntrospectionError> {
        let op = IntrospectionOp::ListDatabases;
        let entry = DialectCatalog::lookup(dialect);
        let rows = self
            .store
            .execute(handle, &Statement::raw(entry.database_list))
            .await
            .map_err(|e| query_failed(op, dialect, e))?;

        let names = rows
            .rows
            .iter()
            .map(|row| {
                let value = row.get(entry.database_column).ok_or(
                    IntrospectionError::ColumnIndexOutOfRange {
                        operation: op,
                        index: entry.database_column,
                        width: row.len(),
                    },
                )?;
                value_as_name(value).ok_or_else(|| IntrospectionError::QueryFailed {
                    operation: op,
                    dialect,
                    reason: format!("null database name in column {}", entry.database_column),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(%dialect, count = names.len(), "listed databases");
        Ok(names)
    }

    pub async fn list_schemas(&self, handle: &R::Handle) -> Result<Vec<String>, IntrospectionError> {
        let op = IntrospectionOp::ListSchemas;
        let names = self
            .store
            .list_schema_names(handle)
            .await
            .map_err(|e| query_failed(op, handle.dialect(), e))?;
        debug!(dialect = %handle.dialect(), count = names.len(), "listed schemas");
        Ok(names)
    }

    /// Base tables only; views are excluded by the store.
    pub async fn list_tables(&self, handle: &R::Handle) -> Result<Vec<String>, IntrospectionError> {
        let op = IntrospectionOp::ListTables;
        let names = self
            .store
            .list_table_names(handle)
            .await
            .map_err(|e| query_failed(op, handle.dialect(), e))?;
        debug!(dialect = %handle.dialect(), count = names.len(), "listed tables");
        Ok(names)
    }

    /// Reflect a single table's columns.
    ///
    /// A missing table is [`IntrospectionError::TableNotFound`], never an
    /// empty list.
    pub async fn list_columns(
        &self,
        handle: &R::Handle,
        table: &str,
    ) -> Result<Vec<ColumnDescriptor>, IntrospectionError> {
        let columns = self
            .store
            .reflect_table(handle, table)
            .await
            .map_err(|e| match e {
                StoreError::Dialect(inner) => IntrospectionError::Dialect(inner),
                other => IntrospectionError::TableQueryFailed {
                    operation: IntrospectionOp::ListColumns,
                    table: table.to_string(),
                    reason: other.to_string(),
                },
            })?;

        match columns {
            Some(columns) if !columns.is_empty() => {
                debug!(table, count = columns.len(), "reflected table");
                Ok(columns)
            }
            _ => Err(IntrospectionError::TableNotFound {
                table: table.to_string(),
            }),
        }
    }
}

fn query_failed(op: IntrospectionOp, dialect: Dialect, err: StoreError) -> IntrospectionError {
    match err {
        StoreError::Dialect(inner) => IntrospectionError::Dialect(inner),
        other => IntrospectionError::QueryFailed {
            operation: op,
            dialect,
            reason: other.to_string(),
        },
    }
}

fn value_as_name(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
