//! PostgreSQL [`RelationalStore`] on `tokio-postgres`.
//!
//! Catalog calls go through `information_schema`, scoped to
//! `current_schema()` unless the table name is schema-qualified. Row values
//! are converted to JSON by column type. Columns of any other type (numeric,
//! interval, bytea, arrays...) are re-projected as `::text` before reading, so
//! no value is silently dropped.
//!
//! Descriptors with `ssl_enabled` connect over rustls with `sslmode=require`;
//! the rest connect in plain text.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use tablecache_core::{ColumnDescriptor, ConnectionDescriptor, Dialect, DialectError};
use tokio_postgres::config::SslMode;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, Config, NoTls};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::introspect::{RelationalStore, RowSet, Statement, StoreError, StoreHandle};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const REFLECT_SQL: &str = "SELECT column_name::text, data_type::text, is_nullable::text, column_default::text \
     FROM information_schema.columns \
     WHERE table_schema = COALESCE($1::text, current_schema()::text) AND table_name = $2::text \
     ORDER BY ordinal_position";

const SCHEMAS_SQL: &str = "SELECT schema_name::text FROM information_schema.schemata \
     WHERE schema_name NOT IN ('pg_catalog', 'information_schema') \
     AND schema_name NOT LIKE 'pg_toast%' AND schema_name NOT LIKE 'pg_temp%' \
     ORDER BY schema_name";

const TABLES_SQL: &str = "SELECT table_name::text FROM information_schema.tables \
     WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
     ORDER BY table_name";

/// An open PostgreSQL session.
pub struct PgHandle {
    client: Client,
}

impl std::fmt::Debug for PgHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgHandle")
            .field("closed", &self.client.is_closed())
            .finish()
    }
}

impl StoreHandle for PgHandle {
    fn dialect(&self) -> Dialect {
        Dialect::Postgresql
    }
}

/// Opens one `tokio_postgres::Client` per handle.
#[derive(Debug, Clone, Default)]
pub struct PgRelationalStore;

impl PgRelationalStore {
    pub fn new() -> Self {
        Self
    }
}

/// How a handle reaches its server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportSecurity {
    Plain,
    Tls,
}

impl TransportSecurity {
    pub fn for_descriptor(descriptor: &ConnectionDescriptor) -> Self {
        if descriptor.ssl_enabled {
            TransportSecurity::Tls
        } else {
            TransportSecurity::Plain
        }
    }

    fn ssl_mode(self) -> SslMode {
        match self {
            TransportSecurity::Plain => SslMode::Disable,
            TransportSecurity::Tls => SslMode::Require,
        }
    }
}

/// rustls connector trusting the Mozilla root set.
fn tls_connector() -> Result<MakeRustlsConnect, StoreError> {
    let roots = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| StoreError::Connect(format!("tls setup failed: {}", e)))?
    .with_root_certificates(roots)
    .with_no_client_auth();
    Ok(MakeRustlsConnect::new(config))
}

fn pg_config(descriptor: &ConnectionDescriptor, security: TransportSecurity) -> Config {
    let mut config = Config::new();
    config
        .host(&descriptor.host)
        .port(descriptor.port)
        .user(&descriptor.user)
        .password(&descriptor.secret)
        .connect_timeout(CONNECT_TIMEOUT)
        .application_name("tablecache")
        .ssl_mode(security.ssl_mode());
    if let Some(database) = &descriptor.database {
        config.dbname(database);
    }
    config
}

/// Drive the connection half until the server hangs up.
fn spawn_connection<F>(connection: F, target: String)
where
    F: Future<Output = Result<(), tokio_postgres::Error>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            warn!(target_db = %target, error = %e, "postgres connection closed with error");
        }
    });
}

fn query_error(e: tokio_postgres::Error) -> StoreError {
    StoreError::Query(e.to_string())
}

fn split_qualified(table: &str) -> (Option<&str>, &str) {
    match table.split_once('.') {
        Some((schema, name)) => (Some(schema), name),
        None => (None, table),
    }
}

fn bind_param(value: &Value) -> Box<dyn ToSql + Sync + Send> {
    match value {
        Value::Null => Box::new(Option::<String>::None),
        Value::Bool(b) => Box::new(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Box::new(i),
            None => Box::new(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => Box::new(s.clone()),
        other => Box::new(other.clone()),
    }
}

/// Types `column_value` reads without a text cast.
fn decodes_natively(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::BOOL
            | Type::INT2
            | Type::INT4
            | Type::INT8
            | Type::OID
            | Type::FLOAT4
            | Type::FLOAT8
            | Type::JSON
            | Type::JSONB
            | Type::UUID
            | Type::TIMESTAMPTZ
            | Type::TIMESTAMP
            | Type::DATE
            | Type::TEXT
            | Type::VARCHAR
            | Type::BPCHAR
            | Type::NAME
            | Type::UNKNOWN
    )
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Wrap `sql` so every column without a native decoder comes back as text.
/// `None` when every column already decodes.
fn text_projection(sql: &str, columns: &[(&str, &Type)]) -> Option<String> {
    if columns.iter().all(|(_, ty)| decodes_natively(ty)) {
        return None;
    }
    let projection = columns
        .iter()
        .map(|(name, ty)| {
            let quoted = quote_ident(name);
            if decodes_natively(ty) {
                quoted
            } else {
                format!("{0}::text AS {0}", quoted)
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    let inner = sql.trim_end().trim_end_matches(';');
    Some(format!("SELECT {} FROM ({}) AS tablecache_rows", projection, inner))
}

fn column_value(row: &tokio_postgres::Row, idx: usize, ty: &Type) -> Result<Value, tokio_postgres::Error> {
    let value = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.map(Value::from),
        Type::INT2 => row.try_get::<_, Option<i16>>(idx)?.map(Value::from),
        Type::INT4 => row.try_get::<_, Option<i32>>(idx)?.map(Value::from),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.map(Value::from),
        Type::OID => row.try_get::<_, Option<u32>>(idx)?.map(Value::from),
        Type::FLOAT4 => row.try_get::<_, Option<f32>>(idx)?.map(|f| Value::from(f64::from(f))),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.map(Value::from),
        Type::JSON | Type::JSONB => row.try_get::<_, Option<Value>>(idx)?,
        Type::UUID => row
            .try_get::<_, Option<Uuid>>(idx)?
            .map(|u| Value::String(u.to_string())),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(|t| Value::String(t.to_rfc3339())),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(|t| Value::String(t.to_string())),
        Type::DATE => row
            .try_get::<_, Option<NaiveDate>>(idx)?
            .map(|d| Value::String(d.to_string())),
        _ => row.try_get::<_, Option<String>>(idx)?.map(Value::String),
    };
    Ok(value.unwrap_or(Value::Null))
}

#[async_trait]
impl RelationalStore for PgRelationalStore {
    type Handle = PgHandle;

    async fn open_connection(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Self::Handle, StoreError> {
        if descriptor.dialect != Dialect::Postgresql {
            return Err(DialectError::unsupported(descriptor.dialect, "postgres relational store").into());
        }
        let security = TransportSecurity::for_descriptor(descriptor);
        let config = pg_config(descriptor, security);
        let target = descriptor.target();

        let client = match security {
            TransportSecurity::Plain => {
                let (client, connection) = config
                    .connect(NoTls)
                    .await
                    .map_err(|e| StoreError::Connect(e.to_string()))?;
                spawn_connection(connection, target);
                client
            }
            TransportSecurity::Tls => {
                let (client, connection) = config
                    .connect(tls_connector()?)
                    .await
                    .map_err(|e| StoreError::Connect(e.to_string()))?;
                spawn_connection(connection, target);
                client
            }
        };

        debug!(target_db = %descriptor.target(), ?security, "postgres connection opened");
        Ok(PgHandle { client })
    }

    async fn execute(
        &self,
        handle: &Self::Handle,
        statement: &Statement,
    ) -> Result<RowSet, StoreError> {
        let mut prepared = handle
            .client
            .prepare(&statement.sql)
            .await
            .map_err(query_error)?;
        let described: Vec<(&str, &Type)> = prepared
            .columns()
            .iter()
            .map(|c| (c.name(), c.type_()))
            .collect();
        if let Some(sql) = text_projection(&statement.sql, &described) {
            debug!("re-projecting columns without a native decoder as text");
            prepared = handle.client.prepare(&sql).await.map_err(query_error)?;
        }

        let params: Vec<Box<dyn ToSql + Sync + Send>> = statement.params.iter().map(bind_param).collect();
        let param_refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let rows = handle
            .client
            .query(&prepared, &param_refs)
            .await
            .map_err(query_error)?;

        let columns: Vec<String> = prepared.columns().iter().map(|c| c.name().to_string()).collect();
        let types: Vec<Type> = prepared.columns().iter().map(|c| c.type_().clone()).collect();

        let rows = rows
            .iter()
            .map(|row| {
                types
                    .iter()
                    .enumerate()
                    .map(|(idx, ty)| column_value(row, idx, ty))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(query_error)?;

        Ok(RowSet::new(columns, rows))
    }

    async fn reflect_table(
        &self,
        handle: &Self::Handle,
        table: &str,
    ) -> Result<Option<Vec<ColumnDescriptor>>, StoreError> {
        let (schema, name) = split_qualified(table);
        let rows = handle
            .client
            .query(REFLECT_SQL, &[&schema, &name])
            .await
            .map_err(query_error)?;

        if rows.is_empty() {
            return Ok(None);
        }

        let columns = rows
            .iter()
            .map(|row| {
                let name: String = row.try_get(0)?;
                let data_type: String = row.try_get(1)?;
                let nullable: String = row.try_get(2)?;
                let default: Option<String> = row.try_get(3)?;
                let column = ColumnDescriptor::new(name, data_type, nullable == "YES");
                Ok(match default {
                    Some(default) => column.with_default(default),
                    None => column,
                })
            })
            .collect::<Result<Vec<_>, tokio_postgres::Error>>()
            .map_err(query_error)?;
        Ok(Some(columns))
    }

    async fn list_schema_names(&self, handle: &Self::Handle) -> Result<Vec<String>, StoreError> {
        let rows = handle.client.query(SCHEMAS_SQL, &[]).await.map_err(query_error)?;
        rows.iter()
            .map(|row| row.try_get::<_, String>(0))
            .collect::<Result<Vec<_>, _>>()
            .map_err(query_error)
    }

    async fn list_table_names(&self, handle: &Self::Handle) -> Result<Vec<String>, StoreError> {
        let rows = handle.client.query(TABLES_SQL, &[]).await.map_err(query_error)?;
        rows.iter()
            .map(|row| row.try_get::<_, String>(0))
            .collect::<Result<Vec<_>, _>>()
            .map_err(query_error)
    }
}
