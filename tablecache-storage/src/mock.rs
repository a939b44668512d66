//! Mock relational and key-value stores for tests.
//!
//! Both mocks are cheap to clone and share their state between clones, so a
//! test can keep one copy to script failures while the engine holds another.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tablecache_core::{ColumnDescriptor, ConnectionDescriptor, Dialect, EntityId};

use crate::cache::memory::MemoryKeyValueStore;
use crate::cache::traits::{KeyValueConnector, KeyValueStore, KvError, ServerInfo};
use crate::introspect::{RelationalStore, RowSet, Statement, StoreError, StoreHandle};

// ============================================================================
// RELATIONAL STORE MOCK
// ============================================================================

/// Handle returned by [`MockRelationalStore::open_connection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockHandle {
    pub connection_id: EntityId,
    dialect: Dialect,
}

impl StoreHandle for MockHandle {
    fn dialect(&self) -> Dialect {
        self.dialect
    }
}

/// A call received by the mock, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Open { connection_id: EntityId },
    Execute(Statement),
    Reflect { table: String },
    ListSchemas,
    ListTables,
}

#[derive(Debug, Default)]
struct RelationalState {
    results: HashMap<String, RowSet>,
    failing_statements: HashMap<String, String>,
    connect_failure: Option<String>,
    catalog_failure: Option<String>,
    schemas: Vec<String>,
    tables: BTreeMap<String, Vec<ColumnDescriptor>>,
    table_rows: HashMap<String, RowSet>,
    calls: Vec<MockCall>,
}

/// Scripted [`RelationalStore`].
///
/// Exact statements can be answered with [`with_result`](Self::with_result).
/// Any other `SELECT cols FROM table` is answered from the rows registered
/// with [`with_rows`](Self::with_rows), projected onto the requested columns.
#[derive(Debug, Clone, Default)]
pub struct MockRelationalStore {
    state: Arc<Mutex<RelationalState>>,
}

impl MockRelationalStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RelationalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answer `sql` with a fixed result.
    pub fn with_result(self, sql: impl Into<String>, rows: RowSet) -> Self {
        self.state().results.insert(sql.into(), rows);
        self
    }

    /// Fail `sql` with a query error.
    pub fn fail_statement(self, sql: impl Into<String>, reason: impl Into<String>) -> Self {
        self.state()
            .failing_statements
            .insert(sql.into(), reason.into());
        self
    }

    /// Refuse every connection attempt.
    pub fn fail_connect(self, reason: impl Into<String>) -> Self {
        self.state().connect_failure = Some(reason.into());
        self
    }

    /// Fail schema listing, table listing and reflection.
    pub fn fail_catalog(self, reason: impl Into<String>) -> Self {
        self.state().catalog_failure = Some(reason.into());
        self
    }

    pub fn with_schemas(self, schemas: Vec<String>) -> Self {
        self.state().schemas = schemas;
        self
    }

    pub fn with_table(self, table: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Self {
        self.set_table(table, columns);
        self
    }

    /// Data served for selects against `table`.
    pub fn with_rows(self, table: impl Into<String>, rows: RowSet) -> Self {
        self.state().table_rows.insert(table.into(), rows);
        self
    }

    /// Replace a table's live columns, e.g. to simulate drift mid-test.
    pub fn set_table(&self, table: impl Into<String>, columns: Vec<ColumnDescriptor>) {
        self.state().tables.insert(table.into(), columns);
    }

    pub fn drop_table(&self, table: &str) {
        let mut state = self.state();
        state.tables.remove(table);
        state.table_rows.remove(table);
    }

    /// Every call received so far.
    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    /// Statements passed to `execute`, in order.
    pub fn executed(&self) -> Vec<Statement> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                MockCall::Execute(statement) => Some(statement.clone()),
                _ => None,
            })
            .collect()
    }

    fn catalog_check(state: &RelationalState) -> Result<(), StoreError> {
        match &state.catalog_failure {
            Some(reason) => Err(StoreError::Query(reason.clone())),
            None => Ok(()),
        }
    }
}

/// Split `SELECT a, b FROM t [WHERE ...]` into its projection and table.
fn parse_select(sql: &str) -> Option<(Vec<String>, String)> {
    let rest = sql.strip_prefix("SELECT ")?;
    let (projection, rest) = rest.split_once(" FROM ")?;
    let table = rest.split(" WHERE ").next()?.trim().to_string();
    let columns = if projection.trim() == "*" {
        Vec::new()
    } else {
        projection.split(',').map(|c| c.trim().to_string()).collect()
    };
    Some((columns, table))
}

fn project(rows: &RowSet, columns: &[String]) -> Result<RowSet, StoreError> {
    if columns.is_empty() {
        return Ok(rows.clone());
    }
    let indexes = columns
        .iter()
        .map(|column| {
            rows.columns
                .iter()
                .position(|c| c == column)
                .ok_or_else(|| StoreError::Query(format!("column \"{}\" does not exist", column)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let projected = rows
        .rows
        .iter()
        .map(|row| {
            indexes
                .iter()
                .map(|&i| row.get(i).cloned().unwrap_or(serde_json::Value::Null))
                .collect()
        })
        .collect();
    Ok(RowSet::new(columns.to_vec(), projected))
}

#[async_trait]
impl RelationalStore for MockRelationalStore {
    type Handle = MockHandle;

    async fn open_connection(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Self::Handle, StoreError> {
        let mut state = self.state();
        state.calls.push(MockCall::Open {
            connection_id: descriptor.connection_id,
        });
        if let Some(reason) = &state.connect_failure {
            return Err(StoreError::Connect(reason.clone()));
        }
        Ok(MockHandle {
            connection_id: descriptor.connection_id,
            dialect: descriptor.dialect,
        })
    }

    async fn execute(
        &self,
        _handle: &Self::Handle,
        statement: &Statement,
    ) -> Result<RowSet, StoreError> {
        let mut state = self.state();
        state.calls.push(MockCall::Execute(statement.clone()));

        if let Some(reason) = state.failing_statements.get(&statement.sql) {
            return Err(StoreError::Query(reason.clone()));
        }
        if let Some(rows) = state.results.get(&statement.sql) {
            return Ok(rows.clone());
        }

        let (columns, table) = parse_select(&statement.sql)
            .ok_or_else(|| StoreError::Query(format!("unscripted statement: {}", statement.sql)))?;
        if let Some(rows) = state.table_rows.get(&table) {
            return project(rows, &columns);
        }
        match state.tables.get(&table) {
            Some(live) => {
                let all: Vec<String> = live.iter().map(|c| c.name.clone()).collect();
                project(&RowSet::new(all, Vec::new()), &columns)
            }
            None => Err(StoreError::Query(format!(
                "relation \"{}\" does not exist",
                table
            ))),
        }
    }

    async fn reflect_table(
        &self,
        _handle: &Self::Handle,
        table: &str,
    ) -> Result<Option<Vec<ColumnDescriptor>>, StoreError> {
        let mut state = self.state();
        state.calls.push(MockCall::Reflect {
            table: table.to_string(),
        });
        Self::catalog_check(&state)?;
        Ok(state.tables.get(table).cloned())
    }

    async fn list_schema_names(&self, _handle: &Self::Handle) -> Result<Vec<String>, StoreError> {
        let mut state = self.state();
        state.calls.push(MockCall::ListSchemas);
        Self::catalog_check(&state)?;
        Ok(state.schemas.clone())
    }

    async fn list_table_names(&self, _handle: &Self::Handle) -> Result<Vec<String>, StoreError> {
        let mut state = self.state();
        state.calls.push(MockCall::ListTables);
        Self::catalog_check(&state)?;
        Ok(state.tables.keys().cloned().collect())
    }
}

// ============================================================================
// KEY-VALUE STORE MOCK
// ============================================================================

/// In-memory store that can be switched offline.
#[derive(Debug, Clone)]
pub struct MockKeyValueStore {
    inner: Arc<MemoryKeyValueStore>,
    offline: Arc<AtomicBool>,
}

impl MockKeyValueStore {
    fn check(&self) -> Result<(), KvError> {
        if self.offline.load(Ordering::Acquire) {
            Err(KvError::Unavailable("connection reset by peer".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KeyValueStore for MockKeyValueStore {
    async fn ping(&self) -> Result<(), KvError> {
        self.check()?;
        self.inner.ping().await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: Option<u64>) -> Result<(), KvError> {
        self.check()?;
        self.inner.set(key, value, ttl_secs).await
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64, KvError> {
        self.check()?;
        self.inner.delete_many(keys).await
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        self.check()?;
        self.inner.exists(key).await
    }

    async fn ttl(&self, key: &str) -> Result<i64, KvError> {
        self.check()?;
        self.inner.ttl(key).await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, KvError> {
        self.check()?;
        self.inner.keys(pattern).await
    }

    async fn flush(&self) -> Result<(), KvError> {
        self.check()?;
        self.inner.flush().await
    }

    async fn server_info(&self) -> Result<ServerInfo, KvError> {
        self.check()?;
        self.inner.server_info().await
    }
}

/// Connector whose stores share one keyspace and one online switch.
#[derive(Debug, Clone, Default)]
pub struct MockKeyValueConnector {
    store: Arc<MemoryKeyValueStore>,
    offline: Arc<AtomicBool>,
    refusal: Option<String>,
    connects: Arc<AtomicU64>,
}

impl MockKeyValueConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A connector whose `connect` always fails as unreachable.
    pub fn refusing(reason: impl Into<String>) -> Self {
        Self {
            refusal: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Fail every command, including pings, until [`go_online`](Self::go_online).
    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::Release);
    }

    pub fn go_online(&self) {
        self.offline.store(false, Ordering::Release);
    }

    /// Number of `connect` calls so far.
    pub fn connect_count(&self) -> u64 {
        self.connects.load(Ordering::Relaxed)
    }

    /// The shared keyspace, bypassing the online switch.
    pub fn store(&self) -> Arc<MemoryKeyValueStore> {
        Arc::clone(&self.store)
    }
}

#[async_trait]
impl KeyValueConnector for MockKeyValueConnector {
    type Store = MockKeyValueStore;

    async fn connect(&self) -> Result<Self::Store, KvError> {
        self.connects.fetch_add(1, Ordering::Relaxed);
        if let Some(reason) = &self.refusal {
            return Err(KvError::Unavailable(reason.clone()));
        }
        Ok(MockKeyValueStore {
            inner: Arc::clone(&self.store),
            offline: Arc::clone(&self.offline),
        })
    }

    fn describe(&self) -> String {
        "mock://".to_string()
    }
}
