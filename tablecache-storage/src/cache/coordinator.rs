//! Cache coordinator: connection lifecycle, serialization policy and counters
//! over a [`KeyValueStore`].
//!
//! # Degraded reads
//!
//! The plain operations (`get`, `set`, `delete`, `exists`, `get_ttl`,
//! `clear_pattern`, `flush_all`) never return an error. A transport failure
//! is logged and reported through the same channel as a genuine negative
//! answer: `get` returns `None` and counts a miss, `exists` returns `false`,
//! `get_ttl` returns [`KeyTtl::Absent`]. Callers that need to tell the two
//! apart use the `try_*` variants, which surface [`KvError`].

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tablecache_core::CacheSettings;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::stats::{CacheCounters, CacheStatsSnapshot};
use super::traits::{KeyValueConnector, KeyValueStore, KvError, ServerInfo, TTL_ABSENT, TTL_PERSISTENT};
use super::value::CacheValue;

// ============================================================================
// STATE AND TTL TYPES
// ============================================================================

/// Lifecycle of the coordinator's store handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }
}

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyTtl {
    /// Expires in this many seconds.
    Expires(u64),
    /// Exists without expiry.
    Persistent,
    /// Does not exist (or the store could not be asked).
    Absent,
}

impl KeyTtl {
    /// Interpret a store reply using the `-1` / `-2` sentinels.
    pub fn from_seconds(seconds: i64) -> Self {
        match seconds {
            TTL_PERSISTENT => KeyTtl::Persistent,
            s if s < 0 => KeyTtl::Absent,
            s => KeyTtl::Expires(s as u64),
        }
    }

    /// Wire form: seconds, `-1` for no expiry, `-2` for absent.
    pub fn as_seconds(&self) -> i64 {
        match self {
            KeyTtl::Expires(secs) => i64::try_from(*secs).unwrap_or(i64::MAX),
            KeyTtl::Persistent => TTL_PERSISTENT,
            KeyTtl::Absent => TTL_ABSENT,
        }
    }
}

/// Settings echoed by [`CacheCoordinator::info`], with credentials removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheInfoConfig {
    pub url: String,
    pub key_prefix: String,
    pub default_ttl_secs: i64,
    pub max_size_bytes: u64,
}

/// Snapshot of coordinator and server state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheInfo {
    pub connected: bool,
    pub state: ConnectionState,
    pub server: Option<ServerInfo>,
    pub error: Option<String>,
    pub stats: CacheStatsSnapshot,
    pub config: CacheInfoConfig,
}

// ============================================================================
// COORDINATOR
// ============================================================================

/// Owns one lazily opened key-value store handle and applies the cache's
/// serialization, TTL and accounting rules to every operation.
///
/// Construct one per process and share it behind an `Arc`.
pub struct CacheCoordinator<C: KeyValueConnector> {
    connector: C,
    settings: CacheSettings,
    store: RwLock<Option<Arc<C::Store>>>,
    state: AtomicU8,
    counters: CacheCounters,
}

impl<C: KeyValueConnector> CacheCoordinator<C> {
    pub fn new(connector: C, settings: CacheSettings) -> Self {
        Self {
            connector,
            settings,
            store: RwLock::new(None),
            state: AtomicU8::new(ConnectionState::Disconnected.as_u8()),
            counters: CacheCounters::new(),
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    // ------------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------------

    /// Open the store handle if absent. A handle is only kept after a
    /// successful ping; otherwise the state returns to `Disconnected` and the
    /// cause is returned.
    pub async fn connect(&self) -> Result<(), KvError> {
        self.handle().await.map(|_| ())
    }

    /// Drop the store handle. The next operation reconnects.
    pub async fn disconnect(&self) {
        let mut slot = self.store.write().await;
        if slot.take().is_some() {
            info!(target_store = %self.connector.describe(), "cache disconnected");
        }
        self.set_state(ConnectionState::Disconnected);
    }

    async fn handle(&self) -> Result<Arc<C::Store>, KvError> {
        if let Some(store) = self.store.read().await.as_ref() {
            return Ok(Arc::clone(store));
        }

        let mut slot = self.store.write().await;
        if let Some(store) = slot.as_ref() {
            return Ok(Arc::clone(store));
        }

        self.set_state(ConnectionState::Connecting);
        let connected = match self.connector.connect().await {
            Ok(store) => store.ping().await.map(|_| store),
            Err(e) => Err(e),
        };

        match connected {
            Ok(store) => {
                let store = Arc::new(store);
                *slot = Some(Arc::clone(&store));
                self.set_state(ConnectionState::Connected);
                info!(target_store = %self.connector.describe(), "cache connected");
                Ok(store)
            }
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                error!(
                    target_store = %self.connector.describe(),
                    error = %e,
                    "cache connection failed"
                );
                Err(e)
            }
        }
    }

    /// Forget the handle after the store became unreachable.
    async fn on_error(&self, err: &KvError) {
        if matches!(err, KvError::Unavailable(_)) {
            self.store.write().await.take();
            self.set_state(ConnectionState::Disconnected);
        }
    }

    async fn run<T, F, Fut>(&self, op: F) -> Result<T, KvError>
    where
        F: FnOnce(Arc<C::Store>) -> Fut,
        Fut: std::future::Future<Output = Result<T, KvError>>,
    {
        let store = self.handle().await?;
        let result = op(store).await;
        if let Err(e) = &result {
            self.on_error(e).await;
        }
        result
    }

    fn effective_ttl(&self, ttl: Option<i64>) -> Option<u64> {
        match ttl {
            None if self.settings.default_ttl_secs > 0 => Some(self.settings.default_ttl_secs as u64),
            None => None,
            Some(secs) if secs > 0 => Some(secs as u64),
            Some(_) => None,
        }
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Read a key, counting a hit or a miss. Transport failures surface as
    /// errors and are not counted.
    pub async fn try_get(
        &self,
        key: &str,
        auto_deserialize: bool,
    ) -> Result<Option<CacheValue>, KvError> {
        let bytes = self.run(|store| async move { store.get(key).await }).await?;
        match bytes {
            Some(bytes) => {
                self.counters.record_hit();
                Ok(Some(CacheValue::decode(bytes, auto_deserialize)))
            }
            None => {
                self.counters.record_miss();
                Ok(None)
            }
        }
    }

    /// Read a key. A transport failure is logged, counted as a miss and
    /// reported as `None`.
    pub async fn get(&self, key: &str, auto_deserialize: bool) -> Option<CacheValue> {
        match self.try_get(key, auto_deserialize).await {
            Ok(value) => value,
            Err(e) => {
                error!(key, error = %e, "cache get failed");
                self.counters.record_miss();
                None
            }
        }
    }

    /// Read and decode a typed value. Undecodable payloads read as `None`.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key, true).await?;
        match value.into_typed() {
            Ok(typed) => Some(typed),
            Err(e) => {
                warn!(key, error = %e, "cached value did not decode");
                None
            }
        }
    }

    pub async fn try_exists(&self, key: &str) -> Result<bool, KvError> {
        self.run(|store| async move { store.exists(key).await }).await
    }

    pub async fn exists(&self, key: &str) -> bool {
        self.try_exists(key).await.unwrap_or_else(|e| {
            error!(key, error = %e, "cache exists failed");
            false
        })
    }

    pub async fn try_get_ttl(&self, key: &str) -> Result<KeyTtl, KvError> {
        self.run(|store| async move { store.ttl(key).await })
            .await
            .map(KeyTtl::from_seconds)
    }

    pub async fn get_ttl(&self, key: &str) -> KeyTtl {
        self.try_get_ttl(key).await.unwrap_or_else(|e| {
            error!(key, error = %e, "cache ttl failed");
            KeyTtl::Absent
        })
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Write a value.
    ///
    /// `None` applies the configured default TTL when it is positive; a zero
    /// or negative TTL stores the key without expiry.
    pub async fn try_set(
        &self,
        key: &str,
        value: impl Into<CacheValue>,
        ttl: Option<i64>,
    ) -> Result<(), KvError> {
        let bytes = value.into().encode()?;
        let ttl_secs = self.effective_ttl(ttl);
        self.run(|store| async move { store.set(key, bytes, ttl_secs).await })
            .await?;
        self.counters.record_set();
        debug!(key, ttl_secs = ?ttl_secs, "cache set");
        Ok(())
    }

    /// Write a value, returning `false` on any failure.
    pub async fn set(&self, key: &str, value: impl Into<CacheValue>, ttl: Option<i64>) -> bool {
        match self.try_set(key, value, ttl).await {
            Ok(()) => true,
            Err(e) => {
                error!(key, error = %e, "cache set failed");
                false
            }
        }
    }

    /// Serialize any value (JSON, falling back to bincode) and write it.
    pub async fn set_serialized<T: Serialize>(&self, key: &str, value: &T, ttl: Option<i64>) -> bool {
        match CacheValue::serialized(value) {
            Ok(value) => self.set(key, value, ttl).await,
            Err(e) => {
                error!(key, error = %e, "cache value did not serialize");
                false
            }
        }
    }

    /// Remove a key. Returns whether it existed.
    ///
    /// Every delete the store accepts counts toward `deletes`, whether or not
    /// the key was there.
    pub async fn try_delete(&self, key: &str) -> Result<bool, KvError> {
        let existed = self.run(|store| async move { store.delete(key).await }).await?;
        self.counters.record_deletes(1);
        debug!(key, existed, "cache delete");
        Ok(existed)
    }

    pub async fn delete(&self, key: &str) -> bool {
        self.try_delete(key).await.unwrap_or_else(|e| {
            error!(key, error = %e, "cache delete failed");
            false
        })
    }

    /// Delete every key matching a glob. Zero matches is not an error.
    pub async fn try_clear_pattern(&self, pattern: &str) -> Result<u64, KvError> {
        let keys = self.run(|store| async move { store.keys(pattern).await }).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let deleted = self
            .run(|store| async move { store.delete_many(&keys).await })
            .await?;
        self.counters.record_deletes(deleted);
        info!(pattern, deleted, "cleared keys matching pattern");
        Ok(deleted)
    }

    pub async fn clear_pattern(&self, pattern: &str) -> u64 {
        self.try_clear_pattern(pattern).await.unwrap_or_else(|e| {
            error!(pattern, error = %e, "cache clear_pattern failed");
            0
        })
    }

    /// Wipe the whole keyspace. Operator action only.
    pub async fn flush_all(&self) -> bool {
        match self.run(|store| async move { store.flush().await }).await {
            Ok(()) => {
                info!("cache flushed");
                true
            }
            Err(e) => {
                error!(error = %e, "cache flush failed");
                false
            }
        }
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.counters.snapshot()
    }

    /// Connection state, server details, counters and redacted settings.
    pub async fn info(&self) -> CacheInfo {
        let config = CacheInfoConfig {
            url: self.settings.redacted_url(),
            key_prefix: self.settings.key_prefix.clone(),
            default_ttl_secs: self.settings.default_ttl_secs,
            max_size_bytes: self.settings.max_size_bytes,
        };

        let server = self.run(|store| async move { store.server_info().await }).await;
        let (server, error) = match server {
            Ok(info) => (Some(info), None),
            Err(e) => {
                error!(error = %e, "cache info failed");
                (None, Some(e.to_string()))
            }
        };

        CacheInfo {
            connected: error.is_none() && self.state() == ConnectionState::Connected,
            state: self.state(),
            server,
            error,
            stats: self.stats(),
            config,
        }
    }

    /// Ping the store, connecting first if needed.
    pub async fn health_check(&self) -> bool {
        match self.run(|store| async move { store.ping().await }).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "cache health check failed");
                false
            }
        }
    }
}
