//! Key-value store seams.
//!
//! [`KeyValueStore`] is the raw byte-level transport the coordinator drives;
//! [`KeyValueConnector`] produces one. TTL sentinels follow the Redis
//! convention: `-1` for a key without expiry, `-2` for a missing key.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// TTL reply for a key that exists but never expires.
pub const TTL_PERSISTENT: i64 = -1;
/// TTL reply for a key that does not exist.
pub const TTL_ABSENT: i64 = -2;

/// Error type for key-value store operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KvError {
    /// The store could not be reached.
    #[error("Key-value store unavailable: {0}")]
    Unavailable(String),

    /// The store rejected or failed a command.
    #[error("Key-value command failed: {0}")]
    Command(String),

    #[error("Invalid key pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Server-side details reported by a key-value store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub version: Option<String>,
    pub used_memory: Option<String>,
    pub connected_clients: Option<u64>,
    pub total_commands_processed: Option<u64>,
    pub key_count: Option<u64>,
}

/// Byte-level key-value store.
///
/// Implementations must be safe to share across tasks; the coordinator holds
/// one instance and issues concurrent commands through it.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Liveness probe.
    async fn ping(&self) -> Result<(), KvError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;

    /// Store `value`, replacing any previous entry. `None` leaves the key
    /// without expiry.
    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: Option<u64>) -> Result<(), KvError>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool, KvError>;

    /// Returns the number of keys removed.
    async fn delete_many(&self, keys: &[String]) -> Result<u64, KvError>;

    async fn exists(&self, key: &str) -> Result<bool, KvError>;

    /// Remaining seconds, [`TTL_PERSISTENT`] or [`TTL_ABSENT`].
    async fn ttl(&self, key: &str) -> Result<i64, KvError>;

    /// Keys matching a glob pattern (`*`, `?`, `[...]`).
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, KvError>;

    /// Remove every key in the store's keyspace.
    async fn flush(&self) -> Result<(), KvError>;

    async fn server_info(&self) -> Result<ServerInfo, KvError>;
}

/// Opens [`KeyValueStore`] handles on demand.
#[async_trait]
pub trait KeyValueConnector: Send + Sync {
    type Store: KeyValueStore + 'static;

    async fn connect(&self) -> Result<Self::Store, KvError>;

    /// Where the connector points, with credentials removed.
    fn describe(&self) -> String;
}

#[async_trait]
impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    async fn ping(&self) -> Result<(), KvError> {
        (**self).ping().await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: Option<u64>) -> Result<(), KvError> {
        (**self).set(key, value, ttl_secs).await
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        (**self).delete(key).await
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64, KvError> {
        (**self).delete_many(keys).await
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        (**self).exists(key).await
    }

    async fn ttl(&self, key: &str) -> Result<i64, KvError> {
        (**self).ttl(key).await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, KvError> {
        (**self).keys(pattern).await
    }

    async fn flush(&self) -> Result<(), KvError> {
        (**self).flush().await
    }

    async fn server_info(&self) -> Result<ServerInfo, KvError> {
        (**self).server_info().await
    }
}
