//! In-process key-value store.
//!
//! Expiry is lazy: an expired entry is dropped the next time it is touched or
//! listed. Pattern matching uses the same glob dialect as Redis `KEYS`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::traits::{KeyValueConnector, KeyValueStore, KvError, ServerInfo, TTL_ABSENT, TTL_PERSISTENT};

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Key-value store held in process memory.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn live(&self, key: &str) -> Option<Entry> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if !entry.is_expired(now) => return Some(entry.clone()),
                None => return None,
                Some(_) => {}
            }
        }
        // a set may have landed between the two locks
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if !entry.is_expired(Instant::now()) => Some(entry.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

/// Deadline for a TTL. A TTL past the clock's range never expires.
fn expiry_after(ttl_secs: u64) -> Option<Instant> {
    Instant::now().checked_add(Duration::from_secs(ttl_secs))
}

fn compile_pattern(pattern: &str) -> Result<glob::Pattern, KvError> {
    glob::Pattern::new(pattern).map_err(|e| KvError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn ping(&self) -> Result<(), KvError> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        Ok(self.live(key).await.map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: Option<u64>) -> Result<(), KvError> {
        let expires_at = ttl_secs.and_then(expiry_after);
        self.entries
            .write()
            .await
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        let now = Instant::now();
        Ok(self
            .entries
            .write()
            .await
            .remove(key)
            .is_some_and(|entry| !entry.is_expired(now)))
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64, KvError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let removed = keys
            .iter()
            .filter_map(|key| entries.remove(key))
            .filter(|entry| !entry.is_expired(now))
            .count();
        Ok(removed as u64)
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        Ok(self.live(key).await.is_some())
    }

    async fn ttl(&self, key: &str) -> Result<i64, KvError> {
        let Some(entry) = self.live(key).await else {
            return Ok(TTL_ABSENT);
        };
        Ok(match entry.expires_at {
            None => TTL_PERSISTENT,
            Some(at) => {
                let remaining = at.saturating_duration_since(Instant::now());
                // round up so a just-set key reports its full TTL
                let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
                i64::try_from(secs).unwrap_or(i64::MAX)
            }
        })
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, KvError> {
        let matcher = compile_pattern(pattern)?;
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| !entry.is_expired(now));
        let mut keys: Vec<String> = entries
            .keys()
            .filter(|key| matcher.matches(key))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn flush(&self) -> Result<(), KvError> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn server_info(&self) -> Result<ServerInfo, KvError> {
        Ok(ServerInfo {
            version: Some(format!("memory-{}", env!("CARGO_PKG_VERSION"))),
            used_memory: None,
            connected_clients: Some(1),
            total_commands_processed: None,
            key_count: Some(self.len().await as u64),
        })
    }
}

/// Hands out one shared [`MemoryKeyValueStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    store: Arc<MemoryKeyValueStore>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared store, for inspection in tests.
    pub fn store(&self) -> Arc<MemoryKeyValueStore> {
        Arc::clone(&self.store)
    }
}

#[async_trait]
impl KeyValueConnector for MemoryConnector {
    type Store = Arc<MemoryKeyValueStore>;

    async fn connect(&self) -> Result<Self::Store, KvError> {
        Ok(Arc::clone(&self.store))
    }

    fn describe(&self) -> String {
        "memory://".to_string()
    }
}
