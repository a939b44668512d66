//! Cache layer: key derivation, value serialization and the coordinator that
//! drives a key-value store.
//!
//! # Example
//!
//! ```ignore
//! let cache = CacheCoordinator::new(RedisConnector::new(&settings.url)?, settings);
//!
//! let key = CacheKeyBuilder::new("cache").table("orders").identifier(42).build()?;
//! cache.set(key.as_str(), json!({"id": 42}), Some(3600)).await;
//!
//! // Transport failures read as misses; use try_get_ttl to tell them apart.
//! match cache.get_ttl(key.as_str()).await {
//!     KeyTtl::Absent => { /* missing or unreachable */ }
//!     KeyTtl::Persistent | KeyTtl::Expires(_) => { /* present */ }
//! }
//! ```

pub mod coordinator;
pub mod key;
pub mod memory;
pub mod redis_store;
pub mod stats;
pub mod traits;
pub mod value;

pub use coordinator::{CacheCoordinator, CacheInfo, CacheInfoConfig, ConnectionState, KeyTtl};
pub use key::{build_key, table_pattern, CacheKey, CacheKeyBuilder, KEY_DELIMITER};
pub use memory::{MemoryConnector, MemoryKeyValueStore};
pub use redis_store::{RedisConnector, RedisKeyValueStore};
pub use stats::{CacheCounters, CacheStatsSnapshot};
pub use traits::{
    KeyValueConnector, KeyValueStore, KvError, ServerInfo, TTL_ABSENT, TTL_PERSISTENT,
};
pub use value::CacheValue;
