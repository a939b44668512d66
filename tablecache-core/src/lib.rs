//! Tablecache Core - Entity Types
//!
//! Pure data structures shared by every other crate: dialects, connection and
//! cached-table descriptors, the error taxonomy and configuration. No I/O.

use chrono::{DateTime, Utc};
use uuid::Uuid;

mod config;
mod dialect;
mod entities;
mod error;
mod health;

pub use config::*;
pub use dialect::*;
pub use entities::*;
pub use error::*;
pub use health::*;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_ids_are_time_ordered() {
        let a = new_entity_id();
        let b = new_entity_id();
        assert_ne!(a, b);
        assert_eq!(a.get_version_num(), 7);
        assert!(a <= b);
    }
}
