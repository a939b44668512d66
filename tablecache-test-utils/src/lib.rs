//! Tablecache Test Utilities
//!
//! Shared test infrastructure for the tablecache workspace:
//! - Proptest generators for descriptors, intervals and key segments
//! - Fixtures for connections, cached tables and mock stores
//! - Assertions over the error taxonomy

// Re-export the mock backends from their source crate
pub use tablecache_storage::mock::{MockKeyValueConnector, MockKeyValueStore, MockRelationalStore};
pub use tablecache_storage::{MemoryConnector, RowSet};

// Re-export core types for convenience
pub use tablecache_core::{
    new_entity_id, CacheSettings, CachedTableDescriptor, ColumnDescriptor, ConnectionDescriptor,
    Dialect, EntityId, IntrospectionError, KeyError, RefreshError, RefreshInterval,
    RegistryError, TablecacheError, TablecacheResult, ValidationError,
};

use chrono::NaiveDate;
use uuid::Uuid;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating tablecache entity types.

    use super::*;
    use proptest::prelude::*;

    // === Identity Generators ===

    /// Generate a random UUID.
    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    /// Generate a valid UUIDv7 (timestamp-sortable).
    pub fn arb_entity_id() -> impl Strategy<Value = EntityId> {
        Just(()).prop_map(|_| new_entity_id())
    }

    // === Enum Generators ===

    /// Generate any supported dialect.
    pub fn arb_dialect() -> impl Strategy<Value = Dialect> {
        prop::sample::select(Dialect::ALL.to_vec())
    }

    /// Generate a dialect that addresses a network host.
    pub fn arb_network_dialect() -> impl Strategy<Value = Dialect> {
        arb_dialect().prop_filter("network dialect", |d| !d.is_file_based())
    }

    // === Value Generators ===

    /// Generate a SQL identifier: letter or underscore, then word characters.
    pub fn arb_identifier() -> impl Strategy<Value = String> {
        "[a-z_][a-z0-9_]{0,23}"
    }

    /// Generate a free-form key segment, delimiters and spaces included.
    pub fn arb_key_segment() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9 :%/_.-]{1,24}"
    }

    /// Generate a calendar date between 2000 and 2037.
    pub fn arb_date() -> impl Strategy<Value = NaiveDate> {
        (2000i32..2038, 1u32..=12, 1u32..=28).prop_map(|(y, m, d)| {
            NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MIN)
        })
    }

    /// Generate a refresh interval, `NEVER` included.
    pub fn arb_refresh_interval() -> impl Strategy<Value = RefreshInterval> {
        prop_oneof![
            1 => Just(RefreshInterval::NEVER),
            4 => (1u64..604_800).prop_map(RefreshInterval::from_secs),
        ]
    }

    /// Generate interval text in any accepted unit form, with its value in seconds.
    pub fn arb_interval_text() -> impl Strategy<Value = (String, u64)> {
        (0u64..10_000, prop::sample::select(vec!["", "s", "m", "h", "d"])).prop_map(
            |(value, unit)| {
                let multiplier = match unit {
                    "m" => 60,
                    "h" => 3_600,
                    "d" => 86_400,
                    _ => 1,
                };
                (format!("{}{}", value, unit), value * multiplier)
            },
        )
    }

    // === Entity Generators ===

    /// Generate a connection descriptor that passes validation.
    pub fn arb_connection() -> impl Strategy<Value = ConnectionDescriptor> {
        (
            arb_dialect(),
            arb_identifier(),
            "[a-z][a-z0-9.-]{0,30}",
            1u16..=u16::MAX,
            arb_identifier(),
            "[ -~]{0,16}",
            proptest::option::of(arb_identifier()),
            any::<bool>(),
        )
            .prop_map(|(dialect, name, host, port, user, secret, database, ssl)| {
                let database = if dialect.is_file_based() {
                    Some(database.unwrap_or_else(|| "data.db".to_string()))
                } else {
                    database
                };
                ConnectionDescriptor {
                    connection_id: new_entity_id(),
                    name,
                    host,
                    port,
                    user,
                    secret,
                    database,
                    ssl_enabled: ssl,
                    dialect,
                }
            })
    }

    /// Generate a cached table bound to the given connection.
    pub fn arb_cached_table(connection_id: EntityId) -> impl Strategy<Value = CachedTableDescriptor> {
        (
            arb_identifier(),
            prop::collection::vec(arb_identifier(), 0..6),
            arb_refresh_interval(),
            any::<bool>(),
            arb_identifier(),
        )
            .prop_map(move |(table_name, field_list, refresh_interval, is_active, primary_key)| {
                CachedTableDescriptor {
                    cached_table_id: new_entity_id(),
                    table_name,
                    field_list,
                    refresh_interval,
                    connection_id,
                    is_active,
                    primary_key,
                }
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use serde_json::json;

    /// A PostgreSQL connection to a local `sales` database.
    pub fn pg_connection() -> ConnectionDescriptor {
        ConnectionDescriptor {
            connection_id: new_entity_id(),
            name: "sales".to_string(),
            host: "localhost".to_string(),
            port: 5432,
            user: "reader".to_string(),
            secret: "s3cret".to_string(),
            database: Some("sales".to_string()),
            ssl_enabled: false,
            dialect: Dialect::Postgresql,
        }
    }

    /// A SQLite connection to a file path.
    pub fn sqlite_connection() -> ConnectionDescriptor {
        ConnectionDescriptor {
            connection_id: new_entity_id(),
            name: "local".to_string(),
            host: String::new(),
            port: 0,
            user: String::new(),
            secret: String::new(),
            database: Some("/var/lib/app/data.db".to_string()),
            ssl_enabled: false,
            dialect: Dialect::Sqlite,
        }
    }

    /// An active `orders` table tracking `total` and `status`, hourly refresh.
    pub fn orders_table(connection_id: EntityId) -> CachedTableDescriptor {
        CachedTableDescriptor {
            cached_table_id: new_entity_id(),
            table_name: "orders".to_string(),
            field_list: vec!["total".to_string(), "status".to_string()],
            refresh_interval: RefreshInterval::from_secs(3_600),
            connection_id,
            is_active: true,
            primary_key: "id".to_string(),
        }
    }

    /// Live columns of the `orders` table.
    pub fn orders_columns() -> Vec<ColumnDescriptor> {
        vec![
            ColumnDescriptor::new("id", "integer", false).with_default("nextval('orders_id_seq')"),
            ColumnDescriptor::new("total", "numeric", true),
            ColumnDescriptor::new("status", "character varying", true),
            ColumnDescriptor::new("created_at", "timestamp with time zone", false),
        ]
    }

    /// Three rows of the `orders` table, largest id 42.
    pub fn orders_rows() -> RowSet {
        RowSet::new(
            vec!["id".to_string(), "total".to_string(), "status".to_string()],
            vec![
                vec![json!(7), json!(19.5), json!("paid")],
                vec![json!(42), json!(3.25), json!("open")],
                vec![json!(13), json!(100.0), json!("paid")],
            ],
        )
    }

    /// A relational store holding the `orders` table and its rows.
    pub fn orders_store() -> MockRelationalStore {
        MockRelationalStore::new()
            .with_schemas(vec!["public".to_string(), "reporting".to_string()])
            .with_table("orders", orders_columns())
            .with_rows("orders", orders_rows())
    }

    /// Cache settings with a test prefix and a short staleness window.
    pub fn cache_settings() -> CacheSettings {
        CacheSettings::default()
            .with_url("redis://localhost:6379/15")
            .with_key_prefix("test")
            .with_low_water_secs(30)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertion helpers for the tablecache error taxonomy.

    use super::*;

    /// Assert that a TablecacheResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &TablecacheResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that a refresh failed on schema drift for the given primary key.
    #[track_caller]
    pub fn assert_schema_drift<T: std::fmt::Debug>(
        result: &Result<T, RefreshError>,
        expected_pk: &str,
    ) {
        match result {
            Err(RefreshError::SchemaDrift { primary_key, .. }) => {
                assert_eq!(primary_key, expected_pk, "Wrong primary key in drift error");
            }
            other => panic!("Expected SchemaDrift error, got: {:?}", other),
        }
    }

    /// Assert that a registry call reported a missing entity of the given kind.
    #[track_caller]
    pub fn assert_registry_not_found<T: std::fmt::Debug>(
        result: &Result<T, RegistryError>,
        expected_entity: &str,
    ) {
        match result {
            Err(RegistryError::NotFound { entity, .. }) => {
                assert_eq!(*entity, expected_entity, "Wrong entity in NotFound error");
            }
            other => panic!("Expected NotFound error, got: {:?}", other),
        }
    }

    /// Assert that a validation error names the given field.
    #[track_caller]
    pub fn assert_invalid_field<T: std::fmt::Debug>(
        result: &Result<T, ValidationError>,
        expected_field: &str,
    ) {
        match result {
            Err(ValidationError::RequiredFieldMissing { field })
            | Err(ValidationError::InvalidValue { field, .. }) => {
                assert_eq!(field, expected_field, "Wrong field in validation error");
            }
            other => panic!("Expected validation error, got: {:?}", other),
        }
    }

    /// Assert that a derived key never carries an empty segment.
    #[track_caller]
    pub fn assert_no_empty_segments(key: &str) {
        assert!(!key.contains("::"), "Key has an empty segment: {}", key);
        assert!(!key.ends_with(':'), "Key ends with a delimiter: {}", key);
    }
}

// ============================================================================
// TESTS
// ============================================================================
