//! Descriptor entities: registered connections, mirrored tables and live columns

use crate::{Dialect, EntityId, ValidationError};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// CONNECTION DESCRIPTOR
// ============================================================================

/// A registered external database connection.
///
/// Owned by the connection registry; cached tables refer to it by id.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    pub connection_id: EntityId,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub secret: String,
    /// Target database. Some dialects (postgresql) can connect without one.
    pub database: Option<String>,
    pub ssl_enabled: bool,
    pub dialect: Dialect,
}

impl ConnectionDescriptor {
    /// Human-readable target used in logs and error context. Never includes the secret.
    pub fn target(&self) -> String {
        if self.dialect.is_file_based() {
            return self.database.clone().unwrap_or_default();
        }
        match &self.database {
            Some(db) => format!("{}:{}/{}", self.host, self.port, db),
            None => format!("{}:{}", self.host, self.port),
        }
    }

    /// Check the fields the connection-string grammar depends on.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "name".to_string(),
            });
        }

        if self.dialect.is_file_based() {
            if self.database.as_deref().map_or(true, |d| d.trim().is_empty()) {
                return Err(ValidationError::RequiredFieldMissing {
                    field: "database".to_string(),
                });
            }
            return Ok(());
        }

        if self.host.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "host".to_string(),
            });
        }
        if self.port == 0 {
            return Err(ValidationError::InvalidValue {
                field: "port".to_string(),
                reason: "port must be between 1 and 65535".to_string(),
            });
        }
        if self.user.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "user".to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("connection_id", &self.connection_id)
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("secret", &"<redacted>")
            .field("database", &self.database)
            .field("ssl_enabled", &self.ssl_enabled)
            .field("dialect", &self.dialect)
            .finish()
    }
}

// ============================================================================
// REFRESH INTERVAL
// ============================================================================

/// How long a cached table snapshot stays valid.
///
/// Persisted as text (`"3600"`, `"90s"`, `"15m"`, `"1h"`, `"1d"`); serialized
/// as whole seconds. Zero means the snapshot never expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RefreshInterval(u64);

impl RefreshInterval {
    pub const NEVER: RefreshInterval = RefreshInterval(0);

    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.0)
    }

    /// TTL to hand to the cache: `None` when the interval means "no expiration".
    pub fn ttl_secs(&self) -> Option<i64> {
        if self.0 == 0 {
            None
        } else {
            Some(i64::try_from(self.0).unwrap_or(i64::MAX))
        }
    }

    /// Canonical text form, as stored in the registry.
    pub fn to_text(&self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for RefreshInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

impl FromStr for RefreshInterval {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ValidationError::InvalidValue {
            field: "refresh_interval".to_string(),
            reason: format!("'{}': {}", s, reason),
        };

        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(invalid("interval is empty"));
        }

        let (digits, multiplier) = match trimmed.char_indices().last() {
            Some((idx, unit)) if unit.is_ascii_alphabetic() => {
                let multiplier = match unit.to_ascii_lowercase() {
                    's' => 1,
                    'm' => 60,
                    'h' => 3_600,
                    'd' => 86_400,
                    _ => return Err(invalid("unknown unit, expected s, m, h or d")),
                };
                (&trimmed[..idx], multiplier)
            }
            _ => (trimmed, 1),
        };

        let value: u64 = digits
            .trim()
            .parse()
            .map_err(|_| invalid("expected a non-negative integer"))?;

        value
            .checked_mul(multiplier)
            .map(RefreshInterval)
            .ok_or_else(|| invalid("interval overflows"))
    }
}

impl<'de> Deserialize<'de> for RefreshInterval {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawInterval {
            Secs(u64),
            Text(String),
        }

        match RawInterval::deserialize(deserializer)? {
            RawInterval::Secs(secs) => Ok(RefreshInterval(secs)),
            RawInterval::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

// ============================================================================
// CACHED TABLE DESCRIPTOR
// ============================================================================

/// A table on a registered connection that is mirrored into the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedTableDescriptor {
    pub cached_table_id: EntityId,
    pub table_name: String,
    /// Tracked fields, in projection order. Empty means every live column.
    pub field_list: Vec<String>,
    pub refresh_interval: RefreshInterval,
    pub connection_id: EntityId,
    pub is_active: bool,
    pub primary_key: String,
}

impl CachedTableDescriptor {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.table_name.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "table_name".to_string(),
            });
        }
        if self.primary_key.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "primary_key".to_string(),
            });
        }
        if let Some(blank) = self.field_list.iter().position(|f| f.trim().is_empty()) {
            return Err(ValidationError::InvalidValue {
                field: "field_list".to_string(),
                reason: format!("entry {} is blank", blank),
            });
        }
        Ok(())
    }
}

// ============================================================================
// COLUMN DESCRIPTOR
// ============================================================================

/// One column of a live table, as reported by introspection.
///
/// Produced fresh on every call and never persisted as the source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Dialect-native declared type, e.g. `character varying` or `INTEGER`.
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            default: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn pg_connection() -> ConnectionDescriptor {
        ConnectionDescriptor {
            connection_id: Uuid::now_v7(),
            name: "warehouse".to_string(),
            host: "db.internal".to_string(),
            port: 5432,
            user: "reader".to_string(),
            secret: "hunter2".to_string(),
            database: Some("sales".to_string()),
            ssl_enabled: false,
            dialect: Dialect::Postgresql,
        }
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", pg_connection());
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_target_omits_secret() {
        assert_eq!(pg_connection().target(), "db.internal:5432/sales");
    }

    #[test]
    fn test_validate_requires_host_for_network_dialects() {
        let mut conn = pg_connection();
        conn.host = "  ".to_string();
        assert_eq!(
            conn.validate(),
            Err(ValidationError::RequiredFieldMissing {
                field: "host".to_string()
            })
        );
    }

    #[test]
    fn test_validate_sqlite_needs_only_database() {
        let mut conn = pg_connection();
        conn.dialect = Dialect::Sqlite;
        conn.host = String::new();
        conn.port = 0;
        conn.user = String::new();
        assert!(conn.validate().is_ok());

        conn.database = None;
        assert!(conn.validate().is_err());
    }

    #[test]
    fn test_interval_units() {
        assert_eq!("3600".parse::<RefreshInterval>().unwrap().as_secs(), 3600);
        assert_eq!("90s".parse::<RefreshInterval>().unwrap().as_secs(), 90);
        assert_eq!("15m".parse::<RefreshInterval>().unwrap().as_secs(), 900);
        assert_eq!("1H".parse::<RefreshInterval>().unwrap().as_secs(), 3600);
        assert_eq!("2d".parse::<RefreshInterval>().unwrap().as_secs(), 172_800);
    }

    #[test]
    fn test_interval_rejects_garbage() {
        assert!("".parse::<RefreshInterval>().is_err());
        assert!("ten".parse::<RefreshInterval>().is_err());
        assert!("5w".parse::<RefreshInterval>().is_err());
        assert!("-5".parse::<RefreshInterval>().is_err());
    }

    #[test]
    fn test_zero_interval_means_no_ttl() {
        assert_eq!(RefreshInterval::NEVER.ttl_secs(), None);
        assert_eq!(RefreshInterval::from_secs(30).ttl_secs(), Some(30));
    }

    #[test]
    fn test_interval_deserializes_from_number_or_text() {
        let a: RefreshInterval = serde_json::from_str("120").unwrap();
        let b: RefreshInterval = serde_json::from_str("\"2m\"").unwrap();
        assert_eq!(a, b);
        assert!(serde_json::from_str::<RefreshInterval>("\"soon\"").is_err());
    }

    #[test]
    fn test_cached_table_validate() {
        let table = CachedTableDescriptor {
            cached_table_id: Uuid::now_v7(),
            table_name: "orders".to_string(),
            field_list: vec!["id".to_string(), " ".to_string()],
            refresh_interval: RefreshInterval::from_secs(60),
            connection_id: Uuid::now_v7(),
            is_active: true,
            primary_key: "id".to_string(),
        };
        assert!(matches!(
            table.validate(),
            Err(ValidationError::InvalidValue { ref field, .. }) if field == "field_list"
        ));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_interval_minutes_scale(n in 0u64..1_000_000) {
                let parsed: RefreshInterval = format!("{}m", n).parse().unwrap();
                prop_assert_eq!(parsed.as_secs(), n * 60);
            }

            #[test]
            fn prop_interval_text_roundtrip(n in 0u64..u64::MAX / 2) {
                let interval = RefreshInterval::from_secs(n);
                let parsed: RefreshInterval = interval.to_text().parse().unwrap();
                prop_assert_eq!(parsed, interval);
            }
        }
    }
}
