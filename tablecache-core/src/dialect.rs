//! SQL dialect discriminator

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::DialectError;

/// A SQL database product whose catalog conventions we know how to query.
///
/// The set is closed on purpose: every consumer matches on it exhaustively,
/// so adding a variant forces every catalog table to be extended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Postgresql,
    Mysql,
    Sqlite,
    Sqlserver,
    Oracle,
}

impl Dialect {
    /// All supported dialects, in declaration order.
    pub const ALL: [Dialect; 5] = [
        Dialect::Postgresql,
        Dialect::Mysql,
        Dialect::Sqlite,
        Dialect::Sqlserver,
        Dialect::Oracle,
    ];

    /// Canonical lowercase name, as persisted in the registry.
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Postgresql => "postgresql",
            Dialect::Mysql => "mysql",
            Dialect::Sqlite => "sqlite",
            Dialect::Sqlserver => "sqlserver",
            Dialect::Oracle => "oracle",
        }
    }

    /// Render the bind placeholder for the `n`th parameter (1-based).
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Dialect::Postgresql => format!("${}", n),
            Dialect::Mysql | Dialect::Sqlite => "?".to_string(),
            Dialect::Sqlserver => format!("@p{}", n),
            Dialect::Oracle => format!(":{}", n),
        }
    }

    /// Whether this dialect addresses a file rather than a network host.
    pub fn is_file_based(&self) -> bool {
        matches!(self, Dialect::Sqlite)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = DialectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" | "pg" => Ok(Dialect::Postgresql),
            "mysql" | "mariadb" => Ok(Dialect::Mysql),
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            "sqlserver" | "mssql" => Ok(Dialect::Sqlserver),
            "oracle" => Ok(Dialect::Oracle),
            _ => Err(DialectError::Unsupported {
                dialect: s.to_string(),
                context: "dialect name".to_string(),
            }),
        }
    }
}
