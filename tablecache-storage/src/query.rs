//! Select statement factory for snapshot reads.
//!
//! Only `SELECT cols FROM table [WHERE ...]` can be produced. Identifiers are
//! checked against `[A-Za-z_][A-Za-z0-9_.]*` and every value is bound as a
//! parameter, never spliced into the SQL text.

use serde_json::Value;
use tablecache_core::{Dialect, ValidationError};

use crate::introspect::Statement;

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Eq { column: String, value: Value },
    Between { column: String, start: Value, end: Value },
}

/// Builder for a single-table select.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    table: String,
    columns: Vec<String>,
    conditions: Vec<Condition>,
}

impl SelectQuery {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            conditions: Vec::new(),
        }
    }

    /// Projected columns. Empty selects `*`.
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq {
            column: column.into(),
            value: value.into(),
        });
        self
    }

    pub fn between(
        mut self,
        column: impl Into<String>,
        start: impl Into<Value>,
        end: impl Into<Value>,
    ) -> Self {
        self.conditions.push(Condition::Between {
            column: column.into(),
            start: start.into(),
            end: end.into(),
        });
        self
    }

    /// Render for a dialect. Conditions are joined with `AND` in insertion order.
    pub fn build(&self, dialect: Dialect) -> Result<Statement, ValidationError> {
        validate_identifier("table", &self.table)?;
        for column in &self.columns {
            validate_identifier("column", column)?;
        }

        let projection = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.join(", ")
        };
        let mut sql = format!("SELECT {} FROM {}", projection, self.table);

        let mut params = Vec::new();
        let mut clauses = Vec::with_capacity(self.conditions.len());
        for condition in &self.conditions {
            match condition {
                Condition::Eq { column, value } => {
                    validate_identifier("column", column)?;
                    params.push(value.clone());
                    clauses.push(format!("{} = {}", column, dialect.placeholder(params.len())));
                }
                Condition::Between { column, start, end } => {
                    validate_identifier("column", column)?;
                    params.push(start.clone());
                    let lower = dialect.placeholder(params.len());
                    params.push(end.clone());
                    let upper = dialect.placeholder(params.len());
                    clauses.push(format!("{} BETWEEN {} AND {}", column, lower, upper));
                }
            }
        }

        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        Ok(Statement::with_params(sql, params))
    }
}

/// Accepts `name` or `schema.name` style identifiers.
pub fn validate_identifier(field: &str, identifier: &str) -> Result<(), ValidationError> {
    let mut chars = identifier.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');

    if valid_start && valid_rest {
        Ok(())
    } else {
        Err(ValidationError::InvalidValue {
            field: field.to_string(),
            reason: format!("'{}' is not a valid SQL identifier", identifier),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_select_all() {
        let stmt = SelectQuery::new("orders").build(Dialect::Postgresql).unwrap();
        assert_eq!(stmt.sql, "SELECT * FROM orders");
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_postgres_placeholders_are_numbered() {
        let stmt = SelectQuery::new("public.orders")
            .columns(["id", "total"])
            .eq("status", "open")
            .between("created_at", "2024-01-01", "2024-01-31")
            .build(Dialect::Postgresql)
            .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT id, total FROM public.orders WHERE status = $1 AND created_at BETWEEN $2 AND $3"
        );
        assert_eq!(
            stmt.params,
            vec![json!("open"), json!("2024-01-01"), json!("2024-01-31")]
        );
    }

    #[test]
    fn test_mysql_and_sqlserver_placeholders() {
        let query = SelectQuery::new("orders").eq("id", 7);
        assert_eq!(
            query.build(Dialect::Mysql).unwrap().sql,
            "SELECT * FROM orders WHERE id = ?"
        );
        assert_eq!(
            query.build(Dialect::Sqlserver).unwrap().sql,
            "SELECT * FROM orders WHERE id = @p1"
        );
    }

    #[test]
    fn test_rejects_injection_in_identifiers() {
        assert!(SelectQuery::new("orders; DROP TABLE x")
            .build(Dialect::Postgresql)
            .is_err());
        assert!(SelectQuery::new("orders")
            .columns(["id", "1=1 --"])
            .build(Dialect::Postgresql)
            .is_err());
        assert!(SelectQuery::new("orders")
            .eq("id OR 1", 1)
            .build(Dialect::Postgresql)
            .is_err());
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("t", "_private").is_ok());
        assert!(validate_identifier("t", "schema.table_2").is_ok());
        assert!(validate_identifier("t", "").is_err());
        assert!(validate_identifier("t", "2fast").is_err());
    }
}
