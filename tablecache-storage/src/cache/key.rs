//! Deterministic cache key derivation.
//!
//! A key is a colon-delimited sequence of segments in fixed order:
//!
//! ```text
//! prefix : table [ : identifier ] [ : from=YYYYMMDD : to=YYYYMMDD ] [ : extra ]
//! ```
//!
//! Omitted segments leave no trace, so a key never contains `::`. Free-form
//! segments are percent-encoded, so a value containing `:` cannot forge an
//! extra segment.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tablecache_core::{CachedTableDescriptor, KeyError};

/// Segment delimiter.
pub const KEY_DELIMITER: char = ':';

/// A derived cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn segments(&self) -> Vec<&str> {
        self.0.split(KEY_DELIMITER).collect()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

/// Builder for [`CacheKey`].
///
/// ```ignore
/// let key = CacheKeyBuilder::new("cache")
///     .table("orders")
///     .identifier(42)
///     .date_range(Some(jan_1), Some(jan_31))
///     .build()?;
/// assert_eq!(key.as_str(), "cache:orders:42:from=20240101:to=20240131");
/// ```
#[derive(Debug, Clone, Default)]
pub struct CacheKeyBuilder {
    prefix: String,
    table: Option<String>,
    identifier: Option<String>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    extra: Option<String>,
}

impl CacheKeyBuilder {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    /// Builder seeded with a cached table's name and owning connection.
    ///
    /// The connection id fills the identifier slot, so same-named tables on
    /// different connections never share a key.
    pub fn for_table(prefix: impl Into<String>, table: &CachedTableDescriptor) -> Self {
        Self::new(prefix)
            .table(table.table_name.clone())
            .identifier(table.connection_id)
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn identifier(mut self, identifier: impl ToString) -> Self {
        self.identifier = Some(identifier.to_string());
        self
    }

    /// Date scoping. Rendered only when both ends are present.
    pub fn date_range(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub fn extra(mut self, extra: impl ToString) -> Self {
        self.extra = Some(extra.to_string());
        self
    }

    pub fn build(&self) -> Result<CacheKey, KeyError> {
        if self.prefix.contains(KEY_DELIMITER) {
            return Err(KeyError::InvalidInput {
                field: "prefix".to_string(),
                reason: format!("prefix must not contain '{}'", KEY_DELIMITER),
            });
        }

        let table = self
            .table
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| KeyError::InvalidInput {
                field: "table_name".to_string(),
                reason: "table name is required".to_string(),
            })?;

        let mut segments: Vec<String> = Vec::with_capacity(6);
        if !self.prefix.trim().is_empty() {
            segments.push(self.prefix.clone());
        }
        segments.push(encode_segment(table));

        if let Some(identifier) = non_blank(&self.identifier) {
            segments.push(encode_segment(identifier));
        }

        if let (Some(start), Some(end)) = (self.start, self.end) {
            segments.push(format!("from={}", start.format("%Y%m%d")));
            segments.push(format!("to={}", end.format("%Y%m%d")));
        }

        if let Some(extra) = non_blank(&self.extra) {
            segments.push(encode_segment(extra));
        }

        Ok(CacheKey(segments.join(":")))
    }
}

/// Build a key from its parts in one call.
pub fn build_key(
    prefix: &str,
    table: &str,
    identifier: Option<&str>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    extra: Option<&str>,
) -> Result<CacheKey, KeyError> {
    let mut builder = CacheKeyBuilder::new(prefix)
        .table(table)
        .date_range(start, end);
    if let Some(identifier) = identifier {
        builder = builder.identifier(identifier);
    }
    if let Some(extra) = extra {
        builder = builder.extra(extra);
    }
    builder.build()
}

/// Glob matching every scoped key under a cached table's own key
/// (`prefix:table:connection:*`). Entries of same-named tables on other
/// connections do not match.
pub fn table_pattern(prefix: &str, table: &CachedTableDescriptor) -> String {
    let scope = format!(
        "{}:{}:*",
        encode_segment(&table.table_name),
        table.connection_id
    );
    if prefix.trim().is_empty() {
        scope
    } else {
        format!("{}:{}", prefix, scope)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn encode_segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    /// Non-blank free-form values, delimiters included.
    fn segment_strategy() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9:%/_.-][a-zA-Z0-9 :%/_.-]{0,23}"
    }

    fn date_strategy() -> impl Strategy<Value = Option<NaiveDate>> {
        proptest::option::of(
            (2000i32..2038, 1u32..=12, 1u32..=28)
                .prop_filter_map("valid date", |(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        /// Property: the same inputs always derive the same key.
        #[test]
        fn prop_derivation_is_deterministic(
            table in "[a-z_][a-z0-9_]{0,15}",
            identifier in proptest::option::of(segment_strategy()),
            start in date_strategy(),
            end in date_strategy(),
            extra in proptest::option::of(segment_strategy()),
        ) {
            let first = build_key("cache", &table, identifier.as_deref(), start, end, extra.as_deref());
            let second = build_key("cache", &table, identifier.as_deref(), start, end, extra.as_deref());
            prop_assert_eq!(first.ok(), second.ok());
        }

        /// Property: one segment per present component, none of them empty.
        #[test]
        fn prop_segment_count_matches_components(
            table in segment_strategy(),
            identifier in proptest::option::of(segment_strategy()),
            start in date_strategy(),
            end in date_strategy(),
            extra in proptest::option::of(segment_strategy()),
        ) {
            let key = build_key("cache", &table, identifier.as_deref(), start, end, extra.as_deref())
                .map_err(|e| TestCaseError::fail(e.to_string()))?;

            let mut expected = 2;
            if identifier.is_some() {
                expected += 1;
            }
            if start.is_some() && end.is_some() {
                expected += 2;
            }
            if extra.is_some() {
                expected += 1;
            }

            prop_assert_eq!(key.segments().len(), expected);
            prop_assert!(key.segments().iter().all(|s| !s.is_empty()));
            prop_assert!(!key.as_str().contains("::"));
        }

        /// Property: distinct identifiers never collide, delimiters or not.
        #[test]
        fn prop_identifiers_do_not_collide(a in segment_strategy(), b in segment_strategy()) {
            prop_assume!(a != b);
            let key_a = CacheKeyBuilder::new("cache").table("orders").identifier(&a).build();
            let key_b = CacheKeyBuilder::new("cache").table("orders").identifier(&b).build();
            prop_assert_ne!(key_a.ok(), key_b.ok());
        }
    }
}
