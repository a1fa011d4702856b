//! Database abstraction traits
//!
//! The migration engine talks to the target database only through
//! [`MigrationDatabase`]. Parameters travel as [`SqlValue`] and results come
//! back as [`Row`], so neither the engine nor custom changes see driver types.

use crate::domain::{CairnError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::fmt;

/// Supported database vendors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vendor {
    /// PostgreSQL via tokio-postgres
    PostgreSql,
    /// SQLite via rusqlite
    Sqlite,
}

impl Vendor {
    /// Name matched against a changeset's `dbms` list
    pub fn name(&self) -> &'static str {
        match self {
            Vendor::PostgreSql => "postgresql",
            Vendor::Sqlite => "sqlite",
        }
    }

    /// Positional parameter placeholder, 1-based
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Vendor::PostgreSql => format!("${n}"),
            Vendor::Sqlite => format!("?{n}"),
        }
    }

    /// Column type used for flags
    pub fn boolean_type(&self) -> &'static str {
        match self {
            Vendor::PostgreSql => "BOOLEAN",
            Vendor::Sqlite => "INTEGER",
        }
    }

    /// Column type used for instants
    pub fn timestamp_type(&self) -> &'static str {
        match self {
            Vendor::PostgreSql => "TIMESTAMP WITH TIME ZONE",
            Vendor::Sqlite => "TEXT",
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A bound parameter or a fetched column value
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL
    Null,
    /// Boolean flag
    Bool(bool),
    /// Any integer width
    Int(i64),
    /// Character data
    Text(String),
    /// Instant in UTC
    Timestamp(DateTime<Utc>),
}

impl SqlValue {
    /// Whether the value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(value: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}

/// Parses the textual timestamp forms SQLite stores
pub(crate) fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// One result row with column names
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl Row {
    /// Creates a row from parallel column and value lists
    pub fn new(columns: Vec<String>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    /// Column names in select order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Raw value of a column, matched case-insensitively
    pub fn value(&self, column: &str) -> Result<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|idx| self.values.get(idx))
            .ok_or_else(|| CairnError::Database(format!("Column '{column}' not in result row")))
    }

    fn type_error(column: &str, expected: &str, found: &SqlValue) -> CairnError {
        CairnError::Database(format!(
            "Column '{column}' expected {expected}, found {found:?}"
        ))
    }

    /// Integer column
    pub fn get_i64(&self, column: &str) -> Result<i64> {
        match self.value(column)? {
            SqlValue::Int(v) => Ok(*v),
            SqlValue::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| Self::type_error(column, "integer", &SqlValue::Text(s.clone()))),
            other => Err(Self::type_error(column, "integer", other)),
        }
    }

    /// Nullable integer column
    pub fn get_opt_i64(&self, column: &str) -> Result<Option<i64>> {
        match self.value(column)? {
            SqlValue::Null => Ok(None),
            _ => self.get_i64(column).map(Some),
        }
    }

    /// Non-null text column
    pub fn get_str(&self, column: &str) -> Result<String> {
        self.get_opt_str(column)?
            .ok_or_else(|| Self::type_error(column, "text", &SqlValue::Null))
    }

    /// Nullable text column
    pub fn get_opt_str(&self, column: &str) -> Result<Option<String>> {
        match self.value(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Text(s) => Ok(Some(s.clone())),
            SqlValue::Int(v) => Ok(Some(v.to_string())),
            other => Err(Self::type_error(column, "text", other)),
        }
    }

    /// Flag column; SQLite stores flags as integers
    pub fn get_bool(&self, column: &str) -> Result<bool> {
        match self.value(column)? {
            SqlValue::Bool(b) => Ok(*b),
            SqlValue::Int(v) => Ok(*v != 0),
            SqlValue::Null => Ok(false),
            SqlValue::Text(s) => match s.to_ascii_lowercase().as_str() {
                "1" | "t" | "true" => Ok(true),
                "0" | "f" | "false" => Ok(false),
                _ => Err(Self::type_error(column, "boolean", &SqlValue::Text(s.clone()))),
            },
            other => Err(Self::type_error(column, "boolean", other)),
        }
    }

    /// Nullable timestamp column; SQLite stores timestamps as text
    pub fn get_opt_timestamp(&self, column: &str) -> Result<Option<DateTime<Utc>>> {
        match self.value(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Timestamp(ts) => Ok(Some(*ts)),
            SqlValue::Text(s) => parse_timestamp(s)
                .map(Some)
                .ok_or_else(|| Self::type_error(column, "timestamp", &SqlValue::Text(s.clone()))),
            other => Err(Self::type_error(column, "timestamp", other)),
        }
    }

    /// Non-null timestamp column
    pub fn get_timestamp(&self, column: &str) -> Result<DateTime<Utc>> {
        self.get_opt_timestamp(column)?
            .ok_or_else(|| Self::type_error(column, "timestamp", &SqlValue::Null))
    }
}

/// A single raw connection to the database being migrated
///
/// Implementations run statements on one session so that `begin`, the
/// statements of a changeset, and `commit` share a transaction.
#[async_trait]
pub trait MigrationDatabase: Send + Sync {
    /// Vendor of the connected database
    fn vendor(&self) -> Vendor;

    /// Executes one statement and returns the number of affected rows
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    /// Runs one query and returns all rows
    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>>;

    /// Executes several `;`-separated statements without parameters
    async fn batch_execute(&self, sql: &str) -> Result<()>;

    /// Whether a table exists in the current schema
    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// Starts a transaction
    async fn begin(&self) -> Result<()> {
        self.batch_execute("BEGIN").await
    }

    /// Commits the open transaction
    async fn commit(&self) -> Result<()> {
        self.batch_execute("COMMIT").await
    }

    /// Rolls back the open transaction
    async fn rollback(&self) -> Result<()> {
        self.batch_execute("ROLLBACK").await
    }

    /// Closes the connection
    async fn close(self: Box<Self>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(values: Vec<SqlValue>) -> Row {
        let columns = (0..values.len()).map(|i| format!("c{i}")).collect();
        Row::new(columns, values)
    }

    #[test]
    fn test_vendor_placeholders() {
        assert_eq!(Vendor::PostgreSql.placeholder(2), "$2");
        assert_eq!(Vendor::Sqlite.placeholder(2), "?2");
        assert_eq!(Vendor::Sqlite.to_string(), "sqlite");
    }

    #[test]
    fn test_row_lookup_is_case_insensitive() {
        let r = Row::new(vec!["LOCKED".to_string()], vec![SqlValue::Int(1)]);
        assert!(r.get_bool("locked").unwrap());
        assert!(r.value("missing").is_err());
    }

    #[test]
    fn test_get_bool_accepts_vendor_forms() {
        let r = row(vec![
            SqlValue::Bool(true),
            SqlValue::Int(0),
            SqlValue::Text("t".to_string()),
            SqlValue::Null,
        ]);
        assert!(r.get_bool("c0").unwrap());
        assert!(!r.get_bool("c1").unwrap());
        assert!(r.get_bool("c2").unwrap());
        assert!(!r.get_bool("c3").unwrap());
    }

    #[test]
    fn test_get_timestamp_accepts_text() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let r = row(vec![
            SqlValue::Text("2024-05-01T12:30:00+00:00".to_string()),
            SqlValue::Text("2024-05-01 12:30:00".to_string()),
            SqlValue::Timestamp(expected),
            SqlValue::Null,
        ]);
        assert_eq!(r.get_timestamp("c0").unwrap(), expected);
        assert_eq!(r.get_timestamp("c1").unwrap(), expected);
        assert_eq!(r.get_timestamp("c2").unwrap(), expected);
        assert_eq!(r.get_opt_timestamp("c3").unwrap(), None);
        assert!(r.get_timestamp("c3").is_err());
    }

    #[test]
    fn test_get_str_and_i64() {
        let r = row(vec![
            SqlValue::Text("Clinic".to_string()),
            SqlValue::Int(7),
            SqlValue::Null,
        ]);
        assert_eq!(r.get_str("c0").unwrap(), "Clinic");
        assert_eq!(r.get_i64("c1").unwrap(), 7);
        assert_eq!(r.get_opt_str("c2").unwrap(), None);
        assert!(r.get_i64("c0").is_err());
    }

    #[test]
    fn test_sql_value_from_option() {
        assert_eq!(SqlValue::from(None::<i64>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some(3_i64)), SqlValue::Int(3));
    }
}
