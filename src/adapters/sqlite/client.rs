//! SQLite client implementation
//!
//! `rusqlite` is synchronous, so every call runs on the blocking pool with the
//! connection guarded by a `tokio::sync::Mutex`.

use crate::adapters::database::traits::{MigrationDatabase, Row, SqlValue, Vendor};
use crate::domain::{CairnError, Result};
use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Path value that opens a private in-memory database
pub const MEMORY_PATH: &str = ":memory:";

/// SQLite session used by the migration engine
pub struct SqliteDatabase {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDatabase {
    /// Opens (creating if needed) the database at `path`
    ///
    /// Foreign keys are enforced and `busy_timeout` makes writers wait for a
    /// concurrent process instead of failing with `SQLITE_BUSY`.
    ///
    /// # Errors
    ///
    /// Returns [`CairnError::Database`] if the file cannot be opened or
    /// configured.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = if path.as_os_str() == MEMORY_PATH {
            Connection::open_in_memory()
        } else {
            Connection::open(&path)
        }
        .map_err(|e| CairnError::Database(format!("SQLite open failed: {e}")))?;

        conn.busy_timeout(busy_timeout)
            .map_err(|e| CairnError::Database(format!("Failed to set busy timeout: {e}")))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| CairnError::Database(format!("Failed to set pragmas: {e}")))?;

        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Database file path, or `:memory:`
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn bind_params(stmt: &mut rusqlite::Statement<'_>, params: &[SqlValue]) -> Result<()> {
        let expected = stmt.parameter_count();
        if expected != params.len() {
            return Err(CairnError::Database(format!(
                "Statement expects {expected} parameters, {} given",
                params.len()
            )));
        }

        for (i, param) in params.iter().enumerate() {
            let idx = i + 1;
            match param {
                SqlValue::Null => stmt.raw_bind_parameter(idx, rusqlite::types::Null),
                SqlValue::Bool(b) => stmt.raw_bind_parameter(idx, b),
                SqlValue::Int(v) => stmt.raw_bind_parameter(idx, v),
                SqlValue::Text(s) => stmt.raw_bind_parameter(idx, s.as_str()),
                SqlValue::Timestamp(ts) => stmt.raw_bind_parameter(idx, ts.to_rfc3339()),
            }
            .map_err(|e| CairnError::Database(format!("Bind error: {e}")))?;
        }
        Ok(())
    }

    fn convert_row(sqlite_row: &rusqlite::Row<'_>, column_names: &[String]) -> Row {
        let values = (0..column_names.len())
            .map(|i| match sqlite_row.get_ref(i).unwrap_or(ValueRef::Null) {
                ValueRef::Null => SqlValue::Null,
                ValueRef::Integer(v) => SqlValue::Int(v),
                ValueRef::Real(v) => SqlValue::Text(v.to_string()),
                ValueRef::Text(b) | ValueRef::Blob(b) => {
                    SqlValue::Text(String::from_utf8_lossy(b).to_string())
                }
            })
            .collect();

        Row::new(column_names.to_vec(), values)
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            f(&conn)
        })
        .await
        .map_err(|e| CairnError::Database(format!("Task join error: {e}")))?
    }
}

#[async_trait]
impl MigrationDatabase for SqliteDatabase {
    fn vendor(&self) -> Vendor {
        Vendor::Sqlite
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let sql = sql.to_string();
        let params = params.to_vec();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            Self::bind_params(&mut stmt, &params)?;
            let count = stmt.raw_execute()?;
            Ok(count as u64)
        })
        .await
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let sql = sql.to_string();
        let params = params.to_vec();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let column_names: Vec<String> =
                stmt.column_names().into_iter().map(String::from).collect();
            Self::bind_params(&mut stmt, &params)?;

            let mut raw_rows = stmt.raw_query();
            let mut rows = Vec::new();
            while let Some(row) = raw_rows.next()? {
                rows.push(Self::convert_row(row, &column_names));
            }
            Ok(rows)
        })
        .await
    }

    async fn batch_execute(&self, sql: &str) -> Result<()> {
        let sql = sql.to_string();
        self.with_conn(move |conn| Ok(conn.execute_batch(&sql)?))
            .await
    }

    // Changeset transactions always write; reserve the write lock at BEGIN
    async fn begin(&self) -> Result<()> {
        self.batch_execute("BEGIN IMMEDIATE").await
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let rows = self
            .query(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND lower(name) = lower(?1)",
                &[SqlValue::Text(table.to_string())],
            )
            .await?;
        Ok(!rows.is_empty())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let SqliteDatabase { path, conn } = *self;
        let conn = Arc::try_unwrap(conn)
            .map_err(|_| CairnError::Database(format!("{} is still in use", path.display())))?
            .into_inner();
        tokio::task::spawn_blocking(move || conn.close().map_err(|(_, e)| e))
            .await
            .map_err(|e| CairnError::Database(format!("Task join error: {e}")))??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn memory() -> SqliteDatabase {
        SqliteDatabase::open(MEMORY_PATH, Duration::from_millis(100)).unwrap()
    }

    #[tokio::test]
    async fn test_execute_and_query_round_trip() {
        let db = memory();
        db.batch_execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT, flag INTEGER, at TEXT)")
            .await
            .unwrap();

        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let inserted = db
            .execute(
                "INSERT INTO t (id, name, flag, at) VALUES (?1, ?2, ?3, ?4)",
                &[
                    SqlValue::Int(1),
                    SqlValue::from("Clinic"),
                    SqlValue::Bool(true),
                    SqlValue::Timestamp(at),
                ],
            )
            .await
            .unwrap();
        assert_eq!(inserted, 1);

        let rows = db.query("SELECT id, name, flag, at FROM t", &[]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_i64("id").unwrap(), 1);
        assert_eq!(rows[0].get_str("name").unwrap(), "Clinic");
        assert!(rows[0].get_bool("flag").unwrap());
        assert_eq!(rows[0].get_timestamp("at").unwrap(), at);
    }

    #[tokio::test]
    async fn test_parameter_count_is_checked() {
        let db = memory();
        let err = db.query("SELECT ?1", &[]).await.unwrap_err();
        assert!(err.to_string().contains("expects 1 parameters"));
    }

    #[tokio::test]
    async fn test_rollback_discards_changes() {
        let db = memory();
        db.batch_execute("CREATE TABLE t (id INTEGER)").await.unwrap();
        db.begin().await.unwrap();
        db.execute("INSERT INTO t VALUES (1)", &[]).await.unwrap();
        db.rollback().await.unwrap();

        let rows = db.query("SELECT id FROM t", &[]).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_table_exists_and_close() {
        let db = memory();
        assert!(!db.table_exists("person").await.unwrap());
        db.batch_execute("CREATE TABLE person (person_id INTEGER)").await.unwrap();
        assert!(db.table_exists("PERSON").await.unwrap());
        Box::new(db).close().await.unwrap();
    }
}
