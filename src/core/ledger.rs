//! Ledger of applied changesets
//!
//! The ledger table holds one row per changeset that committed. Rows are
//! written inside the same transaction as the changeset itself, so the table
//! reflects exactly the committed set, ordered by `order_executed`.

use crate::adapters::database::{MigrationDatabase, Row, SqlValue};
use crate::domain::{
    CairnError, ChangeSet, ChangeSetId, ExecType, LedgerEntry, Result, RunStatus,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Name of the ledger table
pub const LEDGER_TABLE: &str = "cairn_changelog";

const LEDGER_COLUMNS: &str = "id, author, filename, date_executed, order_executed, \
                              checksum, description, comments, exec_type, contexts";

/// Reads and writes the ledger table over one connection
pub struct LedgerService<'a> {
    db: &'a dyn MigrationDatabase,
}

impl<'a> LedgerService<'a> {
    /// Creates a ledger service on `db`
    pub fn new(db: &'a dyn MigrationDatabase) -> Self {
        Self { db }
    }

    /// Creates the ledger table if it does not exist
    pub async fn ensure_table(&self) -> Result<()> {
        let vendor = self.db.vendor();
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {LEDGER_TABLE} (
                id VARCHAR(255) NOT NULL,
                author VARCHAR(255) NOT NULL,
                filename VARCHAR(1024) NOT NULL,
                date_executed {ts} NOT NULL,
                order_executed INTEGER NOT NULL,
                exec_type VARCHAR(10) NOT NULL,
                checksum VARCHAR(80),
                description TEXT,
                comments TEXT,
                contexts VARCHAR(255),
                PRIMARY KEY (id, author, filename)
            )",
            ts = vendor.timestamp_type()
        );
        self.db.batch_execute(&ddl).await
    }

    /// All ledger entries ordered by execution; empty when the table is missing
    pub async fn applied(&self) -> Result<Vec<LedgerEntry>> {
        if !self.db.table_exists(LEDGER_TABLE).await? {
            return Ok(Vec::new());
        }

        let rows = self
            .db
            .query(
                &format!("SELECT {LEDGER_COLUMNS} FROM {LEDGER_TABLE} ORDER BY order_executed"),
                &[],
            )
            .await?;

        rows.iter().map(entry_from_row).collect()
    }

    async fn next_order(&self) -> Result<i64> {
        let rows = self
            .db
            .query(
                &format!("SELECT COALESCE(MAX(order_executed), 0) AS max_order FROM {LEDGER_TABLE}"),
                &[],
            )
            .await?;
        let max = match rows.first() {
            Some(row) => row.get_i64("max_order")?,
            None => 0,
        };
        Ok(max + 1)
    }

    /// Records a successful execution of `change_set`
    ///
    /// [`ExecType::Reran`] updates the existing row; [`ExecType::Executed`]
    /// inserts a new one. Either way the row moves to the end of the order.
    pub async fn record(&self, change_set: &ChangeSet, exec_type: ExecType) -> Result<LedgerEntry> {
        let vendor = self.db.vendor();
        let entry = LedgerEntry {
            identity: change_set.identity.clone(),
            date_executed: Utc::now(),
            order_executed: self.next_order().await?,
            checksum: change_set.checksum(),
            description: Some(change_set.description()),
            comments: change_set.comments.clone(),
            exec_type,
            contexts: (!change_set.contexts.is_empty()).then(|| change_set.contexts.join(",")),
        };

        let p: Vec<String> = (1..=10).map(|n| vendor.placeholder(n)).collect();
        let sql = match exec_type {
            ExecType::Executed => format!(
                "INSERT INTO {LEDGER_TABLE} (date_executed, order_executed, checksum, description, \
                 comments, exec_type, contexts, id, author, filename) \
                 VALUES ({}, {}, {}, {}, {}, {}, {}, {}, {}, {})",
                p[0], p[1], p[2], p[3], p[4], p[5], p[6], p[7], p[8], p[9]
            ),
            ExecType::Reran => format!(
                "UPDATE {LEDGER_TABLE} SET date_executed = {}, order_executed = {}, checksum = {}, \
                 description = {}, comments = {}, exec_type = {}, contexts = {} \
                 WHERE id = {} AND author = {} AND filename = {}",
                p[0], p[1], p[2], p[3], p[4], p[5], p[6], p[7], p[8], p[9]
            ),
        };

        let affected = self
            .db
            .execute(
                &sql,
                &[
                    SqlValue::Timestamp(entry.date_executed),
                    SqlValue::Int(entry.order_executed),
                    SqlValue::from(entry.checksum.as_str()),
                    SqlValue::from(entry.description.clone()),
                    SqlValue::from(entry.comments.clone()),
                    SqlValue::from(exec_type.as_str()),
                    SqlValue::from(entry.contexts.clone()),
                    SqlValue::from(entry.identity.id.as_str()),
                    SqlValue::from(entry.identity.author.as_str()),
                    SqlValue::from(entry.identity.file.as_str()),
                ],
            )
            .await?;

        if affected != 1 {
            return Err(CairnError::Database(format!(
                "Ledger write for {} affected {affected} rows",
                entry.identity
            )));
        }

        Ok(entry)
    }
}

fn entry_from_row(row: &Row) -> Result<LedgerEntry> {
    let exec_type = row
        .get_str("exec_type")?
        .parse::<ExecType>()
        .map_err(CairnError::Database)?;

    Ok(LedgerEntry {
        identity: ChangeSetId::new(
            row.get_str("id")?,
            row.get_str("author")?,
            row.get_str("filename")?,
        ),
        date_executed: row.get_timestamp("date_executed")?,
        order_executed: row.get_i64("order_executed")?,
        checksum: row.get_opt_str("checksum")?.unwrap_or_default(),
        description: row.get_opt_str("description")?,
        comments: row.get_opt_str("comments")?,
        exec_type,
        contexts: row.get_opt_str("contexts")?,
    })
}

/// Ledger entries indexed by changeset identity
#[derive(Debug, Clone, Default)]
pub struct AppliedChangeSets {
    entries: HashMap<ChangeSetId, LedgerEntry>,
}

impl AppliedChangeSets {
    /// Indexes ledger entries
    pub fn new(entries: Vec<LedgerEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|entry| (entry.identity.clone(), entry))
                .collect(),
        }
    }

    /// Ledger entry for a changeset, if it ran
    pub fn get(&self, identity: &ChangeSetId) -> Option<&LedgerEntry> {
        self.entries.get(identity)
    }

    /// Whether the changeset has a ledger entry
    pub fn contains(&self, identity: &ChangeSetId) -> bool {
        self.entries.contains_key(identity)
    }

    /// Status of a changeset against the ledger
    pub fn run_status(&self, change_set: &ChangeSet) -> RunStatus {
        match self.get(&change_set.identity) {
            None => RunStatus::NotRun,
            Some(entry) if entry.checksum.is_empty() || entry.checksum == change_set.checksum() => {
                RunStatus::Ran
            }
            Some(_) => RunStatus::RanButChanged,
        }
    }

    /// When the changeset last ran
    pub fn ran_date(&self, change_set: &ChangeSet) -> Option<DateTime<Utc>> {
        self.get(&change_set.identity).map(|e| e.date_executed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{SqliteDatabase, MEMORY_PATH};
    use crate::domain::ChangeSetBuilder;
    use std::time::Duration;

    fn memory() -> SqliteDatabase {
        SqliteDatabase::open(MEMORY_PATH, Duration::from_millis(100)).unwrap()
    }

    fn change_set(id: &str, sql: &str) -> ChangeSet {
        ChangeSetBuilder::new(id, "alice", "core.toml")
            .sql(sql)
            .context("core")
            .build()
    }

    #[tokio::test]
    async fn test_applied_is_empty_without_table() {
        let db = memory();
        let ledger = LedgerService::new(&db);
        assert!(ledger.applied().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_orders_entries() {
        let db = memory();
        let ledger = LedgerService::new(&db);
        ledger.ensure_table().await.unwrap();
        ledger.ensure_table().await.unwrap();

        let a = change_set("a", "SELECT 1");
        let b = change_set("b", "SELECT 2");
        ledger.record(&a, ExecType::Executed).await.unwrap();
        ledger.record(&b, ExecType::Executed).await.unwrap();

        let applied = ledger.applied().await.unwrap();
        assert_eq!(applied.len(), 2);
        assert_eq!(applied[0].identity, a.identity);
        assert_eq!(applied[0].order_executed, 1);
        assert_eq!(applied[1].order_executed, 2);
        assert_eq!(applied[1].contexts.as_deref(), Some("core"));
        assert_eq!(applied[1].description.as_deref(), Some("sql"));
    }

    #[tokio::test]
    async fn test_rerun_moves_entry_to_end() {
        let db = memory();
        let ledger = LedgerService::new(&db);
        ledger.ensure_table().await.unwrap();

        let a = change_set("a", "SELECT 1");
        let b = change_set("b", "SELECT 2");
        ledger.record(&a, ExecType::Executed).await.unwrap();
        ledger.record(&b, ExecType::Executed).await.unwrap();
        ledger.record(&a, ExecType::Reran).await.unwrap();

        let applied = ledger.applied().await.unwrap();
        assert_eq!(applied.len(), 2);
        assert_eq!(applied[1].identity, a.identity);
        assert_eq!(applied[1].exec_type, ExecType::Reran);
        assert_eq!(applied[1].order_executed, 3);
    }

    #[tokio::test]
    async fn test_duplicate_insert_fails() {
        let db = memory();
        let ledger = LedgerService::new(&db);
        ledger.ensure_table().await.unwrap();

        let a = change_set("a", "SELECT 1");
        ledger.record(&a, ExecType::Executed).await.unwrap();
        assert!(ledger.record(&a, ExecType::Executed).await.is_err());
    }

    #[tokio::test]
    async fn test_run_status_against_ledger() {
        let db = memory();
        let ledger = LedgerService::new(&db);
        ledger.ensure_table().await.unwrap();

        let a = change_set("a", "SELECT 1");
        ledger.record(&a, ExecType::Executed).await.unwrap();
        let applied = AppliedChangeSets::new(ledger.applied().await.unwrap());

        assert_eq!(applied.run_status(&a), RunStatus::Ran);
        assert!(applied.ran_date(&a).is_some());
        assert_eq!(
            applied.run_status(&change_set("a", "SELECT 42")),
            RunStatus::RanButChanged
        );
        assert_eq!(applied.run_status(&change_set("z", "SELECT 1")), RunStatus::NotRun);
    }
}
