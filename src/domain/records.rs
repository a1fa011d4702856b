//! Persisted records and operator-facing summaries
//!
//! [`LedgerEntry`] and [`LockRecord`] mirror the rows of the two tables Cairn
//! owns in the target database. [`PendingChangeSet`] is what the
//! administrative wizard displays before an update.

use super::changeset::{ChangeSet, ChangeSetId, RunStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a ledger entry came to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecType {
    /// First successful execution
    Executed,
    /// Executed again (run_always or run_on_change)
    Reran,
}

impl ExecType {
    /// Value stored in the ledger table
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecType::Executed => "EXECUTED",
            ExecType::Reran => "RERAN",
        }
    }
}

impl fmt::Display for ExecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EXECUTED" => Ok(ExecType::Executed),
            "RERAN" => Ok(ExecType::Reran),
            other => Err(format!("Unknown exec type: {other}")),
        }
    }
}

/// One row of the ledger table: a changeset that committed successfully
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Changeset identity
    pub identity: ChangeSetId,
    /// When the changeset last executed
    pub date_executed: DateTime<Utc>,
    /// Commit sequence number, strictly increasing
    pub order_executed: i64,
    /// Checksum of the changeset at execution time
    pub checksum: String,
    /// Description at execution time
    pub description: Option<String>,
    /// Author comments at execution time
    pub comments: Option<String>,
    /// First execution or re-run
    pub exec_type: ExecType,
    /// Contexts declared on the changeset, comma-separated
    pub contexts: Option<String>,
}

/// The singleton lock row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Whether a migration run currently holds the lock
    pub locked: bool,
    /// When the lock was granted
    pub lock_granted: Option<DateTime<Utc>>,
    /// Owner description
    pub locked_by: Option<String>,
}

/// Summary of a changeset that still needs to run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChangeSet {
    /// Changeset id
    pub id: String,
    /// Changeset author
    pub author: String,
    /// Changelog file
    pub file: String,
    /// Author comments
    pub comments: Option<String>,
    /// Derived description
    pub description: String,
    /// Status against the ledger
    pub run_status: RunStatus,
    /// Last execution date, if it ever ran
    pub ran_date: Option<DateTime<Utc>>,
}

impl PendingChangeSet {
    /// Builds the summary from a changeset and its ledger entry, if any
    pub fn from_change_set(change_set: &ChangeSet, entry: Option<&LedgerEntry>) -> Self {
        let run_status = match entry {
            None => RunStatus::NotRun,
            Some(e) if e.checksum.is_empty() || e.checksum == change_set.checksum() => {
                RunStatus::Ran
            }
            Some(_) => RunStatus::RanButChanged,
        };

        Self {
            id: change_set.id().to_string(),
            author: change_set.author().to_string(),
            file: change_set.file().to_string(),
            comments: change_set.comments.clone(),
            description: change_set.description(),
            run_status,
            ran_date: entry.map(|e| e.date_executed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChangeSetBuilder;

    fn entry_for(change_set: &ChangeSet, checksum: String) -> LedgerEntry {
        LedgerEntry {
            identity: change_set.identity.clone(),
            date_executed: Utc::now(),
            order_executed: 1,
            checksum,
            description: None,
            comments: None,
            exec_type: ExecType::Executed,
            contexts: None,
        }
    }

    #[test]
    fn test_exec_type_round_trip() {
        assert_eq!("EXECUTED".parse::<ExecType>().unwrap(), ExecType::Executed);
        assert_eq!(ExecType::Reran.as_str(), "RERAN");
        assert!("MARK_RAN".parse::<ExecType>().is_err());
    }

    #[test]
    fn test_pending_summary_status() {
        let change_set = ChangeSetBuilder::new("1", "alice", "core.toml")
            .sql("SELECT 1")
            .comments("first")
            .build();

        let not_run = PendingChangeSet::from_change_set(&change_set, None);
        assert_eq!(not_run.run_status, RunStatus::NotRun);
        assert!(not_run.ran_date.is_none());
        assert_eq!(not_run.comments.as_deref(), Some("first"));

        let ran = entry_for(&change_set, change_set.checksum());
        let summary = PendingChangeSet::from_change_set(&change_set, Some(&ran));
        assert_eq!(summary.run_status, RunStatus::Ran);
        assert!(summary.ran_date.is_some());

        let changed = entry_for(&change_set, "1:stale".to_string());
        let summary = PendingChangeSet::from_change_set(&change_set, Some(&changed));
        assert_eq!(summary.run_status, RunStatus::RanButChanged);
    }
}
