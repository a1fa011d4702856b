//! Lock coordination
//!
//! A singleton row in the lock table acts as a cooperative mutex between
//! migration runs. Acquisition is a conditional `UPDATE` that succeeds only
//! while the row is unlocked; contenders poll until the wait timeout.
//!
//! ```text
//! UNLOCKED --acquire--> LOCKED --release / force_release--> UNLOCKED
//! ```

use crate::adapters::database::{MigrationDatabase, SqlValue};
use crate::config::LockConfig;
use crate::domain::{LockError, LockRecord, Result};
use chrono::Utc;
use std::time::{Duration, Instant};

/// Name of the lock table
pub const LOCK_TABLE: &str = "cairn_changelog_lock";

const LOCK_ROW_ID: i64 = 1;

/// Describes this process for the `locked_by` column
pub fn lock_owner() -> String {
    let host = std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .ok()
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| "cairn".to_string());
    let run = uuid::Uuid::new_v4().simple().to_string();
    format!("{host} ({}) {}", std::process::id(), &run[..8])
}

/// Acquires and releases the migration lock over one connection
pub struct LockCoordinator<'a> {
    db: &'a dyn MigrationDatabase,
    owner: String,
    wait_timeout: Duration,
    poll_interval: Duration,
    held: bool,
}

impl<'a> LockCoordinator<'a> {
    /// Creates a coordinator with the configured timeouts
    pub fn new(db: &'a dyn MigrationDatabase, config: &LockConfig) -> Self {
        Self {
            db,
            owner: lock_owner(),
            wait_timeout: config.wait_timeout(),
            poll_interval: config.poll_interval(),
            held: false,
        }
    }

    /// Owner string written while this coordinator holds the lock
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Whether this coordinator currently holds the lock
    pub fn holds_lock(&self) -> bool {
        self.held
    }

    /// Creates the lock table and its singleton row if missing
    ///
    /// Once both exist this only reads, so it does not wait on another
    /// connection's write transaction.
    pub async fn ensure_table(&self) -> Result<()> {
        let vendor = self.db.vendor();
        if !self.db.table_exists(LOCK_TABLE).await? {
            let ddl = format!(
                "CREATE TABLE IF NOT EXISTS {LOCK_TABLE} (
                    id INTEGER NOT NULL PRIMARY KEY,
                    locked {bool} NOT NULL,
                    lock_granted {ts},
                    locked_by VARCHAR(255)
                )",
                bool = vendor.boolean_type(),
                ts = vendor.timestamp_type()
            );
            self.db.batch_execute(&ddl).await?;
        }

        let rows = self
            .db
            .query(
                &format!(
                    "SELECT id FROM {LOCK_TABLE} WHERE id = {}",
                    vendor.placeholder(1)
                ),
                &[SqlValue::Int(LOCK_ROW_ID)],
            )
            .await?;
        if rows.is_empty() {
            self.db
                .execute(
                    &format!(
                        "INSERT INTO {LOCK_TABLE} (id, locked) VALUES ({}, FALSE) \
                         ON CONFLICT (id) DO NOTHING",
                        vendor.placeholder(1)
                    ),
                    &[SqlValue::Int(LOCK_ROW_ID)],
                )
                .await?;
        }
        Ok(())
    }

    /// One acquisition attempt; a busy database counts as not acquired
    async fn attempt(&self) -> Result<bool> {
        let result = match self.ensure_table().await {
            Ok(()) => self.try_acquire().await,
            Err(e) => Err(e),
        };
        match result {
            Err(e) if e.is_busy() => {
                tracing::debug!(error = %e, "Database busy while acquiring change log lock");
                Ok(false)
            }
            Err(e) => Err(LockError::Unavailable(e.to_string()).into()),
            other => other,
        }
    }

    async fn try_acquire(&self) -> Result<bool> {
        let v = self.db.vendor();
        let affected = self
            .db
            .execute(
                &format!(
                    "UPDATE {LOCK_TABLE} SET locked = {}, lock_granted = {}, locked_by = {} \
                     WHERE id = {} AND locked = {}",
                    v.placeholder(1),
                    v.placeholder(2),
                    v.placeholder(3),
                    v.placeholder(4),
                    v.placeholder(5)
                ),
                &[
                    SqlValue::Bool(true),
                    SqlValue::Timestamp(Utc::now()),
                    SqlValue::from(self.owner.as_str()),
                    SqlValue::Int(LOCK_ROW_ID),
                    SqlValue::Bool(false),
                ],
            )
            .await?;
        Ok(affected == 1)
    }

    /// Waits for the lock, polling until the wait timeout
    ///
    /// Creates the lock table on first use. A database kept busy by another
    /// connection's transaction is polled like a held lock.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Contention`] naming the current holder when the
    /// lock is not released in time.
    pub async fn acquire(&mut self) -> Result<()> {
        if self.held {
            return Ok(());
        }

        let started = Instant::now();
        loop {
            if self.attempt().await? {
                self.held = true;
                tracing::info!(owner = %self.owner, "Acquired change log lock");
                return Ok(());
            }

            let waited = started.elapsed();
            if waited >= self.wait_timeout {
                let current = match self.lock_record().await {
                    Ok(record) => record,
                    Err(e) if e.is_busy() => None,
                    Err(e) => return Err(e),
                };
                return Err(LockError::Contention {
                    locked_by: current.as_ref().and_then(|r| r.locked_by.clone()),
                    since: current.as_ref().and_then(|r| r.lock_granted),
                    waited_secs: waited.as_secs(),
                }
                .into());
            }

            tracing::debug!(
                waited_ms = waited.as_millis() as u64,
                "Change log lock held elsewhere, waiting"
            );
            tokio::time::sleep(self.poll_interval.min(self.wait_timeout - waited)).await;
        }
    }

    /// Releases the lock if this coordinator holds it
    pub async fn release(&mut self) -> Result<()> {
        if !self.held {
            return Ok(());
        }

        let v = self.db.vendor();
        self.db
            .execute(
                &format!(
                    "UPDATE {LOCK_TABLE} SET locked = {}, lock_granted = NULL, locked_by = NULL \
                     WHERE id = {} AND locked_by = {}",
                    v.placeholder(1),
                    v.placeholder(2),
                    v.placeholder(3)
                ),
                &[
                    SqlValue::Bool(false),
                    SqlValue::Int(LOCK_ROW_ID),
                    SqlValue::from(self.owner.as_str()),
                ],
            )
            .await
            .map_err(|e| LockError::ReleaseFailed(e.to_string()))?;

        self.held = false;
        tracing::info!(owner = %self.owner, "Released change log lock");
        Ok(())
    }

    /// Clears the lock regardless of who holds it
    ///
    /// Operator escape hatch after a crashed run; a missing lock table is not
    /// an error.
    pub async fn force_release(&mut self) -> Result<()> {
        if !self.db.table_exists(LOCK_TABLE).await? {
            return Ok(());
        }

        let v = self.db.vendor();
        self.db
            .execute(
                &format!(
                    "UPDATE {LOCK_TABLE} SET locked = {}, lock_granted = NULL, locked_by = NULL \
                     WHERE id = {}",
                    v.placeholder(1),
                    v.placeholder(2)
                ),
                &[SqlValue::Bool(false), SqlValue::Int(LOCK_ROW_ID)],
            )
            .await
            .map_err(|e| LockError::ReleaseFailed(e.to_string()))?;

        self.held = false;
        tracing::warn!("Change log lock forcibly released");
        Ok(())
    }

    /// The lock row, or `None` when the table does not exist yet
    pub async fn lock_record(&self) -> Result<Option<LockRecord>> {
        if !self.db.table_exists(LOCK_TABLE).await? {
            return Ok(None);
        }

        let rows = self
            .db
            .query(
                &format!(
                    "SELECT locked, lock_granted, locked_by FROM {LOCK_TABLE} WHERE id = {}",
                    self.db.vendor().placeholder(1)
                ),
                &[SqlValue::Int(LOCK_ROW_ID)],
            )
            .await?;

        rows.first()
            .map(|row| {
                Ok(LockRecord {
                    locked: row.get_bool("locked")?,
                    lock_granted: row.get_opt_timestamp("lock_granted")?,
                    locked_by: row.get_opt_str("locked_by")?,
                })
            })
            .transpose()
    }

    /// Locks currently held
    pub async fn list_locks(&self) -> Result<Vec<LockRecord>> {
        Ok(self
            .lock_record()
            .await?
            .into_iter()
            .filter(|record| record.locked)
            .collect())
    }

    /// Whether any run holds the lock
    pub async fn is_locked(&self) -> Result<bool> {
        Ok(!self.list_locks().await?.is_empty())
    }
}
