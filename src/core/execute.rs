//! Changeset execution
//!
//! Each changeset runs in its own transaction together with its ledger
//! write. The first failure rolls back that changeset and stops the run;
//! changesets committed before it stay applied.

use crate::adapters::database::MigrationDatabase;
use crate::core::custom::{ChangeContext, CustomChangeRegistry};
use crate::core::ledger::{AppliedChangeSets, LedgerService};
use crate::domain::{
    CairnError, Change, ChangeSet, ChangeSetId, ChangelogError, ExecType, Result,
};
use crate::log_change_set_start;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Notified before each changeset runs
///
/// `remaining` counts the changeset about to run.
pub trait ChangeSetExecutorCallback: Send + Sync {
    /// Called before `change_set` starts
    fn executing(&self, change_set: &ChangeSet, remaining: usize);
}

impl<F> ChangeSetExecutorCallback for F
where
    F: Fn(&ChangeSet, usize) + Send + Sync,
{
    fn executing(&self, change_set: &ChangeSet, remaining: usize) {
        self(change_set, remaining)
    }
}

/// Outcome of an update run
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateReport {
    /// Changesets committed, in order
    pub applied: Vec<ChangeSetId>,
    /// Warnings reported by custom changes of committed changesets
    pub warnings: Vec<String>,
    /// Wall time of the run
    pub duration: Duration,
}

impl UpdateReport {
    /// Whether nothing had to run
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Applies changesets over one connection
pub struct ExecutionVisitor<'a> {
    db: &'a dyn MigrationDatabase,
    registry: &'a CustomChangeRegistry,
    authenticated_user_id: Option<i64>,
    report: UpdateReport,
}

impl<'a> ExecutionVisitor<'a> {
    /// Creates a visitor
    pub fn new(
        db: &'a dyn MigrationDatabase,
        registry: &'a CustomChangeRegistry,
        authenticated_user_id: Option<i64>,
    ) -> Self {
        Self {
            db,
            registry,
            authenticated_user_id,
            report: UpdateReport::default(),
        }
    }

    /// Runs `change_sets` in order, stopping at the first failure
    ///
    /// `applied` decides whether a changeset's ledger row is inserted or
    /// updated. Progress up to the failure stays in [`Self::report`].
    ///
    /// # Errors
    ///
    /// Returns [`CairnError::ChangeSetFailed`] for the failing changeset.
    pub async fn run(
        &mut self,
        change_sets: &[ChangeSet],
        applied: &AppliedChangeSets,
        callback: Option<&dyn ChangeSetExecutorCallback>,
    ) -> Result<()> {
        let started = Instant::now();
        let total = change_sets.len();
        let result = self.run_all(change_sets, applied, callback).await;
        self.report.duration += started.elapsed();

        match &result {
            Ok(()) => tracing::info!(
                applied = self.report.applied.len(),
                total,
                duration_ms = self.report.duration.as_millis() as u64,
                "Update completed"
            ),
            Err(e) => tracing::error!(
                applied = self.report.applied.len(),
                total,
                error = %e,
                "Update stopped"
            ),
        }
        result
    }

    async fn run_all(
        &mut self,
        change_sets: &[ChangeSet],
        applied: &AppliedChangeSets,
        callback: Option<&dyn ChangeSetExecutorCallback>,
    ) -> Result<()> {
        for (index, change_set) in change_sets.iter().enumerate() {
            let remaining = change_sets.len() - index;
            log_change_set_start!(change_set.identity, remaining);
            if let Some(callback) = callback {
                callback.executing(change_set, remaining);
            }

            let exec_type = if applied.contains(&change_set.identity) {
                ExecType::Reran
            } else {
                ExecType::Executed
            };

            let warnings = self.apply(change_set, exec_type).await.map_err(|e| {
                CairnError::ChangeSetFailed {
                    change_set: change_set.identity.to_string(),
                    message: e.to_string(),
                }
            })?;

            self.report.applied.push(change_set.identity.clone());
            self.report.warnings.extend(warnings);
        }
        Ok(())
    }

    async fn apply(&self, change_set: &ChangeSet, exec_type: ExecType) -> Result<Vec<String>> {
        self.db.begin().await?;

        match self.apply_in_transaction(change_set, exec_type).await {
            Ok(warnings) => {
                self.db.commit().await?;
                tracing::debug!(
                    change_set = %change_set.identity,
                    exec_type = exec_type.as_str(),
                    "Changeset committed"
                );
                Ok(warnings)
            }
            Err(e) => {
                if let Err(rollback) = self.db.rollback().await {
                    tracing::warn!(
                        change_set = %change_set.identity,
                        error = %rollback,
                        "Rollback failed"
                    );
                }
                Err(e)
            }
        }
    }

    async fn apply_in_transaction(
        &self,
        change_set: &ChangeSet,
        exec_type: ExecType,
    ) -> Result<Vec<String>> {
        let mut warnings = Vec::new();

        for change in &change_set.changes {
            match change {
                Change::Sql { sql } => self.db.batch_execute(sql).await?,
                Change::Custom { name, params } => {
                    let custom = self.registry.get(name).ok_or_else(|| {
                        ChangelogError::UnknownCustomChange {
                            name: name.clone(),
                            change_set: change_set.identity.to_string(),
                        }
                    })?;

                    let mut ctx = ChangeContext::new(self.db, params, self.authenticated_user_id);
                    custom.execute(&mut ctx).await?;
                    tracing::info!(change = %name, "{}", custom.confirmation_message());
                    warnings.extend(ctx.into_warnings());
                }
            }
        }

        LedgerService::new(self.db).record(change_set, exec_type).await?;
        Ok(warnings)
    }

    /// Progress so far
    pub fn report(&self) -> &UpdateReport {
        &self.report
    }

    /// Consumes the visitor, returning its report
    pub fn into_report(self) -> UpdateReport {
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{SqliteDatabase, MEMORY_PATH};
    use crate::domain::ChangeSetBuilder;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    async fn memory() -> SqliteDatabase {
        let db = SqliteDatabase::open(MEMORY_PATH, Duration::from_millis(100)).unwrap();
        LedgerService::new(&db).ensure_table().await.unwrap();
        db
    }

    fn change_set(id: &str, sql: &str) -> ChangeSet {
        ChangeSetBuilder::new(id, "alice", "site.toml").sql(sql).build()
    }

    #[tokio::test]
    async fn test_runs_in_order_and_reports_remaining() {
        let db = memory().await;
        let registry = CustomChangeRegistry::with_defaults();
        let seen = Mutex::new(Vec::new());
        let callback = |cs: &ChangeSet, remaining: usize| {
            seen.lock().unwrap().push((cs.id().to_string(), remaining));
        };

        let change_sets = vec![
            change_set("1", "CREATE TABLE a (id INTEGER)"),
            change_set("2", "CREATE TABLE b (id INTEGER)"),
        ];
        let mut visitor = ExecutionVisitor::new(&db, &registry, None);
        visitor
            .run(&change_sets, &AppliedChangeSets::default(), Some(&callback))
            .await
            .unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![("1".to_string(), 2), ("2".to_string(), 1)]
        );
        let report = visitor.into_report();
        assert_eq!(report.applied.len(), 2);
        assert!(db.table_exists("b").await.unwrap());
        assert_eq!(LedgerService::new(&db).applied().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failure_keeps_earlier_commits() {
        let db = memory().await;
        let registry = CustomChangeRegistry::with_defaults();

        let change_sets = vec![
            change_set("1", "CREATE TABLE a (id INTEGER)"),
            change_set("2", "CREATE TABLE b (id INTEGER); INSERT INTO nowhere VALUES (1)"),
            change_set("3", "CREATE TABLE c (id INTEGER)"),
        ];
        let mut visitor = ExecutionVisitor::new(&db, &registry, None);
        let err = visitor
            .run(&change_sets, &AppliedChangeSets::default(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, CairnError::ChangeSetFailed { .. }));
        assert!(err.to_string().contains("site.toml::2::alice"));
        assert_eq!(visitor.report().applied, vec![change_sets[0].identity.clone()]);
        assert!(db.table_exists("a").await.unwrap());
        assert!(!db.table_exists("b").await.unwrap());
        assert!(!db.table_exists("c").await.unwrap());

        let ledger = LedgerService::new(&db).applied().await.unwrap();
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_rerun_updates_ledger_row() {
        let db = memory().await;
        let registry = CustomChangeRegistry::with_defaults();
        let always = ChangeSetBuilder::new("refresh", "alice", "site.toml")
            .sql("CREATE TABLE IF NOT EXISTS t (id INTEGER)")
            .run_always(true)
            .build();

        let mut visitor = ExecutionVisitor::new(&db, &registry, None);
        visitor
            .run(std::slice::from_ref(&always), &AppliedChangeSets::default(), None)
            .await
            .unwrap();

        let applied = AppliedChangeSets::new(LedgerService::new(&db).applied().await.unwrap());
        visitor
            .run(std::slice::from_ref(&always), &applied, None)
            .await
            .unwrap();

        let ledger = LedgerService::new(&db).applied().await.unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].exec_type, ExecType::Reran);
        assert_eq!(visitor.report().applied.len(), 2);
    }

    #[tokio::test]
    async fn test_custom_change_warnings_collected() {
        let db = memory().await;
        let registry = CustomChangeRegistry::with_defaults();
        let change_sets = vec![
            change_set(
                "1",
                "CREATE TABLE location_attribute_type (location_attribute_type_id INTEGER PRIMARY KEY, \
                 name VARCHAR(255), changed_by INTEGER, date_changed TEXT); \
                 INSERT INTO location_attribute_type (location_attribute_type_id, name) \
                 VALUES (1, 'Clinic'), (2, 'Clinic')",
            ),
            ChangeSetBuilder::new("2", "alice", "site.toml")
                .custom("duplicate-attribute-type-names", BTreeMap::new())
                .build(),
        ];

        let mut visitor = ExecutionVisitor::new(&db, &registry, Some(3));
        visitor
            .run(&change_sets, &AppliedChangeSets::default(), None)
            .await
            .unwrap();

        let report = visitor.into_report();
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("Clinic_1"));
    }

    #[tokio::test]
    async fn test_unknown_custom_change_fails_changeset() {
        let db = memory().await;
        let registry = CustomChangeRegistry::new();
        let change_sets = vec![ChangeSetBuilder::new("1", "alice", "site.toml")
            .custom("duplicate-attribute-type-names", BTreeMap::new())
            .build()];

        let mut visitor = ExecutionVisitor::new(&db, &registry, None);
        let err = visitor
            .run(&change_sets, &AppliedChangeSets::default(), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unknown custom change"));
        assert!(LedgerService::new(&db).applied().await.unwrap().is_empty());
    }
}
