//! Database updater facade
//!
//! [`DatabaseUpdater`] is what the application and the CLI call. Every
//! operation opens its own connection and closes it before returning,
//! whatever the outcome.

use crate::adapters::database::{close_quietly, connect, MigrationDatabase};
use crate::config::{CairnConfig, RuntimeProperties};
use crate::core::changelog::ChangelogLocator;
use crate::core::custom::CustomChangeRegistry;
use crate::core::execute::{ChangeSetExecutorCallback, ExecutionVisitor, UpdateReport};
use crate::core::ledger::{AppliedChangeSets, LedgerService};
use crate::core::lock::LockCoordinator;
use crate::core::reconcile::ChangeSetReconciler;
use crate::domain::{LockRecord, PendingChangeSet, Result};
use crate::logging::write_update_messages;
use std::path::PathBuf;

/// Runtime property naming the application data directory
pub const DATA_DIRECTORY_PROPERTY: &str = "application_data_directory";

/// Entry point for schema checks and updates
///
/// # Examples
///
/// ```no_run
/// use cairn::config::{CairnConfig, DatabaseConfig};
/// use cairn::core::updater::DatabaseUpdater;
///
/// # async fn example() -> cairn::domain::Result<()> {
/// let config = CairnConfig::for_database(DatabaseConfig::new("sqlite:///var/lib/app/app.db"));
/// let updater = DatabaseUpdater::new(config);
///
/// if updater.updates_required().await? {
///     let report = updater.execute_changelog(None, None).await?;
///     println!("applied {} changesets", report.applied.len());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseUpdater {
    config: CairnConfig,
    locator: ChangelogLocator,
    registry: CustomChangeRegistry,
}

impl DatabaseUpdater {
    /// Creates an updater with the bundled custom changes registered
    pub fn new(config: CairnConfig) -> Self {
        let locator = ChangelogLocator::new(config.changelog.directory.clone());
        Self {
            config,
            locator,
            registry: CustomChangeRegistry::with_defaults(),
        }
    }

    /// Creates an updater from legacy runtime properties
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no connection URL is set.
    pub fn from_runtime_properties(properties: &RuntimeProperties) -> Result<Self> {
        let mut config = CairnConfig::for_database(properties.database_config()?);
        if let Some(dir) = properties
            .get(DATA_DIRECTORY_PROPERTY)
            .filter(|d| !d.trim().is_empty())
        {
            config.application.data_directory = PathBuf::from(dir);
        }
        Ok(Self::new(config))
    }

    /// Replaces the custom change registry
    pub fn with_registry(mut self, registry: CustomChangeRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Effective configuration
    pub fn config(&self) -> &CairnConfig {
        &self.config
    }

    /// Whether updates may be applied without operator confirmation
    pub fn allow_auto_update(&self) -> bool {
        self.config.database.auto_update
    }

    /// Whether the configured changelogs have changesets left to run
    ///
    /// A lock left behind by a crashed run is released when nothing is
    /// pending.
    pub async fn updates_required(&self) -> Result<bool> {
        self.updates_required_in(&self.config.changelog.files).await
    }

    /// Whether the given changelogs have changesets left to run
    pub async fn updates_required_in(&self, files: &[String]) -> Result<bool> {
        let db = connect(&self.config.database).await?;
        let result = self.check_updates_required(db.as_ref(), files).await;
        close_quietly(db).await;
        result
    }

    async fn check_updates_required(
        &self,
        db: &dyn MigrationDatabase,
        files: &[String],
    ) -> Result<bool> {
        let pending = self.pending_on(db, files).await?;
        if !pending.is_empty() {
            tracing::info!(pending = pending.len(), "Database updates required");
            return Ok(true);
        }

        let mut lock = LockCoordinator::new(db, &self.config.lock);
        if lock.is_locked().await? {
            tracing::warn!("Change log lock held although no updates are pending, releasing it");
            lock.force_release().await?;
        }
        Ok(false)
    }

    /// Pending changesets of the configured changelogs
    pub async fn pending_changes(&self) -> Result<Vec<PendingChangeSet>> {
        self.pending_changes_in(&self.config.changelog.files).await
    }

    /// Pending changesets of the given changelogs
    pub async fn pending_changes_in(&self, files: &[String]) -> Result<Vec<PendingChangeSet>> {
        let db = connect(&self.config.database).await?;
        let result = self.pending_on(db.as_ref(), files).await;
        close_quietly(db).await;
        result
    }

    async fn pending_on(
        &self,
        db: &dyn MigrationDatabase,
        files: &[String],
    ) -> Result<Vec<PendingChangeSet>> {
        let reconciler = self.reconciler(db);
        let change_sets = reconciler.load(files)?;
        let applied = AppliedChangeSets::new(LedgerService::new(db).applied().await?);
        Ok(reconciler.pending_summaries(&change_sets, &applied))
    }

    fn reconciler<'a>(&'a self, db: &dyn MigrationDatabase) -> ChangeSetReconciler<'a> {
        ChangeSetReconciler::new(
            &self.locator,
            &self.registry,
            &self.config.changelog.contexts,
            db.vendor(),
        )
    }

    /// Runs one changelog, or the configured ones when `file` is `None`
    pub async fn execute_changelog(
        &self,
        file: Option<&str>,
        callback: Option<&dyn ChangeSetExecutorCallback>,
    ) -> Result<UpdateReport> {
        match file {
            Some(file) => self.execute_changelogs(&[file.to_string()], callback).await,
            None => {
                self.execute_changelogs(&self.config.changelog.files, callback)
                    .await
            }
        }
    }

    /// Runs the given changelogs in order under the migration lock
    ///
    /// Warnings reported by custom changes are appended to the update log in
    /// the data directory, also when the run fails part way.
    ///
    /// # Errors
    ///
    /// - configuration and changelog errors before anything runs
    /// - [`crate::domain::LockError::Contention`] when another run holds the lock
    /// - [`crate::domain::CairnError::ChangeSetFailed`] for the first failing
    ///   changeset; earlier changesets stay applied
    pub async fn execute_changelogs(
        &self,
        files: &[String],
        callback: Option<&dyn ChangeSetExecutorCallback>,
    ) -> Result<UpdateReport> {
        let db = connect(&self.config.database).await?;
        let mut report = UpdateReport::default();

        let result = {
            let mut lock = LockCoordinator::new(db.as_ref(), &self.config.lock);
            let result = self
                .update_under_lock(db.as_ref(), &mut lock, files, callback, &mut report)
                .await;
            if let Err(e) = lock.release().await {
                tracing::warn!(error = %e, "Failed to release change log lock");
            }
            result
        };
        close_quietly(db).await;

        if !report.warnings.is_empty() {
            write_update_messages(
                &self.config.application.data_directory,
                &report.warnings.join("\n"),
            );
        }

        result.map(|()| report)
    }

    async fn update_under_lock(
        &self,
        db: &dyn MigrationDatabase,
        lock: &mut LockCoordinator<'_>,
        files: &[String],
        callback: Option<&dyn ChangeSetExecutorCallback>,
        report: &mut UpdateReport,
    ) -> Result<()> {
        lock.acquire().await?;
        let ledger = LedgerService::new(db);
        ledger.ensure_table().await?;

        let reconciler = self.reconciler(db);
        let change_sets = reconciler.load(files)?;
        let applied = AppliedChangeSets::new(ledger.applied().await?);
        reconciler.validate(&change_sets, &applied)?;

        let unrun = reconciler.unrun(&change_sets, &applied);
        tracing::info!(
            declared = change_sets.len(),
            pending = unrun.len(),
            "Executing database changelogs"
        );

        let mut visitor =
            ExecutionVisitor::new(db, &self.registry, self.config.application.authenticated_user_id);
        let result = visitor.run(&unrun, &applied, callback).await;
        *report = visitor.into_report();
        result
    }

    /// Whether some run holds the migration lock; errors read as unlocked
    pub async fn is_locked(&self) -> bool {
        let db = match connect(&self.config.database).await {
            Ok(db) => db,
            Err(e) => {
                tracing::warn!(error = %e, "Could not check change log lock");
                return false;
            }
        };

        let locked = LockCoordinator::new(db.as_ref(), &self.config.lock)
            .is_locked()
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Could not check change log lock");
                false
            });
        close_quietly(db).await;
        locked
    }

    /// Locks currently held
    pub async fn list_locks(&self) -> Result<Vec<LockRecord>> {
        let db = connect(&self.config.database).await?;
        let result = LockCoordinator::new(db.as_ref(), &self.config.lock)
            .list_locks()
            .await;
        close_quietly(db).await;
        result
    }

    /// Clears the migration lock regardless of its holder
    pub async fn release_database_lock(&self) -> Result<()> {
        let db = connect(&self.config.database).await?;
        let result = LockCoordinator::new(db.as_ref(), &self.config.lock)
            .force_release()
            .await;
        close_quietly(db).await;
        result
    }
}
