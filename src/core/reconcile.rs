//! Changeset reconciliation
//!
//! Compares the changesets declared in a list of changelogs with the ledger
//! of the target database and decides what still has to run. Changelog files
//! are processed in the order given; changesets keep their declaration order
//! inside each file.

use crate::adapters::database::Vendor;
use crate::core::changelog::{ChangelogLocator, ChangelogParser};
use crate::core::custom::CustomChangeRegistry;
use crate::core::ledger::AppliedChangeSets;
use crate::domain::{
    CairnError, Change, ChangeSet, ChangelogError, PendingChangeSet, Result, RunStatus,
};
use std::collections::HashSet;

/// Keeps changesets whose contexts match the active run contexts
#[derive(Debug, Clone, Default)]
pub struct ContextFilter {
    contexts: Vec<String>,
}

impl ContextFilter {
    /// Filter for the given run contexts; empty accepts everything
    pub fn new(contexts: &[String]) -> Self {
        Self {
            contexts: contexts
                .iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
        }
    }

    /// Whether the changeset runs in these contexts
    pub fn accepts(&self, change_set: &ChangeSet) -> bool {
        change_set.matches_contexts(&self.contexts)
    }
}

/// Keeps changesets that apply to the connected vendor
#[derive(Debug, Clone, Copy)]
pub struct DbmsFilter {
    vendor: Vendor,
}

impl DbmsFilter {
    /// Filter for `vendor`
    pub fn new(vendor: Vendor) -> Self {
        Self { vendor }
    }

    /// Whether the changeset applies to the vendor
    pub fn accepts(&self, change_set: &ChangeSet) -> bool {
        change_set.applies_to(self.vendor.name())
    }
}

/// Whether a changeset with the given ledger status has to run
pub fn should_run(change_set: &ChangeSet, status: RunStatus) -> bool {
    match status {
        RunStatus::NotRun | RunStatus::RunInError => true,
        RunStatus::Ran => change_set.run_always,
        RunStatus::RanButChanged => change_set.run_always || change_set.run_on_change,
    }
}

/// Decides which declared changesets still have to run
pub struct ChangeSetReconciler<'a> {
    locator: &'a ChangelogLocator,
    registry: &'a CustomChangeRegistry,
    contexts: ContextFilter,
    dbms: DbmsFilter,
}

impl<'a> ChangeSetReconciler<'a> {
    /// Creates a reconciler for one target database
    pub fn new(
        locator: &'a ChangelogLocator,
        registry: &'a CustomChangeRegistry,
        contexts: &[String],
        vendor: Vendor,
    ) -> Self {
        Self {
            locator,
            registry,
            contexts: ContextFilter::new(contexts),
            dbms: DbmsFilter::new(vendor),
        }
    }

    /// Parses the changelogs and returns the changesets that apply here
    ///
    /// A changelog named twice contributes its changesets once.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty list and a changelog error
    /// for any file that cannot be resolved or parsed.
    pub fn load(&self, files: &[String]) -> Result<Vec<ChangeSet>> {
        if files.is_empty() {
            return Err(CairnError::Configuration(
                "At least one changelog file is required".to_string(),
            ));
        }

        let parser = ChangelogParser::new(self.locator);
        let mut seen = HashSet::new();
        let mut change_sets = Vec::new();

        for file in files {
            let changelog = parser.parse(Some(file))?;
            change_sets.extend(
                changelog
                    .change_sets
                    .into_iter()
                    .filter(|cs| self.contexts.accepts(cs) && self.dbms.accepts(cs))
                    .filter(|cs| seen.insert(cs.identity.clone())),
            );
        }

        tracing::debug!(
            files = files.len(),
            change_sets = change_sets.len(),
            "Loaded applicable changesets"
        );
        Ok(change_sets)
    }

    /// Changesets that still have to run, in execution order
    pub fn unrun(&self, change_sets: &[ChangeSet], applied: &AppliedChangeSets) -> Vec<ChangeSet> {
        change_sets
            .iter()
            .filter(|cs| should_run(cs, applied.run_status(cs)))
            .cloned()
            .collect()
    }

    /// Rejects changelogs that cannot be executed as declared
    ///
    /// # Errors
    ///
    /// - [`ChangelogError::ChecksumMismatch`] for an already-run changeset that
    ///   was modified without `run_on_change`
    /// - [`ChangelogError::UnknownCustomChange`] for an unregistered custom change
    /// - the custom change's own validation error for bad parameters
    pub fn validate(&self, change_sets: &[ChangeSet], applied: &AppliedChangeSets) -> Result<()> {
        for change_set in change_sets {
            if applied.run_status(change_set) == RunStatus::RanButChanged
                && !change_set.run_on_change
            {
                let stored = applied
                    .get(&change_set.identity)
                    .map(|e| e.checksum.clone())
                    .unwrap_or_default();
                return Err(ChangelogError::ChecksumMismatch {
                    change_set: change_set.identity.to_string(),
                    stored,
                    current: change_set.checksum(),
                }
                .into());
            }

            for change in &change_set.changes {
                if let Change::Custom { name, params } = change {
                    let custom = self.registry.get(name).ok_or_else(|| {
                        ChangelogError::UnknownCustomChange {
                            name: name.clone(),
                            change_set: change_set.identity.to_string(),
                        }
                    })?;
                    custom.validate(params)?;
                }
            }
        }
        Ok(())
    }

    /// Operator summaries of the changesets that still have to run
    pub fn pending_summaries(
        &self,
        change_sets: &[ChangeSet],
        applied: &AppliedChangeSets,
    ) -> Vec<PendingChangeSet> {
        self.unrun(change_sets, applied)
            .iter()
            .map(|cs| PendingChangeSet::from_change_set(cs, applied.get(&cs.identity)))
            .collect()
    }
}
