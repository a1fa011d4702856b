//! Custom (procedural) changes
//!
//! A changelog entry `type = "custom"` names a [`CustomChange`] registered in
//! the [`CustomChangeRegistry`]. The change runs on the changeset's connection
//! inside the changeset's transaction and may report warnings that end up in
//! the update log file.

pub mod duplicate_names;

use crate::adapters::database::MigrationDatabase;
use crate::domain::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub use duplicate_names::DuplicateAttributeTypeNameChange;

/// What a custom change gets to work with
pub struct ChangeContext<'a> {
    /// Connection with the changeset's transaction open
    pub db: &'a dyn MigrationDatabase,
    /// Parameters declared next to the change in the changelog
    pub params: &'a BTreeMap<String, String>,
    /// User that automated data changes are attributed to
    pub authenticated_user_id: Option<i64>,
    warnings: Vec<String>,
}

impl<'a> ChangeContext<'a> {
    /// Creates a context
    pub fn new(
        db: &'a dyn MigrationDatabase,
        params: &'a BTreeMap<String, String>,
        authenticated_user_id: Option<i64>,
    ) -> Self {
        Self {
            db,
            params,
            authenticated_user_id,
            warnings: Vec::new(),
        }
    }

    /// Reports something the operator should review after the update
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(warning = %message, "Update warning");
        self.warnings.push(message);
    }

    /// Warnings reported so far
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Consumes the context, returning its warnings
    pub fn into_warnings(self) -> Vec<String> {
        self.warnings
    }
}

/// A procedural step inside a changeset
#[async_trait]
pub trait CustomChange: Send + Sync {
    /// Name used in changelogs
    fn name(&self) -> &'static str;

    /// Message logged after a successful run
    fn confirmation_message(&self) -> String;

    /// Checks parameters before anything runs
    fn validate(&self, params: &BTreeMap<String, String>) -> Result<()>;

    /// Performs the change
    async fn execute(&self, ctx: &mut ChangeContext<'_>) -> Result<()>;
}

/// Custom changes by name
#[derive(Clone, Default)]
pub struct CustomChangeRegistry {
    changes: HashMap<&'static str, Arc<dyn CustomChange>>,
}

impl CustomChangeRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the changes shipped with Cairn
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(DuplicateAttributeTypeNameChange));
        registry
    }

    /// Adds or replaces a change under its own name
    pub fn register(&mut self, change: Arc<dyn CustomChange>) {
        self.changes.insert(change.name(), change);
    }

    /// Looks up a change
    pub fn get(&self, name: &str) -> Option<Arc<dyn CustomChange>> {
        self.changes.get(name).cloned()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.changes.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for CustomChangeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomChangeRegistry")
            .field("changes", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl CustomChange for Noop {
        fn name(&self) -> &'static str {
            "noop"
        }

        fn confirmation_message(&self) -> String {
            "nothing done".to_string()
        }

        fn validate(&self, _params: &BTreeMap<String, String>) -> Result<()> {
            Ok(())
        }

        async fn execute(&self, ctx: &mut ChangeContext<'_>) -> Result<()> {
            ctx.warn("noop ran");
            Ok(())
        }
    }

    #[test]
    fn test_defaults_registered() {
        let registry = CustomChangeRegistry::with_defaults();
        assert_eq!(registry.names(), vec!["duplicate-attribute-type-names"]);
        assert!(registry.get("duplicate-attribute-type-names").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[tokio::test]
    async fn test_context_collects_warnings() {
        let db = crate::adapters::sqlite::SqliteDatabase::open(
            crate::adapters::sqlite::MEMORY_PATH,
            std::time::Duration::from_millis(100),
        )
        .unwrap();
        let params = BTreeMap::new();
        let mut registry = CustomChangeRegistry::new();
        registry.register(Arc::new(Noop));

        let mut ctx = ChangeContext::new(&db, &params, Some(1));
        registry.get("noop").unwrap().execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.warnings(), ["noop ran".to_string()]);
        assert_eq!(ctx.into_warnings().len(), 1);
    }
}
