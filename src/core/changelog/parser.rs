//! Changelog parsing
//!
//! A changelog is a TOML document:
//!
//! ```toml
//! logical_path = "site/changelog.toml"
//! include = ["site-changelog.toml"]
//!
//! [[changeset]]
//! id = "20240115-0900-create-person"
//! author = "alice"
//! context = ["core"]
//! dbms = ["postgresql", "sqlite"]
//!
//! [[changeset.change]]
//! type = "sql"
//! sql = "CREATE TABLE person (person_id INTEGER PRIMARY KEY)"
//! ```
//!
//! Includes are expanded depth-first, before the including file's own
//! changesets, in the order listed. `logical_path`, when present, replaces
//! the located name as the `file` part of the changesets' identities.

use super::locator::{ChangelogLocator, ResolvedChangelog};
use crate::domain::{Change, ChangeSet, ChangeSetId, ChangelogError, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ChangelogDocument {
    #[serde(default)]
    logical_path: Option<String>,
    #[serde(default)]
    include: Vec<String>,
    #[serde(default, rename = "changeset")]
    change_sets: Vec<ChangeSetDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ChangeSetDocument {
    id: String,
    author: String,
    #[serde(default)]
    comments: Option<String>,
    #[serde(default)]
    context: Vec<String>,
    #[serde(default)]
    dbms: Vec<String>,
    #[serde(default)]
    run_always: bool,
    #[serde(default)]
    run_on_change: bool,
    #[serde(default, rename = "change")]
    changes: Vec<ChangeDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ChangeDocument {
    Sql {
        sql: String,
    },
    SqlFile {
        path: String,
    },
    Custom {
        name: String,
        #[serde(default)]
        params: BTreeMap<String, String>,
    },
}

/// A parsed changelog with includes expanded
#[derive(Debug, Clone)]
pub struct DatabaseChangeLog {
    /// Logical name of the changelog
    pub file: String,
    /// Changesets in declaration order
    pub change_sets: Vec<ChangeSet>,
}

/// Parses changelogs resolved by a [`ChangelogLocator`]
pub struct ChangelogParser<'a> {
    locator: &'a ChangelogLocator,
}

#[derive(Default)]
struct ParseState {
    stack: Vec<String>,
    finished: HashSet<String>,
    identities: HashSet<ChangeSetId>,
    change_sets: Vec<ChangeSet>,
}

impl<'a> ChangelogParser<'a> {
    /// Creates a parser
    pub fn new(locator: &'a ChangelogLocator) -> Self {
        Self { locator }
    }

    /// Parses the named changelog; `None` parses the bundled empty changelog
    ///
    /// # Errors
    ///
    /// - [`ChangelogError::NotFound`] when the changelog or an include is missing
    /// - [`ChangelogError::Parse`] for malformed TOML or a blank id/author
    /// - [`ChangelogError::IncludeCycle`] when a changelog includes itself
    /// - [`ChangelogError::DuplicateChangeSet`] for a repeated identity
    pub fn parse(&self, name: Option<&str>) -> Result<DatabaseChangeLog> {
        let resolved = self.locator.locate(name)?;
        let mut state = ParseState::default();
        let file = self.parse_resolved(resolved, &mut state)?;

        tracing::debug!(
            changelog = %file,
            change_sets = state.change_sets.len(),
            "Parsed changelog"
        );

        Ok(DatabaseChangeLog {
            file,
            change_sets: state.change_sets,
        })
    }

    /// Parses changelog text directly, without includes or SQL files
    pub fn parse_str(file: &str, contents: &str) -> Result<DatabaseChangeLog> {
        let document = Self::deserialize(file, contents)?;
        let file = Self::logical_file(file, &document)?;
        if !document.include.is_empty() {
            return Err(ChangelogError::Parse {
                file,
                message: "includes are not supported for in-memory changelogs".to_string(),
            }
            .into());
        }

        let mut identities = HashSet::new();
        let change_sets = document
            .change_sets
            .into_iter()
            .map(|doc| {
                let change_set = Self::build(&file, doc, |path| {
                    Err(ChangelogError::NotFound(path.to_string()).into())
                })?;
                if !identities.insert(change_set.identity.clone()) {
                    return Err(
                        ChangelogError::DuplicateChangeSet(change_set.identity.to_string()).into(),
                    );
                }
                Ok(change_set)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(DatabaseChangeLog { file, change_sets })
    }

    fn logical_file(located: &str, document: &ChangelogDocument) -> Result<String> {
        match document.logical_path.as_deref().map(str::trim) {
            None => Ok(located.to_string()),
            Some("") => Err(ChangelogError::Parse {
                file: located.to_string(),
                message: "logical_path must not be blank".to_string(),
            }
            .into()),
            Some(logical) => Ok(logical.to_string()),
        }
    }

    fn deserialize(file: &str, contents: &str) -> Result<ChangelogDocument> {
        toml::from_str(contents).map_err(|e| {
            ChangelogError::Parse {
                file: file.to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Parses one changelog and its includes, returning its logical name
    fn parse_resolved(
        &self,
        resolved: ResolvedChangelog,
        state: &mut ParseState,
    ) -> Result<String> {
        let key = resolved.key();
        if state.stack.contains(&key) {
            return Err(ChangelogError::IncludeCycle(resolved.name).into());
        }

        let document = Self::deserialize(&resolved.name, &resolved.contents)?;
        let file = Self::logical_file(&resolved.name, &document)?;
        if state.finished.contains(&key) {
            tracing::debug!(changelog = %file, "Changelog already included, skipping");
            return Ok(file);
        }
        state.stack.push(key.clone());

        for include in &document.include {
            let included = self
                .locator
                .locate_relative(include, resolved.base_dir())?;
            self.parse_resolved(included, state)?;
        }

        for doc in document.change_sets {
            let change_set = Self::build(&file, doc, |path| {
                self.locator.read_resource(path, resolved.base_dir())
            })?;
            if !state.identities.insert(change_set.identity.clone()) {
                return Err(
                    ChangelogError::DuplicateChangeSet(change_set.identity.to_string()).into(),
                );
            }
            state.change_sets.push(change_set);
        }

        state.stack.pop();
        state.finished.insert(key);
        Ok(file)
    }

    fn build<F>(file: &str, doc: ChangeSetDocument, mut read_sql: F) -> Result<ChangeSet>
    where
        F: FnMut(&str) -> Result<String>,
    {
        let blank = |field: &str| ChangelogError::Parse {
            file: file.to_string(),
            message: format!("changeset {field} must not be blank"),
        };
        if doc.id.trim().is_empty() {
            return Err(blank("id").into());
        }
        if doc.author.trim().is_empty() {
            return Err(blank("author").into());
        }

        let changes = doc
            .changes
            .into_iter()
            .map(|change| match change {
                ChangeDocument::Sql { sql } => Ok(Change::Sql { sql }),
                ChangeDocument::SqlFile { path } => read_sql(&path).map(|sql| Change::Sql { sql }),
                ChangeDocument::Custom { name, params } => Ok(Change::Custom { name, params }),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ChangeSet {
            identity: ChangeSetId::new(doc.id, doc.author, file),
            comments: doc.comments.filter(|c| !c.trim().is_empty()),
            contexts: doc.context,
            dbms: doc.dbms,
            run_always: doc.run_always,
            run_on_change: doc.run_on_change,
            changes,
        })
    }
}
