//! Changeset model
//!
//! A changeset is one atomic, identified unit of schema or data change. It is
//! identified by the `(id, author, file)` triple and carries an ordered list of
//! changes. Changesets are immutable once parsed from their changelog.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Version tag prefixed to every checksum so the algorithm can evolve
pub const CHECKSUM_VERSION: &str = "1";

/// Identity of a changeset: `(id, author, changelog file)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChangeSetId {
    /// Identifier declared in the changelog
    pub id: String,
    /// Author declared in the changelog
    pub author: String,
    /// Changelog file the changeset was declared in
    pub file: String,
}

impl ChangeSetId {
    /// Creates a new changeset identity
    pub fn new(id: impl Into<String>, author: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            author: author.into(),
            file: file.into(),
        }
    }
}

impl fmt::Display for ChangeSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}::{}", self.file, self.id, self.author)
    }
}

/// One action inside a changeset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Change {
    /// Raw SQL executed as a single batch
    Sql {
        /// SQL text, possibly several `;`-separated statements
        sql: String,
    },

    /// Procedural step looked up in the custom change registry
    Custom {
        /// Registry name of the custom change
        name: String,
        /// String parameters handed to the custom change
        #[serde(default)]
        params: BTreeMap<String, String>,
    },
}

impl Change {
    /// Short label used in changeset descriptions
    pub fn label(&self) -> String {
        match self {
            Change::Sql { .. } => "sql".to_string(),
            Change::Custom { name, .. } => format!("custom:{name}"),
        }
    }

    /// Canonical text covered by the checksum
    fn canonical(&self) -> String {
        match self {
            Change::Sql { sql } => {
                let lines: Vec<&str> = sql
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .collect();
                format!("sql:{}", lines.join("\n"))
            }
            Change::Custom { name, params } => {
                let params = params
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join(",");
                format!("custom:{name}({params})")
            }
        }
    }
}

/// Status of a changeset relative to the ledger of the target database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No ledger entry exists
    NotRun,
    /// A ledger entry exists with the current checksum
    Ran,
    /// A ledger entry exists but the changeset has been modified since
    RanButChanged,
    /// The changeset failed during the current execution run
    RunInError,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunStatus::NotRun => "not run",
            RunStatus::Ran => "run",
            RunStatus::RanButChanged => "run but changed",
            RunStatus::RunInError => "run in error",
        };
        write!(f, "{label}")
    }
}

/// A changeset as declared in a changelog file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    /// Identity triple
    pub identity: ChangeSetId,
    /// Author comments
    pub comments: Option<String>,
    /// Execution contexts (empty = every context)
    pub contexts: Vec<String>,
    /// Vendor applicability (empty = every vendor, `!name` excludes)
    pub dbms: Vec<String>,
    /// Re-run on every update, even if already in the ledger
    pub run_always: bool,
    /// Re-run when the checksum changes instead of failing validation
    pub run_on_change: bool,
    /// Ordered changes
    pub changes: Vec<Change>,
}

impl ChangeSet {
    /// Changeset id as declared
    pub fn id(&self) -> &str {
        &self.identity.id
    }

    /// Changeset author as declared
    pub fn author(&self) -> &str {
        &self.identity.author
    }

    /// Changelog file the changeset belongs to
    pub fn file(&self) -> &str {
        &self.identity.file
    }

    /// Human-readable description derived from the change kinds
    pub fn description(&self) -> String {
        if self.changes.is_empty() {
            return "empty".to_string();
        }
        self.changes
            .iter()
            .map(Change::label)
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Versioned SHA-256 checksum of the changes
    ///
    /// Leading and trailing whitespace of each SQL line and blank lines are
    /// ignored, so re-indenting does not count as a change. Whitespace inside
    /// a line, string literals included, is covered. Comments and identity
    /// are not covered.
    pub fn checksum(&self) -> String {
        let canonical = self
            .changes
            .iter()
            .map(Change::canonical)
            .collect::<Vec<_>>()
            .join("\n");

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        format!("{CHECKSUM_VERSION}:{:x}", hasher.finalize())
    }

    /// Whether the changeset runs in any of the given execution contexts
    pub fn matches_contexts(&self, run_contexts: &[String]) -> bool {
        if self.contexts.is_empty() || run_contexts.is_empty() {
            return true;
        }
        self.contexts.iter().any(|declared| {
            run_contexts
                .iter()
                .any(|active| active.eq_ignore_ascii_case(declared))
        })
    }

    /// Whether the changeset applies to the given database vendor
    pub fn applies_to(&self, vendor: &str) -> bool {
        if self.dbms.is_empty() {
            return true;
        }

        let mut has_positive = false;
        for entry in &self.dbms {
            let entry = entry.trim();
            if let Some(excluded) = entry.strip_prefix('!') {
                if excluded.eq_ignore_ascii_case(vendor) {
                    return false;
                }
            } else if entry.eq_ignore_ascii_case("all") {
                return true;
            } else if entry.eq_ignore_ascii_case("none") {
                return false;
            } else {
                has_positive = true;
                if entry.eq_ignore_ascii_case(vendor) {
                    return true;
                }
            }
        }

        !has_positive
    }
}

/// Builder for [`ChangeSet`]
///
/// # Examples
///
/// ```
/// use cairn::domain::ChangeSetBuilder;
///
/// let change_set = ChangeSetBuilder::new("create-person", "alice", "core.toml")
///     .sql("CREATE TABLE person (person_id INTEGER PRIMARY KEY)")
///     .context("core")
///     .build();
///
/// assert_eq!(change_set.description(), "sql");
/// assert!(change_set.checksum().starts_with("1:"));
/// ```
#[derive(Debug)]
pub struct ChangeSetBuilder {
    change_set: ChangeSet,
}

impl ChangeSetBuilder {
    /// Starts a builder for the given identity
    pub fn new(id: impl Into<String>, author: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            change_set: ChangeSet {
                identity: ChangeSetId::new(id, author, file),
                comments: None,
                contexts: Vec::new(),
                dbms: Vec::new(),
                run_always: false,
                run_on_change: false,
                changes: Vec::new(),
            },
        }
    }

    /// Sets the author comments
    pub fn comments(mut self, comments: impl Into<String>) -> Self {
        self.change_set.comments = Some(comments.into());
        self
    }

    /// Adds an execution context
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.change_set.contexts.push(context.into());
        self
    }

    /// Adds a vendor applicability entry
    pub fn dbms(mut self, dbms: impl Into<String>) -> Self {
        self.change_set.dbms.push(dbms.into());
        self
    }

    /// Marks the changeset as run-always
    pub fn run_always(mut self, run_always: bool) -> Self {
        self.change_set.run_always = run_always;
        self
    }

    /// Marks the changeset as run-on-change
    pub fn run_on_change(mut self, run_on_change: bool) -> Self {
        self.change_set.run_on_change = run_on_change;
        self
    }

    /// Appends a SQL change
    pub fn sql(mut self, sql: impl Into<String>) -> Self {
        self.change_set.changes.push(Change::Sql { sql: sql.into() });
        self
    }

    /// Appends a custom change
    pub fn custom(mut self, name: impl Into<String>, params: BTreeMap<String, String>) -> Self {
        self.change_set.changes.push(Change::Custom {
            name: name.into(),
            params,
        });
        self
    }

    /// Finishes the changeset
    pub fn build(self) -> ChangeSet {
        self.change_set
    }
}
