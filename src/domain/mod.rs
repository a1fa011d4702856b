//! Domain models and types for Cairn.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Changesets** ([`ChangeSet`], [`ChangeSetId`], [`Change`]) as declared in changelogs
//! - **Persisted records** ([`LedgerEntry`], [`LockRecord`]) mirroring Cairn's tables
//! - **Operator summaries** ([`PendingChangeSet`], [`RunStatus`])
//! - **Error types** ([`CairnError`], [`LockError`], [`ChangelogError`])
//! - **Result type alias** ([`Result`])
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, CairnError>`]:
//!
//! ```rust
//! use cairn::domain::{CairnError, Result};
//!
//! fn example() -> Result<()> {
//!     Err(CairnError::Validation("nothing to do".to_string()))
//! }
//! ```

pub mod changeset;
pub mod errors;
pub mod records;
pub mod result;

// Re-export commonly used types for convenience
pub use changeset::{Change, ChangeSet, ChangeSetBuilder, ChangeSetId, RunStatus};
pub use errors::{CairnError, ChangelogError, LockError};
pub use records::{ExecType, LedgerEntry, LockRecord, PendingChangeSet};
pub use result::Result;
