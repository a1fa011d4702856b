//! Domain error types
//!
//! This module defines the error hierarchy for Cairn. Errors are grouped the
//! way an operator has to react to them: configuration problems surface before
//! any changeset runs, lock contention means "try later", and changeset
//! failures keep partial progress and need the changelog or the data fixed.
//! None of the variants expose driver types.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Main Cairn error type
#[derive(Debug, Error)]
pub enum CairnError {
    /// Configuration-related errors (bad properties, missing changelog files)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The database could not be reached or rejected the credentials
    #[error("Connection error: {0}")]
    Connection(String),

    /// Lock coordination errors
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    /// Changelog parsing and validation errors
    #[error("Changelog error: {0}")]
    Changelog(#[from] ChangelogError),

    /// A changeset failed while being applied
    #[error("Changeset {change_set} failed: {message}")]
    ChangeSetFailed {
        /// Display form of the failing changeset identity
        change_set: String,
        /// Underlying failure
        message: String,
    },

    /// Errors raised by a custom (procedural) change
    #[error("Custom change error: {0}")]
    CustomChange(String),

    /// Database statement errors
    #[error("Database error: {0}")]
    Database(String),

    /// Another connection held a database write lock past the busy timeout
    #[error("Database busy: {0}")]
    Busy(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),
}

impl CairnError {
    /// Returns true if another process currently holds the migration lock
    pub fn is_lock_contention(&self) -> bool {
        matches!(self, CairnError::Lock(LockError::Contention { .. }))
    }

    /// Returns true if the database stayed locked by another connection
    pub fn is_busy(&self) -> bool {
        matches!(self, CairnError::Busy(_))
    }

    /// Returns true for errors that stop a run before any changeset executes
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CairnError::Configuration(_) | CairnError::Changelog(_) | CairnError::Validation(_)
        )
    }
}

/// Lock coordination errors
#[derive(Debug, Error)]
pub enum LockError {
    /// Another run holds the lock and it was not released within the wait timeout
    #[error(
        "Could not acquire change log lock after {waited_secs}s. Currently locked by {} since {}",
        locked_by.as_deref().unwrap_or("unknown"),
        since.map(|s| s.to_rfc3339()).unwrap_or_else(|| "unknown".to_string())
    )]
    Contention {
        /// Owner recorded in the lock row
        locked_by: Option<String>,
        /// When the lock was granted
        since: Option<DateTime<Utc>>,
        /// How long we waited before giving up
        waited_secs: u64,
    },

    /// The lock row could not be cleared
    #[error("Failed to release change log lock: {0}")]
    ReleaseFailed(String),

    /// The lock table could not be read or initialized
    #[error("Lock table unavailable: {0}")]
    Unavailable(String),
}

/// Changelog errors
#[derive(Debug, Error)]
pub enum ChangelogError {
    /// The changelog could not be found in bundled resources or on disk
    #[error("Changelog not found: {0}")]
    NotFound(String),

    /// The changelog document is malformed
    #[error("Failed to parse changelog {file}: {message}")]
    Parse {
        /// Changelog name
        file: String,
        /// Parser message
        message: String,
    },

    /// Two changesets share the same (id, author, file) identity
    #[error("Duplicate changeset identifier: {0}")]
    DuplicateChangeSet(String),

    /// A changelog includes itself, directly or transitively
    #[error("Include cycle detected at {0}")]
    IncludeCycle(String),

    /// A changeset that already ran was modified without run_on_change
    #[error("Checksum changed for already-run changeset {change_set}: was {stored}, is now {current}")]
    ChecksumMismatch {
        /// Display form of the changeset identity
        change_set: String,
        /// Checksum recorded in the ledger
        stored: String,
        /// Checksum of the changeset as declared now
        current: String,
    },

    /// A custom change name has no registered implementation
    #[error("Unknown custom change '{name}' in changeset {change_set}")]
    UnknownCustomChange {
        /// Registry name
        name: String,
        /// Display form of the changeset identity
        change_set: String,
    },
}

// Conversion from std::io::Error
impl From<std::io::Error> for CairnError {
    fn from(err: std::io::Error) -> Self {
        CairnError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for CairnError {
    fn from(err: serde_json::Error) -> Self {
        CairnError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for CairnError {
    fn from(err: toml::de::Error) -> Self {
        CairnError::Configuration(format!("TOML parse error: {err}"))
    }
}

impl From<tokio_postgres::Error> for CairnError {
    fn from(err: tokio_postgres::Error) -> Self {
        CairnError::Database(err.to_string())
    }
}

impl From<rusqlite::Error> for CairnError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked) => {
                CairnError::Busy(err.to_string())
            }
            _ => CairnError::Database(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cairn_error_display() {
        let err = CairnError::Configuration("Invalid config".to_string());
        assert_eq!(err.to_string(), "Configuration error: Invalid config");
    }

    #[test]
    fn test_lock_contention_detection() {
        let err: CairnError = LockError::Contention {
            locked_by: Some("host-a (42)".to_string()),
            since: None,
            waited_secs: 5,
        }
        .into();

        assert!(err.is_lock_contention());
        assert!(!err.is_configuration());
        assert!(err.to_string().contains("host-a (42)"));
    }

    #[test]
    fn test_changelog_error_is_configuration() {
        let err: CairnError = ChangelogError::NotFound("missing.toml".to_string()).into();
        assert!(err.is_configuration());
        assert!(!err.is_lock_contention());
    }

    #[test]
    fn test_changeset_failed_display() {
        let err = CairnError::ChangeSetFailed {
            change_set: "core.toml::1::alice".to_string(),
            message: "syntax error".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Changeset core.toml::1::alice failed: syntax error"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: CairnError = io_err.into();
        assert!(matches!(err, CairnError::Io(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let err: CairnError = toml_err.into();
        assert!(matches!(err, CairnError::Configuration(_)));
        assert!(err.to_string().contains("TOML parse error"));
    }

    #[test]
    fn test_sqlite_error_conversion() {
        let err: CairnError = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, CairnError::Database(_)));
        assert!(!err.is_busy());
    }

    #[test]
    fn test_sqlite_busy_conversion() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".to_string()),
        );
        let err: CairnError = busy.into();
        assert!(err.is_busy());
        assert!(!err.is_lock_contention());
        assert!(err.to_string().contains("database is locked"));
    }
}
