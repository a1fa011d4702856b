//! Core migration engine for Cairn.
//!
//! # Modules
//!
//! - [`changelog`] - Locating and parsing TOML changelogs
//! - [`ledger`] - The table of applied changesets
//! - [`lock`] - Cooperative migration lock
//! - [`reconcile`] - Deciding which changesets still have to run
//! - [`execute`] - Applying changesets one transaction at a time
//! - [`custom`] - Procedural changes such as duplicate name repair
//! - [`updater`] - The [`DatabaseUpdater`](updater::DatabaseUpdater) facade
//!
//! # Update Workflow
//!
//! 1. **Connect**: Open one connection to the target database
//! 2. **Prepare**: Create the ledger and lock tables if missing
//! 3. **Lock**: Wait for the migration lock
//! 4. **Reconcile**: Parse changelogs, compare with the ledger, validate
//! 5. **Execute**: Apply pending changesets in order, each with its ledger row
//! 6. **Release**: Release the lock and close the connection, always
//! 7. **Report**: Append custom change warnings to the update log
//!
//! # Example
//!
//! ```rust,no_run
//! use cairn::config::load_config;
//! use cairn::core::updater::DatabaseUpdater;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("cairn.toml")?;
//! let updater = DatabaseUpdater::new(config);
//!
//! let report = updater.execute_changelog(None, None).await?;
//! println!("Applied {} changesets", report.applied.len());
//! # Ok(())
//! # }
//! ```

pub mod changelog;
pub mod custom;
pub mod execute;
pub mod ledger;
pub mod lock;
pub mod reconcile;
pub mod updater;

/// Execution context changesets are filtered by unless configured otherwise
pub const DEFAULT_CONTEXT: &str = "core";

pub use execute::{ChangeSetExecutorCallback, UpdateReport};
pub use updater::DatabaseUpdater;
