// Cairn - Database schema updates driven by versioned changelogs
// Copyright (c) 2025 Cairn Contributors
// Licensed under the MIT License

//! # Cairn - changelog-driven database updates
//!
//! Cairn brings the schema of an EMR database up to date before the
//! application starts serving requests. Schema and data changes are declared
//! as changesets in TOML changelogs; Cairn records every changeset it applies
//! in a ledger table, so each one runs exactly once per database.
//!
//! ## Overview
//!
//! This library provides:
//! - **Detecting** whether a database has pending changesets
//! - **Applying** them in order, one transaction per changeset
//! - **Coordinating** concurrent runs through a lock table
//! - **Repairing** data that blocks a schema change, via custom changes
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Changelogs, ledger, lock, reconciliation and execution
//! - [`adapters`] - PostgreSQL and SQLite connections
//! - [`domain`] - Changesets, records and error types
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging and the update log file
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cairn::config::load_config;
//! use cairn::core::DatabaseUpdater;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("cairn.toml")?;
//!     let updater = DatabaseUpdater::new(config);
//!
//!     if updater.updates_required().await? {
//!         let report = updater.execute_changelog(None, None).await?;
//!         println!("Applied {} changesets", report.applied.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Every fallible operation returns [`domain::Result`]. Lock contention is
//! distinguishable from real failures, so callers can treat it as "updates
//! pending, try again later":
//!
//! ```rust,no_run
//! use cairn::core::DatabaseUpdater;
//!
//! # async fn example(updater: DatabaseUpdater) {
//! match updater.execute_changelog(None, None).await {
//!     Ok(report) => println!("{} applied", report.applied.len()),
//!     Err(e) if e.is_lock_contention() => println!("another run is updating"),
//!     Err(e) => eprintln!("update failed: {e}"),
//! }
//! # }
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
