//! External system integrations for Cairn.
//!
//! - [`database`] - the [`MigrationDatabase`](database::MigrationDatabase)
//!   abstraction and connection provisioning
//! - [`postgresql`] - PostgreSQL session via tokio-postgres
//! - [`sqlite`] - SQLite session via rusqlite
//!
//! # Example
//!
//! ```rust,no_run
//! use cairn::adapters::database::connect;
//! use cairn::config::DatabaseConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = connect(&DatabaseConfig::new("sqlite://openmrs.db")).await?;
//! let rows = db.query("SELECT 1 AS one", &[]).await?;
//! assert_eq!(rows[0].get_i64("one")?, 1);
//! db.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod postgresql;
pub mod sqlite;
