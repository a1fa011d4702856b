//! PostgreSQL integration
//!
//! Provides the [`PostgresDatabase`] session used when `database.url` points at
//! a PostgreSQL server.

pub mod client;

pub use client::PostgresDatabase;
