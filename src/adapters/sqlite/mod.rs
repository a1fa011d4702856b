//! SQLite integration
//!
//! Provides the [`SqliteDatabase`] session used for `sqlite:` URLs, mostly by
//! development installs and the integration tests.

pub mod client;

pub use client::{SqliteDatabase, MEMORY_PATH};
