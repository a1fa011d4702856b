//! Database abstraction layer
//!
//! The migration engine works against [`MigrationDatabase`], so the same
//! changelogs run on PostgreSQL and SQLite.

pub mod factory;
pub mod traits;

pub use factory::{close_quietly, connect, resolve_vendor, safe_url};
pub use traits::{MigrationDatabase, Row, SqlValue, Vendor};
