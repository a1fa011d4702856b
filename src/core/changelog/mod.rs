//! Changelog location and parsing
//!
//! - [`locator`] - bundled-then-filesystem resolution of changelog names
//! - [`parser`] - TOML changelog documents to ordered [`ChangeSet`](crate::domain::ChangeSet)s

pub mod locator;
pub mod parser;

pub use locator::{
    ChangelogLocator, ChangelogOrigin, ResolvedChangelog, CORE_CHANGELOG, EMPTY_CHANGELOG,
};
pub use parser::{ChangelogParser, DatabaseChangeLog};
