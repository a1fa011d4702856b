//! CLI command implementations
//!
//! This module contains all CLI command implementations.

pub mod init;
pub mod release_lock;
pub mod status;
pub mod update;
pub mod validate;
