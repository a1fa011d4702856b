//! Configuration management for Cairn.
//!
//! Cairn reads a TOML file with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `CAIRN_<SECTION>_<KEY>` environment overrides
//! - Default values for optional settings
//! - Validation on load
//!
//! Hosting applications that only have a Java-style runtime properties file
//! can use [`RuntimeProperties`] instead.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use cairn::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("cairn.toml")?;
//! println!("Changelogs: {}", config.changelog.files.join(", "));
//! println!("Auto update: {}", config.database.auto_update);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration Structure
//!
//! - [`ApplicationConfig`] - log level, data directory, acting user
//! - [`DatabaseConfig`] - connection URL, driver, credentials
//! - [`ChangelogConfig`] - changelog files, search directory, contexts
//! - [`LockConfig`] - lock wait timeout and poll interval
//! - [`LoggingConfig`] - local file logging
//!
//! # Example Configuration
//!
//! ```toml
//! [application]
//! log_level = "info"
//! data_directory = "/var/lib/openmrs"
//!
//! [database]
//! url = "postgresql://db.example.org:5432/openmrs"
//! username = "openmrs"
//! password = "${CAIRN_DB_PASSWORD}"
//!
//! [changelog]
//! files = ["cairn-core-changelog.toml"]
//! contexts = ["core"]
//! ```

pub mod loader;
pub mod runtime;
pub mod schema;
pub mod secret;

// Re-export commonly used types
pub use loader::load_config;
pub use runtime::RuntimeProperties;
pub use schema::{
    ApplicationConfig, CairnConfig, ChangelogConfig, DatabaseConfig, LockConfig, LoggingConfig,
};
pub use secret::{secret_string, secret_string_opt, SecretString, SecretValue};
