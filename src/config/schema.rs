//! Configuration schema types
//!
//! This module defines the configuration structure for Cairn.

use crate::config::SecretString;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main Cairn configuration
///
/// This is the root configuration structure that maps to the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CairnConfig {
    /// Application-level settings
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Target database connection
    pub database: DatabaseConfig,

    /// Changelog resolution
    #[serde(default)]
    pub changelog: ChangelogConfig,

    /// Lock coordination
    #[serde(default)]
    pub lock: LockConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl CairnConfig {
    /// Creates a configuration for the given database with defaults everywhere else
    pub fn for_database(database: DatabaseConfig) -> Self {
        Self {
            application: ApplicationConfig::default(),
            database,
            changelog: ChangelogConfig::default(),
            lock: LockConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;
        self.database.validate()?;
        self.changelog.validate()?;
        self.lock.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Application data directory; the update log file is appended here
    #[serde(default = "default_data_directory")]
    pub data_directory: PathBuf,

    /// User id recorded as `changed_by` on rows repaired by custom changes
    #[serde(default)]
    pub authenticated_user_id: Option<i64>,
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.data_directory.as_os_str().is_empty() {
            return Err("application.data_directory cannot be empty".to_string());
        }

        Ok(())
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_directory: default_data_directory(),
            authenticated_user_id: None,
        }
    }
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL (`postgresql://`, `jdbc:postgresql://`, `sqlite://`, `jdbc:sqlite:`)
    pub url: String,

    /// Driver name (`postgresql`, `sqlite`) or legacy JDBC driver class;
    /// inferred from the URL when absent
    #[serde(default)]
    pub driver: Option<String>,

    /// Username; overrides any user embedded in the URL
    #[serde(default)]
    pub username: Option<String>,

    /// Password; overrides any password embedded in the URL
    /// Stored securely in memory and automatically zeroized on drop
    #[serde(default)]
    pub password: Option<SecretString>,

    /// Whether updates may be applied without an operator confirming them
    #[serde(default)]
    pub auto_update: bool,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout_seconds")]
    pub connect_timeout_seconds: u64,

    /// PostgreSQL `application_name` reported for Cairn's sessions
    #[serde(default = "default_application_name")]
    pub application_name: String,

    /// PostgreSQL TLS mode (disable, prefer, require)
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,

    /// SQLite busy timeout in milliseconds
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl DatabaseConfig {
    /// Creates a configuration for the given URL with defaults everywhere else
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            driver: None,
            username: None,
            password: None,
            auto_update: false,
            connect_timeout_seconds: default_connect_timeout_seconds(),
            application_name: default_application_name(),
            ssl_mode: default_ssl_mode(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }

    /// Connection timeout as a [`Duration`]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    fn validate(&self) -> Result<(), String> {
        if self.url.trim().is_empty() {
            return Err("database.url cannot be empty".to_string());
        }

        if self.connect_timeout_seconds == 0 || self.connect_timeout_seconds > 600 {
            return Err(format!(
                "database.connect_timeout_seconds must be between 1 and 600, got {}",
                self.connect_timeout_seconds
            ));
        }

        let valid_ssl_modes = ["disable", "prefer", "require"];
        if !valid_ssl_modes.contains(&self.ssl_mode.as_str()) {
            return Err(format!(
                "database.ssl_mode must be one of: {}, got '{}'",
                valid_ssl_modes.join(", "),
                self.ssl_mode
            ));
        }

        Ok(())
    }
}

/// Changelog resolution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangelogConfig {
    /// Filesystem directory searched for changelogs that are not bundled
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Changelogs checked by `updates_required` and `update`, in order
    #[serde(default = "default_changelog_files")]
    pub files: Vec<String>,

    /// Execution contexts changesets must match
    #[serde(default = "default_contexts")]
    pub contexts: Vec<String>,
}

impl ChangelogConfig {
    fn validate(&self) -> Result<(), String> {
        if self.files.is_empty() {
            return Err("changelog.files cannot be empty".to_string());
        }

        if let Some(blank) = self.files.iter().find(|f| f.trim().is_empty()) {
            return Err(format!("changelog.files contains a blank entry: '{blank}'"));
        }

        Ok(())
    }
}

impl Default for ChangelogConfig {
    fn default() -> Self {
        Self {
            directory: None,
            files: default_changelog_files(),
            contexts: default_contexts(),
        }
    }
}

/// Lock coordination configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// How long to wait for another run to release the lock
    #[serde(default = "default_wait_timeout_seconds")]
    pub wait_timeout_seconds: u64,

    /// Interval between lock acquisition attempts
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl LockConfig {
    /// Wait timeout as a [`Duration`]
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_seconds)
    }

    /// Poll interval as a [`Duration`]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn validate(&self) -> Result<(), String> {
        if self.poll_interval_ms == 0 {
            return Err("lock.poll_interval_ms must be > 0".to_string());
        }

        if self.poll_interval_ms > self.wait_timeout_seconds.saturating_mul(1000).max(1) {
            return Err(format!(
                "lock.poll_interval_ms ({}) cannot exceed lock.wait_timeout_seconds ({}s)",
                self.poll_interval_ms, self.wait_timeout_seconds
            ));
        }

        Ok(())
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            wait_timeout_seconds: default_wait_timeout_seconds(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Enable local file logging
    #[serde(default)]
    pub local_enabled: bool,

    /// Local log directory
    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// Log rotation strategy
    #[serde(default = "default_local_rotation")]
    pub local_rotation: String,
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging.local_rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid_rotations.join(", ")
            ));
        }

        if self.local_enabled && self.local_path.trim().is_empty() {
            return Err("logging.local_path cannot be empty when local logging is enabled".to_string());
        }

        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: false,
            local_path: default_local_path(),
            local_rotation: default_local_rotation(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_connect_timeout_seconds() -> u64 {
    30
}

fn default_application_name() -> String {
    "cairn".to_string()
}

fn default_ssl_mode() -> String {
    "prefer".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_changelog_files() -> Vec<String> {
    vec![crate::core::changelog::CORE_CHANGELOG.to_string()]
}

fn default_contexts() -> Vec<String> {
    vec![crate::core::DEFAULT_CONTEXT.to_string()]
}

fn default_wait_timeout_seconds() -> u64 {
    300
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_local_path() -> String {
    "/var/log/cairn".to_string()
}

fn default_local_rotation() -> String {
    "daily".to_string()
}
