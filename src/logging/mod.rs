//! Logging and observability
//!
//! This module provides:
//! - Structured console logging, plus optional JSON file logging with rotation
//! - The plain-text database update log appended after each run
//!
//! # Example
//!
//! ```no_run
//! use cairn::logging::init_logging;
//! use cairn::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!("Schema check started");
//! ```

pub mod structured;
pub mod update_log;

// Re-export commonly used items
pub use structured::{init_logging, LoggingGuard};
pub use update_log::{update_log_path, write_update_messages, UPDATE_LOG_FILE};

/// Log the start of a changeset
///
/// # Example
///
/// ```no_run
/// use cairn::log_change_set_start;
///
/// log_change_set_start!("core.toml::1::alice", 3);
/// ```
#[macro_export]
macro_rules! log_change_set_start {
    ($change_set:expr, $remaining:expr) => {
        tracing::info!(
            change_set = %$change_set,
            remaining = $remaining,
            "Applying changeset"
        );
    };
}

/// Log an error with context
///
/// # Example
///
/// ```no_run
/// use cairn::log_error_with_context;
/// use cairn::domain::CairnError;
///
/// let error = CairnError::Configuration("Invalid config".to_string());
/// log_error_with_context!(&error, "Failed to load configuration");
/// ```
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Error occurred"
        );
    };
}
