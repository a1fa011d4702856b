//! Structured logging setup using tracing
//!
//! Console output is always on. When `logging.local_enabled` is set, a JSON
//! layer writes to a rolling file under `logging.local_path`.

use crate::config::LoggingConfig;
use crate::domain::{CairnError, Result};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Guard that must be kept alive for the duration of the program
/// to ensure logs are flushed properly
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

impl LoggingGuard {
    fn new(file_guard: Option<WorkerGuard>) -> Self {
        Self {
            _file_guard: file_guard,
        }
    }
}

/// Initialize the logging system based on configuration
///
/// `RUST_LOG` takes precedence over `log_level_str` when set.
///
/// # Errors
///
/// Fails on an unknown level, an uncreatable log directory, or when a global
/// subscriber is already installed.
///
/// # Example
///
/// ```no_run
/// use cairn::logging::init_logging;
/// use cairn::config::LoggingConfig;
///
/// let config = LoggingConfig::default();
/// let _guard = init_logging("info", &config).expect("Failed to initialize logging");
/// ```
pub fn init_logging(log_level_str: &str, config: &LoggingConfig) -> Result<LoggingGuard> {
    let log_level = parse_log_level(log_level_str)?;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("cairn={log_level}")));

    let mut layers = Vec::new();

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_filter(env_filter.clone());

    layers.push(console_layer.boxed());

    let file_guard = if config.local_enabled {
        let rotation = match config.local_rotation.as_str() {
            "hourly" => Rotation::HOURLY,
            "never" => Rotation::NEVER,
            _ => Rotation::DAILY,
        };

        std::fs::create_dir_all(&config.local_path).map_err(|e| {
            CairnError::Configuration(format!(
                "Failed to create log directory {}: {}",
                config.local_path, e
            ))
        })?;

        let file_appender = RollingFileAppender::new(rotation, &config.local_path, "cairn.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_writer(non_blocking)
            .with_filter(env_filter);

        layers.push(file_layer.boxed());
        Some(guard)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| CairnError::Configuration(format!("Failed to install logger: {e}")))?;

    tracing::debug!(
        local_enabled = config.local_enabled,
        local_path = %config.local_path,
        "Logging initialized"
    );

    Ok(LoggingGuard::new(file_guard))
}

/// Parse log level from string
fn parse_log_level(level_str: &str) -> Result<Level> {
    match level_str.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(CairnError::Configuration(format!(
            "Invalid log level: {level_str}. Must be one of: trace, debug, info, warn, error"
        ))),
    }
}
