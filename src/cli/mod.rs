//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for Cairn using clap.

pub mod commands;

use crate::domain::CairnError;
use clap::{Parser, Subcommand};

/// Exit code for a successful command
pub const EXIT_OK: i32 = 0;
/// Exit code for configuration and changelog problems
pub const EXIT_CONFIGURATION: i32 = 2;
/// Exit code when another run holds the migration lock
pub const EXIT_LOCKED: i32 = 3;
/// Exit code when the database cannot be reached
pub const EXIT_CONNECTION: i32 = 4;
/// Exit code for failed changesets and everything else
pub const EXIT_FAILURE: i32 = 5;

/// Maps an error to the process exit code
pub fn exit_code(error: &CairnError) -> i32 {
    match error {
        e if e.is_lock_contention() || e.is_busy() => EXIT_LOCKED,
        e if e.is_configuration() => EXIT_CONFIGURATION,
        CairnError::Connection(_) => EXIT_CONNECTION,
        _ => EXIT_FAILURE,
    }
}

/// Cairn - database schema updates for the clinical data store
#[derive(Parser, Debug)]
#[command(name = "cairn")]
#[command(version, about, long_about = None)]
#[command(author = "Cairn Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "cairn.toml", env = "CAIRN_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "CAIRN_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show pending changesets and the migration lock
    Status(commands::status::StatusArgs),

    /// Apply pending changesets
    Update(commands::update::UpdateArgs),

    /// Clear a migration lock left behind by a crashed run
    ReleaseLock(commands::release_lock::ReleaseLockArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChangelogError, LockError};
    use test_case::test_case;

    #[test]
    fn test_cli_parse_update() {
        let cli = Cli::parse_from(["cairn", "update"]);
        assert_eq!(cli.config, "cairn.toml");
        assert!(matches!(cli.command, Commands::Update(_)));
    }

    #[test]
    fn test_cli_parse_with_config() {
        let cli = Cli::parse_from(["cairn", "--config", "custom.toml", "status"]);
        assert_eq!(cli.config, "custom.toml");
    }

    #[test]
    fn test_cli_parse_with_log_level() {
        let cli = Cli::parse_from(["cairn", "--log-level", "debug", "status"]);
        assert_eq!(cli.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_cli_parse_update_changelogs() {
        let cli = Cli::parse_from([
            "cairn",
            "update",
            "--changelog",
            "a.toml",
            "--changelog",
            "b.toml",
            "--yes",
        ]);
        match cli.command {
            Commands::Update(args) => {
                assert_eq!(args.changelog, vec!["a.toml", "b.toml"]);
                assert!(args.yes);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_parse_release_lock() {
        let cli = Cli::parse_from(["cairn", "release-lock", "--force"]);
        assert!(matches!(
            cli.command,
            Commands::ReleaseLock(ref args) if args.force
        ));
    }

    #[test]
    fn test_cli_parse_validate_config_and_init() {
        let cli = Cli::parse_from(["cairn", "validate-config"]);
        assert!(matches!(cli.command, Commands::ValidateConfig(_)));
        let cli = Cli::parse_from(["cairn", "init"]);
        assert!(matches!(cli.command, Commands::Init(_)));
    }

    #[test_case(CairnError::Configuration("x".into()) => EXIT_CONFIGURATION ; "configuration")]
    #[test_case(CairnError::Changelog(ChangelogError::NotFound("x".into())) => EXIT_CONFIGURATION ; "changelog")]
    #[test_case(CairnError::Lock(LockError::Contention { locked_by: None, since: None, waited_secs: 1 }) => EXIT_LOCKED ; "contention")]
    #[test_case(CairnError::Busy("database is locked".into()) => EXIT_LOCKED ; "busy")]
    #[test_case(CairnError::Connection("x".into()) => EXIT_CONNECTION ; "connection")]
    #[test_case(CairnError::ChangeSetFailed { change_set: "x".into(), message: "y".into() } => EXIT_FAILURE ; "changeset")]
    fn test_exit_codes(error: CairnError) -> i32 {
        exit_code(&error)
    }
}
