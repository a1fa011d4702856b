//! Status command implementation
//!
//! This module implements the `status` command for displaying pending
//! changesets and the state of the migration lock.

use crate::cli::{exit_code, EXIT_CONFIGURATION, EXIT_OK};
use crate::config::load_config;
use crate::core::DatabaseUpdater;
use crate::domain::RunStatus;
use clap::Args;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Changelog to inspect instead of the configured ones (repeatable)
    #[arg(long)]
    pub changelog: Vec<String>,

    /// Print pending changesets as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    /// Execute the status command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Checking database status");

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(EXIT_CONFIGURATION);
            }
        };

        let files = if self.changelog.is_empty() {
            config.changelog.files.clone()
        } else {
            self.changelog.clone()
        };
        let updater = DatabaseUpdater::new(config);

        let pending = match updater.pending_changes_in(&files).await {
            Ok(p) => p,
            Err(e) => {
                println!("❌ Failed to read pending changesets");
                println!("   Error: {e}");
                return Ok(exit_code(&e));
            }
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&pending)?);
            return Ok(EXIT_OK);
        }

        println!("📊 Database Status");
        println!();

        match updater.list_locks().await {
            Ok(locks) if locks.is_empty() => println!("🔓 Change log lock: free"),
            Ok(locks) => {
                for lock in locks {
                    println!(
                        "🔒 Change log lock held by {} since {}",
                        lock.locked_by.as_deref().unwrap_or("unknown"),
                        lock.lock_granted
                            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                            .unwrap_or_else(|| "unknown".to_string())
                    );
                }
            }
            Err(e) => println!("⚠️  Could not read change log lock: {e}"),
        }
        println!();

        if pending.is_empty() {
            println!("✅ Database is up to date.");
            return Ok(EXIT_OK);
        }

        println!("Found {} pending changeset(s):", pending.len());
        println!();
        println!(
            "{:<45} {:<15} {:<18} {:<20} {:<30}",
            "Changeset", "Author", "Status", "Last Run", "Description"
        );
        println!("{}", "-".repeat(130));

        for change_set in &pending {
            let status = match change_set.run_status {
                RunStatus::NotRun => "⏸️  Not run",
                RunStatus::Ran => "✅ Ran",
                RunStatus::RanButChanged => "🔄 Changed",
                RunStatus::RunInError => "❌ In error",
            };

            let last_run = change_set
                .ran_date
                .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "Never".to_string());

            println!(
                "{:<45} {:<15} {:<18} {:<20} {:<30}",
                change_set.id, change_set.author, status, last_run, change_set.description
            );
        }

        println!();
        println!("Run 'cairn update' to apply them.");
        Ok(EXIT_OK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_args_defaults() {
        let args = StatusArgs {
            changelog: Vec::new(),
            json: false,
        };
        assert!(args.changelog.is_empty());
        assert!(!args.json);
    }

    #[tokio::test]
    async fn test_missing_config_is_configuration_error() {
        let args = StatusArgs {
            changelog: vec!["site.toml".to_string()],
            json: true,
        };
        let code = args.execute("/nonexistent/cairn.toml").await.unwrap();
        assert_eq!(code, EXIT_CONFIGURATION);
    }
}
