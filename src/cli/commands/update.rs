//! Update command implementation
//!
//! This module implements the `update` command, which applies pending
//! changesets to the configured database.

use crate::cli::{exit_code, EXIT_CONFIGURATION, EXIT_OK};
use crate::config::load_config;
use crate::core::DatabaseUpdater;
use crate::domain::ChangeSet;
use crate::log_error_with_context;
use clap::Args;

/// Arguments for the update command
#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Changelog to run instead of the configured ones (repeatable)
    #[arg(long)]
    pub changelog: Vec<String>,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

impl UpdateArgs {
    /// Execute the update command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Starting update command");

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Configuration error: {e}");
                return Ok(EXIT_CONFIGURATION);
            }
        };

        let files = if self.changelog.is_empty() {
            config.changelog.files.clone()
        } else {
            self.changelog.clone()
        };
        let updater = DatabaseUpdater::new(config);

        match updater.updates_required_in(&files).await {
            Ok(true) => {}
            Ok(false) => {
                println!("✅ Database is up to date");
                return Ok(EXIT_OK);
            }
            Err(e) => {
                tracing::error!(error = %e, "Could not check for pending updates");
                eprintln!("Could not check for pending updates: {e}");
                return Ok(exit_code(&e));
            }
        }

        let pending = match updater.pending_changes_in(&files).await {
            Ok(p) => p,
            Err(e) => {
                eprintln!("Could not list pending changesets: {e}");
                return Ok(exit_code(&e));
            }
        };

        if !self.yes && !updater.allow_auto_update() {
            println!("Pending changesets:");
            for change_set in &pending {
                println!(
                    "  - {} ({}) [{}] {}",
                    change_set.id, change_set.author, change_set.run_status, change_set.description
                );
            }
            println!();
            print!("Apply {} changeset(s)? [y/N]: ", pending.len());
            use std::io::{self, Write};
            io::stdout().flush()?;

            let mut input = String::new();
            io::stdin().read_line(&mut input)?;

            if !input.trim().eq_ignore_ascii_case("y") {
                println!("Update cancelled.");
                return Ok(EXIT_OK);
            }
        }

        println!("🚀 Applying {} changeset(s)...", pending.len());
        println!();

        let progress = |change_set: &ChangeSet, remaining: usize| {
            println!("  ▶ {} by {} ({remaining} remaining)", change_set.id(), change_set.author());
        };

        let report = match updater.execute_changelogs(&files, Some(&progress)).await {
            Ok(r) => r,
            Err(e) => {
                log_error_with_context!(e, "Update failed");
                println!();
                if e.is_lock_contention() || e.is_busy() {
                    println!("⏳ Updates pending but another run holds the lock, try again later");
                } else {
                    println!("❌ Update failed");
                }
                println!("   Error: {e}");
                return Ok(exit_code(&e));
            }
        };

        println!();
        println!("📊 Update Summary:");
        println!("  Applied: {}", report.applied.len());
        println!("  Duration: {:.2}s", report.duration.as_secs_f64());

        if !report.warnings.is_empty() {
            println!();
            println!("⚠️  Warnings (also written to the update log):");
            for warning in &report.warnings {
                println!("  - {warning}");
            }
        }

        println!();
        println!("✅ Update completed successfully!");
        Ok(EXIT_OK)
    }
}
