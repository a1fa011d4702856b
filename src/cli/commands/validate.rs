//! Validate config command implementation
//!
//! This module implements the `validate-config` command. It checks the
//! configuration file and parses the configured changelogs without touching
//! the database.

use crate::adapters::database::{resolve_vendor, safe_url};
use crate::cli::{EXIT_CONFIGURATION, EXIT_OK};
use crate::config::load_config;
use crate::core::changelog::{ChangelogLocator, ChangelogParser};
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        // load_config validates as well
        let config = match load_config(config_path) {
            Ok(c) => {
                println!("✅ Configuration file loaded successfully");
                c
            }
            Err(e) => {
                println!("❌ Configuration validation failed");
                println!("   Error: {e}");
                return Ok(EXIT_CONFIGURATION);
            }
        };

        let vendor = match resolve_vendor(config.database.driver.as_deref(), &config.database.url) {
            Ok(v) => v,
            Err(e) => {
                println!("❌ {e}");
                return Ok(EXIT_CONFIGURATION);
            }
        };

        let locator = ChangelogLocator::new(config.changelog.directory.clone());
        let parser = ChangelogParser::new(&locator);
        let mut failed = false;
        let mut parsed = Vec::new();
        for file in &config.changelog.files {
            match parser.parse(Some(file)) {
                Ok(changelog) => parsed.push((file.clone(), changelog.change_sets.len())),
                Err(e) => {
                    println!("❌ Changelog {file}: {e}");
                    failed = true;
                }
            }
        }
        if failed {
            return Ok(EXIT_CONFIGURATION);
        }

        println!("✅ Configuration is valid");
        println!();
        println!("Configuration Summary:");
        println!("  Log Level: {}", config.application.log_level);
        println!(
            "  Data Directory: {}",
            config.application.data_directory.display()
        );
        println!("  Database: {}", safe_url(&config.database.url));
        println!("  Vendor: {vendor}");
        println!("  Auto Update: {}", config.database.auto_update);
        println!("  Contexts: {:?}", config.changelog.contexts);
        println!("  Lock Wait Timeout: {}s", config.lock.wait_timeout_seconds);
        println!("  Changelogs:");
        for (file, count) in parsed {
            println!("    - {file} ({count} changesets)");
        }
        println!();
        Ok(EXIT_OK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_valid_config() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[database]\nurl = \"sqlite:///tmp/cairn-validate.db\"").unwrap();
        let code = ValidateArgs {}
            .execute(file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(code, EXIT_OK);
    }

    #[tokio::test]
    async fn test_missing_changelog_fails() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[database]\nurl = \"sqlite:///tmp/cairn-validate.db\"\n\n\
             [changelog]\nfiles = [\"does-not-exist.toml\"]"
        )
        .unwrap();
        let code = ValidateArgs {}
            .execute(file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(code, EXIT_CONFIGURATION);
    }
}
