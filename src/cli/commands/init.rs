//! Init command implementation
//!
//! This module implements the `init` command for generating a sample
//! configuration file.

use crate::cli::{EXIT_CONFIGURATION, EXIT_FAILURE, EXIT_OK};
use clap::Args;
use std::fs;
use std::path::Path;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path where to create the configuration file
    #[arg(short, long, default_value = "cairn.toml")]
    pub output: String,

    /// Overwrite existing file
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    /// Execute the init command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        tracing::info!(output = %self.output, "Initializing configuration file");

        println!("📝 Initializing Cairn configuration");
        println!();

        if Path::new(&self.output).exists() && !self.force {
            println!("❌ Configuration file already exists: {}", self.output);
            println!("   Use --force to overwrite");
            return Ok(EXIT_CONFIGURATION);
        }

        match fs::write(&self.output, Self::sample_config()) {
            Ok(()) => {
                println!("✅ Configuration file created: {}", self.output);
                println!();
                println!("Next steps:");
                println!("  1. Edit {} with your database settings", self.output);
                println!("  2. Put the database password in a .env file as CAIRN_DB_PASSWORD");
                println!("  3. Validate configuration: cairn validate-config");
                println!("  4. Review pending changesets: cairn status");
                println!("  5. Apply them: cairn update");
                println!();
                Ok(EXIT_OK)
            }
            Err(e) => {
                println!("❌ Failed to write configuration file");
                println!("   Error: {e}");
                Ok(EXIT_FAILURE)
            }
        }
    }

    /// Sample configuration with every section and its defaults
    pub fn sample_config() -> &'static str {
        r#"# Cairn Configuration File
# Database schema updates driven by versioned changelogs

[application]
# Log level (trace, debug, info, warn, error)
log_level = "info"

# The update log (database-update-logs.txt) is appended here
data_directory = "."

# User id recorded as changed_by on rows repaired during an update
# authenticated_user_id = 1

[database]
# postgresql://host:5432/db, jdbc:postgresql://host:5432/db or sqlite:///path/to/file.db
url = "postgresql://localhost:5432/openmrs"
username = "openmrs"
password = "${CAIRN_DB_PASSWORD}"

# Apply pending changesets without asking
auto_update = false

connect_timeout_seconds = 30
application_name = "cairn"

# PostgreSQL TLS mode (disable, prefer, require)
ssl_mode = "prefer"

[changelog]
# Extra directory searched for changelog files after the bundled ones
# directory = "/etc/cairn/changelogs"

# Changelogs run in this order
files = ["cairn-core-changelog.toml"]

# Only changesets in these contexts run (changesets without contexts always run)
contexts = ["core"]

[lock]
# How long to wait for another run to release the migration lock
wait_timeout_seconds = 300
poll_interval_ms = 1000

[logging]
local_enabled = false
local_path = "/var/log/cairn"
local_rotation = "daily"  # hourly | daily | never
"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CairnConfig;
    use tempfile::TempDir;

    #[test]
    fn test_sample_config_parses() {
        let sample = InitArgs::sample_config().replace("${CAIRN_DB_PASSWORD}", "secret");
        let config: CairnConfig = toml::from_str(&sample).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.changelog.files, vec!["cairn-core-changelog.toml"]);
    }

    #[tokio::test]
    async fn test_refuses_to_overwrite_without_force() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("cairn.toml");
        let args = InitArgs {
            output: output.to_string_lossy().to_string(),
            force: false,
        };

        assert_eq!(args.execute().await.unwrap(), EXIT_OK);
        assert!(output.exists());
        assert_eq!(args.execute().await.unwrap(), EXIT_CONFIGURATION);

        let forced = InitArgs {
            output: output.to_string_lossy().to_string(),
            force: true,
        };
        assert_eq!(forced.execute().await.unwrap(), EXIT_OK);
    }
}
