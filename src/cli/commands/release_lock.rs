//! Release-lock command implementation
//!
//! Clears a migration lock left behind by a run that died while holding it.

use crate::cli::{exit_code, EXIT_CONFIGURATION, EXIT_OK};
use crate::config::load_config;
use crate::core::DatabaseUpdater;
use clap::Args;

/// Arguments for the release-lock command
#[derive(Args, Debug)]
pub struct ReleaseLockArgs {
    /// Confirm that no other update is running
    #[arg(long)]
    pub force: bool,
}

impl ReleaseLockArgs {
    /// Execute the release-lock command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        if !self.force {
            println!("❌ Refusing to release the change log lock without --force");
            println!("   Make sure no other update is running, then pass --force");
            return Ok(EXIT_CONFIGURATION);
        }

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(EXIT_CONFIGURATION);
            }
        };
        let updater = DatabaseUpdater::new(config);

        tracing::warn!("Operator requested forced release of the change log lock");
        match updater.release_database_lock().await {
            Ok(()) => {
                println!("✅ Change log lock released");
                Ok(EXIT_OK)
            }
            Err(e) => {
                println!("❌ Failed to release the change log lock");
                println!("   Error: {e}");
                Ok(exit_code(&e))
            }
        }
    }
}
