// Cairn - Database schema updates driven by versioned changelogs
// Copyright (c) 2025 Cairn Contributors
// Licensed under the MIT License

use cairn::cli::{Cli, Commands, EXIT_FAILURE};
use cairn::config::{load_config, LoggingConfig};
use cairn::logging::init_logging;
use clap::Parser;
use std::process;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // File logging and the default level come from the config file when it
    // loads; the command itself reports any configuration error
    let (config_level, logging_config) = match load_config(&cli.config) {
        Ok(config) => (config.application.log_level, config.logging),
        Err(_) => ("info".to_string(), LoggingConfig::default()),
    };
    let log_level = cli.log_level.clone().unwrap_or(config_level);

    let guard = match init_logging(&log_level, &logging_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(EXIT_FAILURE);
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Cairn - database schema updates"
    );

    let exit_code = match execute_command(&cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command execution failed");
            eprintln!("Error: {e}");
            EXIT_FAILURE
        }
    };

    // process::exit skips destructors
    drop(guard);
    process::exit(exit_code);
}

/// Execute the CLI command
async fn execute_command(cli: &Cli) -> anyhow::Result<i32> {
    match &cli.command {
        Commands::Status(args) => args.execute(&cli.config).await,
        Commands::Update(args) => args.execute(&cli.config).await,
        Commands::ReleaseLock(args) => args.execute(&cli.config).await,
        Commands::ValidateConfig(args) => args.execute(&cli.config).await,
        Commands::Init(args) => args.execute().await,
    }
}
