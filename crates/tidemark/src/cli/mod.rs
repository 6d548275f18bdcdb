mod migrate;

use migrate::{ApplyCommand, RollbackCommand, StatusCommand};

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::Path;

use tidemark::prelude::*;

/// Tidemark - namespaced schema migrations for DynamoDB
#[derive(Parser)]
#[command(name = "tidemark")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path.
    #[arg(short, long, default_value = "tidemark.toml", global = true)]
    pub config: String,

    /// Migrations directory (overrides config).
    #[arg(short, long, global = true)]
    pub migrations_dir: Option<String>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Create the migration history table if it does not exist.
    Connect,

    /// Apply all pending migrations of a namespace.
    Apply(ApplyCommand),

    /// Roll back the most recent migrations of a namespace.
    Rollback(RollbackCommand),

    /// Show applied and pending migrations of a namespace.
    Status(StatusCommand),
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        let log_level = if self.verbose { "debug" } else { "info" };
        tracing_subscriber::fmt()
            .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.to_string()))
            .with_writer(std::io::stderr)
            .init();

        // Load .env if present
        dotenvy::dotenv().ok();

        let config = load_config(&self.config)?;
        let mut builder = TidemarkBuilder::<DynamoStore>::new(config);
        if let Some(dir) = &self.migrations_dir {
            builder = builder.migrations_dir(dir);
        }
        let manager = builder.build().await?;

        match self.command {
            Commands::Connect => migrate::connect(&manager).await,
            Commands::Apply(cmd) => cmd.execute(&manager).await,
            Commands::Rollback(cmd) => cmd.execute(&manager).await,
            Commands::Status(cmd) => cmd.execute(&manager).await,
        }
    }
}

/// Load the config file, falling back to defaults when it is absent.
fn load_config(path: &str) -> Result<TidemarkConfig> {
    if Path::new(path).exists() {
        tracing::debug!("Loading configuration from {}", path);
        Ok(TidemarkConfig::from_file(path)?)
    } else {
        tracing::debug!("No configuration file at {}, using defaults", path);
        Ok(TidemarkConfig::default())
    }
}
