use anyhow::Result;
use clap::Parser;
use console::style;

use tidemark::prelude::*;

fn header(title: &str) {
    println!();
    println!("  {} {}", style("TIDEMARK").bold().cyan(), style(title).bold());
    println!();
}

/// Create the history table if needed.
pub async fn connect(manager: &DynamoMigrationManager) -> Result<()> {
    header("Connect");
    manager.connect().await?;
    println!(
        "  {} History table {} is ready",
        style("✓").green(),
        style(manager.history_table()).cyan()
    );
    println!();
    Ok(())
}

/// Apply all pending migrations of a namespace.
#[derive(Parser)]
pub struct ApplyCommand {
    /// Namespace to migrate.
    pub namespace: String,
}

impl ApplyCommand {
    pub async fn execute(self, manager: &DynamoMigrationManager) -> Result<()> {
        header("Apply");

        manager.connect().await?;

        println!(
            "  {} Running pending migrations for {}...",
            style("→").dim(),
            style(&self.namespace).cyan()
        );
        let applied = manager.apply(&self.namespace).await?;

        if applied.is_empty() {
            println!("  {} Nothing to apply", style("ℹ").blue());
        } else {
            for timestamp in &applied {
                println!("  {} Applied: {}", style("✓").green(), timestamp);
            }
            println!();
            println!(
                "  {} Applied {} migration(s)",
                style("✓").green(),
                applied.len()
            );
        }
        println!();
        Ok(())
    }
}

/// Roll back the most recent migrations of a namespace.
#[derive(Parser)]
pub struct RollbackCommand {
    /// Namespace to roll back.
    pub namespace: String,

    /// Number of migrations to roll back, one at a time.
    #[arg(long, default_value = "1")]
    pub steps: usize,
}

impl RollbackCommand {
    pub async fn execute(self, manager: &DynamoMigrationManager) -> Result<()> {
        header("Rollback");

        if self.steps == 0 {
            println!("  {} Nothing to roll back (steps=0)", style("ℹ").blue());
            return Ok(());
        }

        let mut rolled_back = Vec::new();
        for _ in 0..self.steps {
            match manager.rollback(&self.namespace).await? {
                Some(timestamp) => {
                    println!("  {} Rolled back: {}", style("✓").green(), timestamp);
                    rolled_back.push(timestamp);
                }
                None => break,
            }
        }

        if rolled_back.is_empty() {
            println!("  {} No migrations to roll back", style("ℹ").blue());
        } else {
            println!();
            println!(
                "  {} Rolled back {} migration(s)",
                style("✓").green(),
                rolled_back.len()
            );
        }
        println!();
        Ok(())
    }
}

/// Show migration status of a namespace.
#[derive(Parser)]
pub struct StatusCommand {
    /// Namespace to inspect.
    pub namespace: String,
}

impl StatusCommand {
    pub async fn execute(self, manager: &DynamoMigrationManager) -> Result<()> {
        header("Status");

        let status = manager.status(&self.namespace).await?;

        if status.applied.is_empty() && status.pending.is_empty() && status.orphaned.is_empty() {
            println!("  {} No migrations found", style("ℹ").blue());
            println!();
            return Ok(());
        }

        if !status.applied.is_empty() {
            println!("  {} Applied:", style("✓").green());
            for record in &status.applied {
                let applied_at = record
                    .applied_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                println!(
                    "    {} {} {} ({})",
                    style(&record.timestamp).cyan(),
                    record.name.as_deref().unwrap_or(""),
                    style("at").dim(),
                    applied_at
                );
            }
        }

        if !status.pending.is_empty() {
            println!();
            println!("  {} Pending:", style("○").yellow());
            for info in &status.pending {
                println!(
                    "    {} {} {}",
                    style("→").dim(),
                    style(&info.timestamp).yellow(),
                    info.name
                );
            }
        }

        if !status.orphaned.is_empty() {
            println!();
            println!(
                "  {} Recorded but not registered:",
                style("!").red().bold()
            );
            for record in &status.orphaned {
                println!("    {} {}", style("×").red(), record.timestamp);
            }
        }

        println!();
        println!(
            "  {} {} applied, {} pending",
            style("ℹ").blue(),
            status.applied.len(),
            status.pending.len()
        );
        println!();
        Ok(())
    }
}
