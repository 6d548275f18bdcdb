mod store;

pub use store::StoreConfig;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{MigrateError, Result};
use crate::migration::DEFAULT_HISTORY_TABLE;

/// Root configuration for Tidemark.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TidemarkConfig {
    /// Data store connection.
    #[serde(default)]
    pub store: StoreConfig,

    /// Migration history table.
    #[serde(default)]
    pub history: HistoryConfig,

    /// Migration discovery.
    #[serde(default)]
    pub migrations: MigrationsConfig,
}

impl TidemarkConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| MigrateError::Config(format!("Failed to read config file: {}", e)))?;
        tracing::debug!(path = %path.as_ref().display(), "Read configuration file");

        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let content = substitute_env_vars(content);

        toml::from_str(&content)
            .map_err(|e| MigrateError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Fully qualified history table name, prefix included.
    pub fn history_table(&self) -> String {
        self.store.table_name(&self.history.table_name)
    }
}

/// History table configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Table holding one row per applied migration.
    #[serde(default = "default_history_table")]
    pub table_name: String,

    /// How long to wait for a newly created table to become usable.
    #[serde(default = "default_create_timeout")]
    pub create_timeout_secs: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            table_name: default_history_table(),
            create_timeout_secs: default_create_timeout(),
        }
    }
}

fn default_history_table() -> String {
    DEFAULT_HISTORY_TABLE.to_string()
}

fn default_create_timeout() -> u64 {
    30
}

/// Migration discovery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationsConfig {
    /// Directory scanned for declarative migrations, one subdirectory per namespace.
    #[serde(default = "default_migrations_dir")]
    pub dir: PathBuf,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            dir: default_migrations_dir(),
        }
    }
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

static ENV_VAR: Lazy<regex_lite::Regex> = Lazy::new(|| {
    regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid env var pattern")
});

/// Replace `${VAR}` references with values from the environment.
/// Unset variables are left untouched.
fn substitute_env_vars(content: &str) -> String {
    let mut result = content.to_string();

    for cap in ENV_VAR.captures_iter(content) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(value) => result = result.replace(&cap[0], &value),
            Err(_) => tracing::warn!("Config references unset variable {}", var_name),
        }
    }

    result
}
