use serde::{Deserialize, Serialize};

/// Data store connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Endpoint override, e.g. a local store at `http://localhost:8000`.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Region to sign requests for.
    #[serde(default = "default_region")]
    pub region: String,

    /// Prefix applied to every table name the runner touches.
    #[serde(default)]
    pub table_prefix: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: default_region(),
            table_prefix: None,
        }
    }
}

impl StoreConfig {
    /// Apply the configured prefix to a table name.
    pub fn table_name(&self, name: &str) -> String {
        match &self.table_prefix {
            Some(prefix) => format!("{}{}", prefix, name),
            None => name.to_string(),
        }
    }
}

fn default_region() -> String {
    "eu-west-1".to_string()
}
