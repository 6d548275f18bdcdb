use std::path::PathBuf;

use tidemark_core::config::TidemarkConfig;
use tidemark_core::error::Result;
use tidemark_core::migration::{MigrationUnit, SchemaGateway};
use tidemark_runtime::migrations::{load_migrations_from_dir, MigrationManager, MigrationRegistry};
use tidemark_runtime::store::{DynamoHistory, DynamoStore};
use tracing::info;

/// Manager wired to the DynamoDB backend.
pub type DynamoMigrationManager = MigrationManager<DynamoHistory, DynamoStore>;

/// Builder for a migration manager from configuration.
///
/// Units registered in code are combined with declarative migrations found in
/// the configured migrations directory.
pub struct TidemarkBuilder<G: SchemaGateway + 'static = DynamoStore> {
    config: TidemarkConfig,
    registry: MigrationRegistry<G>,
    migrations_dir: Option<PathBuf>,
}

impl<G: SchemaGateway + 'static> TidemarkBuilder<G> {
    pub fn new(config: TidemarkConfig) -> Self {
        let migrations_dir = Some(config.migrations.dir.clone());
        Self {
            config,
            registry: MigrationRegistry::new(),
            migrations_dir,
        }
    }

    /// Register a migration unit defined in code.
    pub fn register<M>(mut self, unit: M) -> Self
    where
        M: MigrationUnit<G> + 'static,
    {
        self.registry.register(unit);
        self
    }

    /// Override the migrations directory.
    pub fn migrations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.migrations_dir = Some(dir.into());
        self
    }

    /// Only use units registered in code.
    pub fn without_migrations_dir(mut self) -> Self {
        self.migrations_dir = None;
        self
    }

    pub fn config(&self) -> &TidemarkConfig {
        &self.config
    }

    /// Combine code-registered and declarative units, checking for duplicates.
    pub fn build_registry(&self) -> Result<MigrationRegistry<G>> {
        let mut registry = self.registry.clone();

        if let Some(dir) = &self.migrations_dir {
            let prefix = self.config.store.table_prefix.as_deref();
            let declared = load_migrations_from_dir(dir, prefix)?;
            if !declared.is_empty() {
                info!("Loaded {} migrations from {:?}", declared.len(), dir);
            }
            registry.extend(declared);
        }

        registry.validate()?;
        Ok(registry)
    }
}

impl TidemarkBuilder<DynamoStore> {
    /// Connect to the configured store and build the manager.
    pub async fn build(self) -> Result<DynamoMigrationManager> {
        let registry = self.build_registry()?;
        let store = DynamoStore::from_config(&self.config.store, &self.config.history).await;
        let history = store.history(self.config.history_table());

        Ok(MigrationManager::new(history, store, registry))
    }
}
