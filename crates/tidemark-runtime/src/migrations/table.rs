//! Declarative table migrations.
//!
//! A migration file lives at `<dir>/<namespace>/<YYYYMMDDHHMMSS>_<name>.toml`
//! and declares exactly one table change:
//!
//! ```toml
//! [create_table]
//! name = "test1"
//! key = "id"
//!
//! [[create_table.attributes]]
//! name = "id"
//! type = "S"
//! ```
//!
//! `drop_table` takes the same fields so the table can be re-created on rollback.

use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use tidemark_core::error::{MigrateError, Result};
use tidemark_core::migration::{BoxFuture, MigrationInfo, MigrationUnit, SchemaGateway, Timestamp};
use tidemark_core::schema::{AttributeDefinition, KeySchema, TableSpec};

/// The schema change a [`TableMigration`] performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableChange {
    /// Create on apply, drop on rollback.
    Create(TableSpec),
    /// Drop on apply, re-create on rollback.
    Drop(TableSpec),
}

/// A migration unit that creates or drops one table.
#[derive(Debug, Clone)]
pub struct TableMigration {
    info: MigrationInfo,
    change: TableChange,
}

impl TableMigration {
    pub fn new(info: MigrationInfo, change: TableChange) -> Self {
        Self { info, change }
    }

    /// Unit that creates `spec`.
    pub fn create_table(info: MigrationInfo, spec: TableSpec) -> Self {
        Self::new(info, TableChange::Create(spec))
    }

    /// Unit that drops `spec`.
    pub fn drop_table(info: MigrationInfo, spec: TableSpec) -> Self {
        Self::new(info, TableChange::Drop(spec))
    }

    pub fn change(&self) -> &TableChange {
        &self.change
    }

    /// Parse a migration file.
    pub fn from_file(path: &Path, namespace: &str, table_prefix: Option<&str>) -> Result<Self> {
        let stem = path.file_stem().and_then(|s| s.to_str()).ok_or_else(|| {
            MigrateError::Config(format!("Invalid migration filename: {:?}", path))
        })?;

        let (timestamp, name) = match stem.split_once('_') {
            Some((ts, name)) if !name.is_empty() => (ts, name),
            Some((ts, _)) => (ts, ts),
            None => (stem, stem),
        };
        let timestamp = Timestamp::parse(timestamp).map_err(|e| {
            MigrateError::Config(format!("Invalid migration filename {:?}: {}", path, e))
        })?;

        let content = std::fs::read_to_string(path)?;
        let file: MigrationFile = toml::from_str(&content).map_err(|e| {
            MigrateError::Config(format!("Invalid migration file {:?}: {}", path, e))
        })?;

        let change = match (file.create_table, file.drop_table) {
            (Some(decl), None) => TableChange::Create(decl.into_spec(table_prefix)?),
            (None, Some(decl)) => TableChange::Drop(decl.into_spec(table_prefix)?),
            _ => {
                return Err(MigrateError::Config(format!(
                    "Migration file {:?} must declare exactly one of [create_table] or [drop_table]",
                    path
                )))
            }
        };

        Ok(Self::new(MigrationInfo::new(timestamp, namespace, name), change))
    }
}

impl<G: SchemaGateway> MigrationUnit<G> for TableMigration {
    fn info(&self) -> &MigrationInfo {
        &self.info
    }

    fn apply<'a>(&'a self, gateway: &'a G) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            match &self.change {
                TableChange::Create(spec) => gateway.create_table(spec).await,
                TableChange::Drop(spec) => gateway.drop_table(&spec.name).await,
            }
        })
    }

    fn rollback<'a>(&'a self, gateway: &'a G) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            match &self.change {
                TableChange::Create(spec) => gateway.drop_table(&spec.name).await,
                TableChange::Drop(spec) => gateway.create_table(spec).await,
            }
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MigrationFile {
    #[serde(default)]
    create_table: Option<TableDecl>,
    #[serde(default)]
    drop_table: Option<TableDecl>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TableDecl {
    name: String,
    key: String,
    #[serde(default)]
    range_key: Option<String>,
    attributes: Vec<AttributeDefinition>,
}

impl TableDecl {
    fn into_spec(self, table_prefix: Option<&str>) -> Result<TableSpec> {
        let spec = TableSpec {
            name: format!("{}{}", table_prefix.unwrap_or(""), self.name),
            attributes: self.attributes,
            key: KeySchema {
                hash_key: self.key,
                range_key: self.range_key,
            },
        };
        spec.validate()?;
        Ok(spec)
    }
}

/// Load declarative migrations from a directory.
///
/// Each subdirectory is a namespace; each `.toml` file inside it is one
/// migration. Other files are ignored. A missing directory yields no
/// migrations. The result is sorted by namespace, then timestamp.
pub fn load_migrations_from_dir(
    dir: &Path,
    table_prefix: Option<&str>,
) -> Result<Vec<TableMigration>> {
    if !dir.exists() {
        debug!("Migrations directory does not exist: {:?}", dir);
        return Ok(Vec::new());
    }

    let mut migrations = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let namespace = match path.file_name().and_then(|s| s.to_str()) {
            Some(name) if !name.starts_with('.') => name.to_string(),
            _ => continue,
        };

        for file in std::fs::read_dir(&path)? {
            let file = file?.path();
            if file.is_file() && file.extension().map(|e| e == "toml").unwrap_or(false) {
                migrations.push(TableMigration::from_file(&file, &namespace, table_prefix)?);
            }
        }
    }

    migrations.sort_by(|a, b| {
        (a.info.namespace.as_str(), &a.info.timestamp)
            .cmp(&(b.info.namespace.as_str(), &b.info.timestamp))
    });

    debug!("Loaded {} declarative migrations", migrations.len());
    Ok(migrations)
}
