pub mod config;
pub mod error;
pub mod migration;
pub mod schema;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::TidemarkConfig;
pub use error::{MigrateError, Result};
pub use migration::{
    HistoryStore, MigrationInfo, MigrationRecord, MigrationUnit, SchemaGateway, Timestamp,
};
pub use schema::{AttributeDefinition, AttributeType, KeySchema, TableSpec};
