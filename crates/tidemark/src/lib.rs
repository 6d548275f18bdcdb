//! Tidemark - namespaced schema migrations for DynamoDB.
//!
//! Tracks which timestamped migrations have run in each namespace, applies
//! pending ones in order and rolls back the most recent one.

mod runtime;

pub use tidemark_core;
pub use tidemark_runtime;

pub use runtime::{DynamoMigrationManager, TidemarkBuilder};

/// Commonly used types.
pub mod prelude {
    pub use tidemark_core::config::TidemarkConfig;
    pub use tidemark_core::error::{MigrateError, Result};
    pub use tidemark_core::migration::{
        BoxFuture, HistoryStore, MigrationInfo, MigrationRecord, MigrationUnit, SchemaGateway,
        Timestamp,
    };
    pub use tidemark_core::schema::{AttributeType, TableSpec};
    pub use tidemark_runtime::migrations::{
        MigrationManager, MigrationRegistry, MigrationStatus, TableChange, TableMigration,
    };
    pub use tidemark_runtime::store::{DynamoHistory, DynamoStore};

    pub use crate::runtime::{DynamoMigrationManager, TidemarkBuilder};
}
