pub mod migrations;
pub mod store;

pub use migrations::{
    load_migrations_from_dir, MigrationManager, MigrationRegistry, MigrationStatus,
    TableMigration,
};
pub use store::{DynamoHistory, DynamoStore};
