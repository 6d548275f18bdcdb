mod manager;
mod registry;
mod table;

pub use manager::{MigrationManager, MigrationStatus};
pub use registry::{BoxedMigration, MigrationRegistry};
pub use table::{load_migrations_from_dir, TableChange, TableMigration};
