use std::future::Future;
use std::pin::Pin;

use crate::error::Result;
use crate::schema::{AttributeType, TableSpec};

use super::record::{MigrationRecord, Timestamp};

/// Boxed future returned by object-safe migration methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Identity of a migration unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationInfo {
    /// Version; unique within the namespace.
    pub timestamp: Timestamp,
    /// Logical group the migration belongs to.
    pub namespace: String,
    /// Short description, used in logs.
    pub name: String,
}

impl MigrationInfo {
    pub fn new(timestamp: Timestamp, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            timestamp,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

/// Table create/drop/describe primitives used by migration units.
pub trait SchemaGateway: Send + Sync {
    /// Check whether a table exists.
    fn table_exists(&self, name: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Create a table. Fails with `TableExists` if it is already there.
    fn create_table(&self, spec: &TableSpec) -> impl Future<Output = Result<()>> + Send;

    /// Drop a table. Dropping an absent table is a no-op.
    fn drop_table(&self, name: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Persistence for the migration ledger.
///
/// Implementations are bound to one history table. `all` returns records in
/// ascending id order and applies no namespace filter.
pub trait HistoryStore: Send + Sync {
    /// Name of the backing table.
    fn table_name(&self) -> &str;

    /// Check whether the backing table exists.
    fn exists(&self) -> impl Future<Output = Result<bool>> + Send;

    /// Create the backing table with a single string key `id`.
    fn create(&self) -> impl Future<Output = Result<()>> + Send;

    /// Every record in the table.
    fn all(&self) -> impl Future<Output = Result<Vec<MigrationRecord>>> + Send;

    /// Insert a record. Fails with `HistoryConflict` if the id is taken.
    fn put(&self, record: &MigrationRecord) -> impl Future<Output = Result<()>> + Send;

    /// Remove the record with the given id.
    fn delete(&self, id: &str) -> impl Future<Output = Result<()>> + Send;
}

/// One versioned forward/backward change.
///
/// Units are generic over the gateway they run against so the registry can
/// hold them as trait objects.
pub trait MigrationUnit<G: SchemaGateway>: Send + Sync {
    /// Identity of this unit.
    fn info(&self) -> &MigrationInfo;

    /// Perform the forward change.
    fn apply<'a>(&'a self, gateway: &'a G) -> BoxFuture<'a, Result<()>>;

    /// Undo the forward change.
    fn rollback<'a>(&'a self, gateway: &'a G) -> BoxFuture<'a, Result<()>>;
}

/// Default name of the history table.
pub const DEFAULT_HISTORY_TABLE: &str = "dynamodb_framework_migration_history";

/// Key attribute of the history table.
pub const HISTORY_KEY: &str = "id";

/// Table spec for a history table with the given name.
pub fn history_table_spec(name: &str) -> TableSpec {
    TableSpec {
        name: name.to_string(),
        attributes: vec![crate::schema::AttributeDefinition::new(
            HISTORY_KEY,
            AttributeType::String,
        )],
        key: crate::schema::KeySchema::hash(HISTORY_KEY),
    }
}
