mod record;
mod traits;

pub use record::{MigrationRecord, Timestamp};
pub use traits::{
    history_table_spec, BoxFuture, HistoryStore, MigrationInfo, MigrationUnit, SchemaGateway,
    DEFAULT_HISTORY_TABLE, HISTORY_KEY,
};
