use thiserror::Error;

/// Core error type for Tidemark operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection failure: {0}")]
    Connection(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Table '{0}' already exists")]
    TableExists(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid timestamp '{0}': expected YYYYMMDDHHMMSS")]
    InvalidTimestamp(String),

    #[error("Migration {namespace}/{timestamp} failed to apply: {source}")]
    Apply {
        namespace: String,
        timestamp: String,
        #[source]
        source: Box<MigrateError>,
    },

    #[error("Migration {namespace}/{timestamp} failed to roll back: {source}")]
    Rollback {
        namespace: String,
        timestamp: String,
        #[source]
        source: Box<MigrateError>,
    },

    #[error("History references {namespace}/{timestamp} but no such migration is registered")]
    UnresolvedMigration { namespace: String, timestamp: String },

    #[error("Migration timestamp {timestamp} of namespace {namespace} is registered more than once")]
    DuplicateTimestamp { namespace: String, timestamp: String },

    #[error("History record '{id}' already exists")]
    HistoryConflict { id: String },
}

impl MigrateError {
    /// Wrap a unit failure raised while applying.
    pub fn apply(namespace: &str, timestamp: &str, source: MigrateError) -> Self {
        MigrateError::Apply {
            namespace: namespace.to_string(),
            timestamp: timestamp.to_string(),
            source: Box::new(source),
        }
    }

    /// Wrap a unit failure raised while rolling back.
    pub fn rollback(namespace: &str, timestamp: &str, source: MigrateError) -> Self {
        MigrateError::Rollback {
            namespace: namespace.to_string(),
            timestamp: timestamp.to_string(),
            source: Box::new(source),
        }
    }
}

impl From<serde_json::Error> for MigrateError {
    fn from(e: serde_json::Error) -> Self {
        MigrateError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for MigrateError {
    fn from(e: toml::de::Error) -> Self {
        MigrateError::Config(e.to_string())
    }
}

/// Result type alias using MigrateError.
pub type Result<T> = std::result::Result<T, MigrateError>;
