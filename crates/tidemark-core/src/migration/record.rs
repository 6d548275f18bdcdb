use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// A migration version in `YYYYMMDDHHMMSS` form.
///
/// Ordering is plain string comparison, which matches chronological order
/// because the format is fixed-width.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timestamp(String);

impl Timestamp {
    /// Parse and validate a timestamp.
    pub fn parse(value: &str) -> Result<Self> {
        if value.len() != 14 || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MigrateError::InvalidTimestamp(value.to_string()));
        }
        NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
            .map_err(|_| MigrateError::InvalidTimestamp(value.to_string()))?;
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Timestamp {
    type Error = MigrateError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Timestamp> for String {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

impl std::str::FromStr for Timestamp {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A persisted fact that a migration has been applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    /// Row identity; always equal to the timestamp.
    pub id: String,
    pub timestamp: Timestamp,
    pub namespace: String,
    /// Human readable migration name, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// When the record was written. Absent on rows written by older tooling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,
}

impl MigrationRecord {
    pub fn new(timestamp: Timestamp, namespace: impl Into<String>) -> Self {
        Self {
            id: timestamp.as_str().to_string(),
            timestamp,
            namespace: namespace.into(),
            name: None,
            applied_at: None,
        }
    }

    /// Record for a unit that has just been applied.
    pub fn applied(info: &super::MigrationInfo) -> Self {
        Self {
            id: info.timestamp.as_str().to_string(),
            timestamp: info.timestamp.clone(),
            namespace: info.namespace.clone(),
            name: Some(info.name.clone()),
            applied_at: Some(Utc::now()),
        }
    }
}
