use std::sync::{Arc, Mutex};

use crate::error::{MigrateError, Result};
use crate::migration::{BoxFuture, MigrationInfo, MigrationUnit, SchemaGateway, Timestamp};
use crate::schema::TableSpec;

/// Shared log of unit invocations, e.g. `apply:20160318110710`.
#[derive(Debug, Clone, Default)]
pub struct InvocationLog {
    calls: Arc<Mutex<Vec<String>>>,
}

impl InvocationLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, call: String) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }

    /// All recorded calls in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of times `op` ran for `timestamp`.
    pub fn count(&self, op: &str, timestamp: &str) -> usize {
        let needle = format!("{}:{}", op, timestamp);
        self.calls().iter().filter(|c| **c == needle).count()
    }
}

/// Configurable migration unit for tests.
///
/// Optionally creates a table on apply and drops it on rollback, records every
/// invocation, and can be told to fail either direction.
#[derive(Debug, Clone)]
pub struct RecordingMigration {
    info: MigrationInfo,
    table: Option<TableSpec>,
    log: InvocationLog,
    fail_apply: bool,
    fail_rollback: bool,
}

impl RecordingMigration {
    /// Create a unit. Panics on a malformed timestamp.
    pub fn new(timestamp: &str, namespace: &str) -> Self {
        let timestamp = Timestamp::parse(timestamp).expect("valid test timestamp");
        Self {
            info: MigrationInfo::new(timestamp.clone(), namespace, format!("test_{}", timestamp)),
            table: None,
            log: InvocationLog::new(),
            fail_apply: false,
            fail_rollback: false,
        }
    }

    /// Create `spec` on apply, drop it on rollback.
    pub fn creates_table(mut self, spec: TableSpec) -> Self {
        self.table = Some(spec);
        self
    }

    /// Share an invocation log with other units.
    pub fn with_log(mut self, log: InvocationLog) -> Self {
        self.log = log;
        self
    }

    pub fn failing_apply(mut self) -> Self {
        self.fail_apply = true;
        self
    }

    pub fn failing_rollback(mut self) -> Self {
        self.fail_rollback = true;
        self
    }

    pub fn log(&self) -> &InvocationLog {
        &self.log
    }
}

impl<G: SchemaGateway> MigrationUnit<G> for RecordingMigration {
    fn info(&self) -> &MigrationInfo {
        &self.info
    }

    fn apply<'a>(&'a self, gateway: &'a G) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.log.push(format!("apply:{}", self.info.timestamp));
            if self.fail_apply {
                return Err(MigrateError::Store("injected apply failure".into()));
            }
            if let Some(spec) = &self.table {
                gateway.create_table(spec).await?;
            }
            Ok(())
        })
    }

    fn rollback<'a>(&'a self, gateway: &'a G) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.log.push(format!("rollback:{}", self.info.timestamp));
            if self.fail_rollback {
                return Err(MigrateError::Store("injected rollback failure".into()));
            }
            if let Some(spec) = &self.table {
                gateway.drop_table(&spec.name).await?;
            }
            Ok(())
        })
    }
}
