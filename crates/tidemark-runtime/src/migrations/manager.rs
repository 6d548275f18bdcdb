//! Namespaced migration manager.
//!
//! Applies pending migrations of a namespace in timestamp order, records each
//! one in the history table once it succeeds, and rolls back the most recent
//! one on request.
//!
//! A record's id is its timestamp, shared by every namespace writing to the
//! history table. Before a unit runs, `apply` checks that no other namespace
//! already holds its id, so a unit never runs without being recordable.
//!
//! The manager assumes a single writer per namespace. History is read once per
//! call and written per unit without a lock, so two concurrent `apply` calls can
//! both run the same unit. Record inserts are conditional, so the loser gets
//! `HistoryConflict` instead of a duplicate row.

use std::collections::HashSet;
use std::time::Instant;

use tracing::{debug, info, warn};

use tidemark_core::error::{MigrateError, Result};
use tidemark_core::migration::{HistoryStore, MigrationInfo, MigrationRecord, SchemaGateway, Timestamp};

use super::registry::MigrationRegistry;

/// Applied, pending and orphaned migrations of one namespace.
#[derive(Debug, Clone, Default)]
pub struct MigrationStatus {
    /// Recorded migrations that are still registered, oldest first.
    pub applied: Vec<MigrationRecord>,
    /// Registered migrations with no record, oldest first.
    pub pending: Vec<MigrationInfo>,
    /// Recorded migrations the registry no longer defines.
    pub orphaned: Vec<MigrationRecord>,
}

/// Orchestrates connect, apply and rollback for registered migrations.
pub struct MigrationManager<H, G>
where
    H: HistoryStore,
    G: SchemaGateway + 'static,
{
    history: H,
    gateway: G,
    registry: MigrationRegistry<G>,
}

impl<H, G> MigrationManager<H, G>
where
    H: HistoryStore,
    G: SchemaGateway + 'static,
{
    /// Create a manager. `history` is bound to the history table to use.
    pub fn new(history: H, gateway: G, registry: MigrationRegistry<G>) -> Self {
        Self {
            history,
            gateway,
            registry,
        }
    }

    /// Name of the history table.
    pub fn history_table(&self) -> &str {
        self.history.table_name()
    }

    pub fn registry(&self) -> &MigrationRegistry<G> {
        &self.registry
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Ensure the history table exists, creating it if needed.
    pub async fn connect(&self) -> Result<()> {
        let table = self.history.table_name();

        let exists = self
            .history
            .exists()
            .await
            .map_err(|e| connection_failure(table, e))?;
        if exists {
            debug!("Migration history table {} already exists", table);
            return Ok(());
        }

        info!("Creating migration history table {}", table);
        match self.history.create().await {
            Ok(()) => Ok(()),
            Err(MigrateError::TableExists(_)) => {
                debug!("Migration history table {} was created concurrently", table);
                Ok(())
            }
            Err(e) => Err(connection_failure(table, e)),
        }
    }

    /// Run every pending migration of `namespace` in timestamp order.
    ///
    /// Stops at the first failure; the failing unit gets no history record and
    /// later units do not run. A unit whose record id is held by another
    /// namespace fails with `HistoryConflict` before it runs. Returns the
    /// timestamps applied by this call.
    pub async fn apply(&self, namespace: &str) -> Result<Vec<Timestamp>> {
        ensure_namespace(namespace)?;

        let units = self.registry.units_for(namespace)?;
        let (own, foreign): (Vec<_>, Vec<_>) = self
            .history
            .all()
            .await?
            .into_iter()
            .partition(|r| r.namespace == namespace);
        let applied: HashSet<Timestamp> = own.into_iter().map(|r| r.timestamp).collect();
        let taken: HashSet<String> = foreign.into_iter().map(|r| r.id).collect();
        let latest = applied.iter().max().cloned();
        debug!(
            "Namespace {}: {} registered, {} applied",
            namespace,
            units.len(),
            applied.len()
        );

        let mut newly_applied = Vec::new();

        for unit in units {
            let info = unit.info();
            if applied.contains(&info.timestamp) {
                debug!("Skipping applied migration {}/{}", namespace, info.timestamp);
                continue;
            }

            if latest.as_ref().is_some_and(|l| &info.timestamp < l) {
                warn!(
                    "Migration {}/{} is older than the latest applied migration {}",
                    namespace,
                    info.timestamp,
                    latest.as_ref().map(|l| l.as_str()).unwrap_or_default()
                );
            }

            if taken.contains(info.timestamp.as_str()) {
                warn!(
                    "Migration {}/{} not run: its history id is held by another namespace",
                    namespace, info.timestamp
                );
                return Err(MigrateError::HistoryConflict {
                    id: info.timestamp.to_string(),
                });
            }

            info!("Applying migration {}/{} ({})", namespace, info.timestamp, info.name);
            let start = Instant::now();

            unit.apply(&self.gateway)
                .await
                .map_err(|e| MigrateError::apply(namespace, info.timestamp.as_str(), e))?;

            if let Err(e) = self.history.put(&MigrationRecord::applied(info)).await {
                warn!(
                    "Migration {}/{} ran but could not be recorded: {}",
                    namespace, info.timestamp, e
                );
                return Err(e);
            }

            info!(
                "Migration applied: {}/{} in {}ms",
                namespace,
                info.timestamp,
                start.elapsed().as_millis()
            );
            newly_applied.push(info.timestamp.clone());
        }

        if newly_applied.is_empty() {
            debug!("Namespace {} is up to date", namespace);
        }

        Ok(newly_applied)
    }

    /// Roll back the most recently applied migration of `namespace`.
    ///
    /// Returns `None` when nothing has been applied. On failure the history
    /// record is kept.
    pub async fn rollback(&self, namespace: &str) -> Result<Option<Timestamp>> {
        ensure_namespace(namespace)?;

        let records = self.namespace_history(namespace).await?;
        let Some(last) = records.into_iter().last() else {
            debug!("Nothing to roll back in namespace {}", namespace);
            return Ok(None);
        };

        let unit = self
            .registry
            .resolve(namespace, &last.timestamp)?
            .ok_or_else(|| {
                warn!(
                    "History references {}/{} but no such migration is registered",
                    namespace, last.timestamp
                );
                MigrateError::UnresolvedMigration {
                    namespace: namespace.to_string(),
                    timestamp: last.timestamp.to_string(),
                }
            })?;

        info!(
            "Rolling back migration {}/{} ({})",
            namespace,
            last.timestamp,
            unit.info().name
        );

        unit.rollback(&self.gateway)
            .await
            .map_err(|e| MigrateError::rollback(namespace, last.timestamp.as_str(), e))?;

        self.history.delete(&last.id).await?;

        info!("Migration rolled back: {}/{}", namespace, last.timestamp);
        Ok(Some(last.timestamp))
    }

    /// Applied, pending and orphaned migrations of `namespace`.
    pub async fn status(&self, namespace: &str) -> Result<MigrationStatus> {
        ensure_namespace(namespace)?;

        let registered = self.registry.infos_for(namespace)?;
        let records = self.namespace_history(namespace).await?;

        let known: HashSet<&Timestamp> = registered.iter().map(|i| &i.timestamp).collect();
        let recorded: HashSet<&Timestamp> = records.iter().map(|r| &r.timestamp).collect();

        let pending = registered
            .iter()
            .filter(|i| !recorded.contains(&i.timestamp))
            .cloned()
            .collect();
        let (applied, orphaned): (Vec<_>, Vec<_>) = records
            .iter()
            .cloned()
            .partition(|r| known.contains(&r.timestamp));

        Ok(MigrationStatus {
            applied,
            pending,
            orphaned,
        })
    }

    /// History records of a namespace, oldest first.
    async fn namespace_history(&self, namespace: &str) -> Result<Vec<MigrationRecord>> {
        let mut records: Vec<MigrationRecord> = self
            .history
            .all()
            .await?
            .into_iter()
            .filter(|r| r.namespace == namespace)
            .collect();
        records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        debug!(
            "Namespace {} has {} history records in {}",
            namespace,
            records.len(),
            self.history.table_name()
        );
        Ok(records)
    }
}

fn ensure_namespace(namespace: &str) -> Result<()> {
    if namespace.trim().is_empty() {
        return Err(MigrateError::InvalidArgument("namespace must not be empty".into()));
    }
    Ok(())
}

fn connection_failure(table: &str, e: MigrateError) -> MigrateError {
    match e {
        MigrateError::Connection(_) => e,
        other => MigrateError::Connection(format!("history table '{}': {}", table, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidemark_core::migration::DEFAULT_HISTORY_TABLE;
    use tidemark_core::schema::{AttributeType, TableSpec};
    use tidemark_core::testing::{InvocationLog, MemoryHistory, MemoryStore, RecordingMigration};

    const NS: &str = "test_namespace";
    const U1: &str = "20160318110710";
    const U2: &str = "20160318110730";
    const U3: &str = "20160318110750";

    fn table(name: &str) -> TableSpec {
        TableSpec::builder(name)
            .attribute("id", AttributeType::String)
            .hash_key("id")
            .build()
            .unwrap()
    }

    fn script(ts: &str, table_name: &str, log: &InvocationLog) -> RecordingMigration {
        RecordingMigration::new(ts, NS)
            .creates_table(table(table_name))
            .with_log(log.clone())
    }

    struct Fixture {
        store: MemoryStore,
        history: MemoryHistory,
        log: InvocationLog,
        manager: MigrationManager<MemoryHistory, MemoryStore>,
    }

    fn fixture_with(units: Vec<RecordingMigration>, log: InvocationLog) -> Fixture {
        let store = MemoryStore::new();
        let history = store.history(DEFAULT_HISTORY_TABLE);
        let mut registry = MigrationRegistry::new();
        registry.extend(units);
        let manager = MigrationManager::new(history.clone(), store.clone(), registry);
        Fixture {
            store,
            history,
            log,
            manager,
        }
    }

    /// Two scripts: U1 creates `test1`, U2 creates `test2`.
    fn fixture() -> Fixture {
        let log = InvocationLog::new();
        let units = vec![script(U1, "test1", &log), script(U2, "test2", &log)];
        fixture_with(units, log)
    }

    async fn recorded(history: &MemoryHistory) -> Vec<String> {
        history
            .all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.timestamp.to_string())
            .collect()
    }

    /// Apply U1 by hand and record it, as if an earlier run had done so.
    async fn seed_u1(f: &Fixture) {
        f.store.create_table(&table("test1")).await.unwrap();
        f.history
            .put(&MigrationRecord::new(Timestamp::parse(U1).unwrap(), NS))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_connect_creates_history_table() {
        let f = fixture();
        assert!(!f.store.table_exists(DEFAULT_HISTORY_TABLE).await.unwrap());

        f.manager.connect().await.unwrap();
        assert!(f.store.table_exists(DEFAULT_HISTORY_TABLE).await.unwrap());

        let spec = f.store.describe(DEFAULT_HISTORY_TABLE).unwrap();
        assert_eq!(spec.key.hash_key, "id");
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let f = fixture();
        f.manager.connect().await.unwrap();
        f.history
            .put(&MigrationRecord::new(Timestamp::parse(U1).unwrap(), NS))
            .await
            .unwrap();

        f.manager.connect().await.unwrap();
        assert!(f.store.table_exists(DEFAULT_HISTORY_TABLE).await.unwrap());
        assert_eq!(recorded(&f.history).await, vec![U1]);
    }

    #[tokio::test]
    async fn test_connect_unreachable_store() {
        let f = fixture();
        f.store.set_unreachable(true);
        let err = f.manager.connect().await.unwrap_err();
        assert!(matches!(err, MigrateError::Connection(_)));
    }

    /// History whose table never exists and whose creation always fails.
    struct FailingCreate(fn() -> MigrateError);

    impl HistoryStore for FailingCreate {
        fn table_name(&self) -> &str {
            "history"
        }

        async fn exists(&self) -> Result<bool> {
            Ok(false)
        }

        async fn create(&self) -> Result<()> {
            Err((self.0)())
        }

        async fn all(&self) -> Result<Vec<MigrationRecord>> {
            Ok(Vec::new())
        }

        async fn put(&self, _record: &MigrationRecord) -> Result<()> {
            Ok(())
        }

        async fn delete(&self, _id: &str) -> Result<()> {
            Ok(())
        }
    }

    fn failing_create(error: fn() -> MigrateError) -> MigrationManager<FailingCreate, MemoryStore> {
        MigrationManager::new(
            FailingCreate(error),
            MemoryStore::new(),
            MigrationRegistry::new(),
        )
    }

    #[tokio::test]
    async fn test_connect_tolerates_concurrent_create() {
        let manager = failing_create(|| MigrateError::TableExists("history".into()));
        manager.connect().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_wraps_create_failure() {
        let manager = failing_create(|| MigrateError::Store("throttled".into()));

        match manager.connect().await.unwrap_err() {
            MigrateError::Connection(message) => {
                assert!(message.contains("history"));
                assert!(message.contains("throttled"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_history_table_name_is_configurable() {
        let store = MemoryStore::new();
        let a = MigrationManager::new(
            store.history("history_a"),
            store.clone(),
            MigrationRegistry::new(),
        );
        let b = MigrationManager::new(
            store.history("history_b"),
            store.clone(),
            MigrationRegistry::new(),
        );

        a.connect().await.unwrap();
        b.connect().await.unwrap();
        assert_eq!(a.history_table(), "history_a");
        assert_eq!(store.table_names(), vec!["history_a", "history_b"]);
    }

    #[tokio::test]
    async fn test_apply_all_when_none_applied() {
        let f = fixture();
        f.manager.connect().await.unwrap();

        let applied = f.manager.apply(NS).await.unwrap();

        assert_eq!(applied.len(), 2);
        assert!(f.store.table_exists("test1").await.unwrap());
        assert!(f.store.table_exists("test2").await.unwrap());
        assert_eq!(recorded(&f.history).await, vec![U1, U2]);

        let records = f.history.all().await.unwrap();
        assert!(records.iter().all(|r| r.namespace == NS));
        assert!(records.iter().all(|r| r.applied_at.is_some()));
    }

    #[tokio::test]
    async fn test_apply_only_pending() {
        let f = fixture();
        f.manager.connect().await.unwrap();
        seed_u1(&f).await;
        assert_eq!(recorded(&f.history).await, vec![U1]);

        let applied = f.manager.apply(NS).await.unwrap();

        assert_eq!(applied, vec![Timestamp::parse(U2).unwrap()]);
        assert_eq!(recorded(&f.history).await, vec![U1, U2]);
        assert_eq!(f.log.count("apply", U1), 0);
        assert_eq!(f.log.count("apply", U2), 1);
    }

    #[tokio::test]
    async fn test_apply_twice_is_idempotent() {
        let f = fixture();
        f.manager.connect().await.unwrap();

        f.manager.apply(NS).await.unwrap();
        let first = f.history.all().await.unwrap();

        let second_run = f.manager.apply(NS).await.unwrap();
        assert!(second_run.is_empty());
        assert_eq!(f.history.all().await.unwrap(), first);
        assert_eq!(f.log.count("apply", U1), 1);
        assert_eq!(f.log.count("apply", U2), 1);
    }

    #[tokio::test]
    async fn test_apply_runs_in_timestamp_order() {
        let log = InvocationLog::new();
        let units = vec![
            script(U3, "test3", &log),
            script(U1, "test1", &log),
            script(U2, "test2", &log),
        ];
        let f = fixture_with(units, log);
        f.manager.connect().await.unwrap();

        f.manager.apply(NS).await.unwrap();

        assert_eq!(
            f.log.calls(),
            vec![
                format!("apply:{}", U1),
                format!("apply:{}", U2),
                format!("apply:{}", U3)
            ]
        );
        assert_eq!(recorded(&f.history).await, vec![U1, U2, U3]);
    }

    #[tokio::test]
    async fn test_apply_stops_at_first_failure() {
        let log = InvocationLog::new();
        let units = vec![
            script(U1, "test1", &log),
            script(U2, "test2", &log).failing_apply(),
            script(U3, "test3", &log),
        ];
        let f = fixture_with(units, log);
        f.manager.connect().await.unwrap();

        let err = f.manager.apply(NS).await.unwrap_err();

        match err {
            MigrateError::Apply {
                namespace,
                timestamp,
                ..
            } => {
                assert_eq!(namespace, NS);
                assert_eq!(timestamp, U2);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(recorded(&f.history).await, vec![U1]);
        assert_eq!(f.log.count("apply", U3), 0);
        assert!(!f.store.table_exists("test3").await.unwrap());
    }

    #[tokio::test]
    async fn test_apply_after_failure_resumes() {
        let log = InvocationLog::new();
        let units = vec![
            script(U1, "test1", &log),
            // Table already exists, so creation fails
            script(U2, "test1", &log),
        ];
        let f = fixture_with(units, log);
        f.manager.connect().await.unwrap();

        assert!(f.manager.apply(NS).await.is_err());
        assert_eq!(recorded(&f.history).await, vec![U1]);

        f.store.drop_table("test1").await.unwrap();
        let applied = f.manager.apply(NS).await.unwrap();
        assert_eq!(applied, vec![Timestamp::parse(U2).unwrap()]);
        assert_eq!(f.log.count("apply", U1), 1);
    }

    #[tokio::test]
    async fn test_apply_ignores_other_namespaces() {
        let log = InvocationLog::new();
        let units = vec![
            script(U1, "test1", &log),
            RecordingMigration::new(U2, "other")
                .creates_table(table("other1"))
                .with_log(log.clone()),
        ];
        let f = fixture_with(units, log);
        f.manager.connect().await.unwrap();

        f.manager.apply(NS).await.unwrap();

        assert_eq!(recorded(&f.history).await, vec![U1]);
        assert!(!f.store.table_exists("other1").await.unwrap());
    }

    #[tokio::test]
    async fn test_apply_rejects_duplicate_timestamps() {
        let log = InvocationLog::new();
        let units = vec![script(U1, "test1", &log), script(U1, "test2", &log)];
        let f = fixture_with(units, log);
        f.manager.connect().await.unwrap();

        let err = f.manager.apply(NS).await.unwrap_err();
        assert!(matches!(err, MigrateError::DuplicateTimestamp { .. }));
        assert!(f.log.calls().is_empty());
    }

    #[tokio::test]
    async fn test_apply_rejects_empty_namespace() {
        let f = fixture();
        let err = f.manager.apply("").await.unwrap_err();
        assert!(matches!(err, MigrateError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_apply_without_connect_fails() {
        let f = fixture();
        let err = f.manager.apply(NS).await.unwrap_err();
        assert!(matches!(err, MigrateError::TableNotFound(_)));
        assert!(f.log.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rollback_last_applied() {
        let f = fixture();
        f.manager.connect().await.unwrap();
        seed_u1(&f).await;

        let rolled_back = f.manager.rollback(NS).await.unwrap();

        assert_eq!(rolled_back, Some(Timestamp::parse(U1).unwrap()));
        assert!(!f.store.table_exists("test1").await.unwrap());
        assert!(recorded(&f.history).await.is_empty());
    }

    #[tokio::test]
    async fn test_rollback_one_step_at_a_time() {
        let f = fixture();
        f.manager.connect().await.unwrap();
        f.manager.apply(NS).await.unwrap();

        assert_eq!(
            f.manager.rollback(NS).await.unwrap(),
            Some(Timestamp::parse(U2).unwrap())
        );
        assert!(f.store.table_exists("test1").await.unwrap());
        assert!(!f.store.table_exists("test2").await.unwrap());
        assert_eq!(recorded(&f.history).await, vec![U1]);

        assert_eq!(
            f.manager.rollback(NS).await.unwrap(),
            Some(Timestamp::parse(U1).unwrap())
        );
        assert!(!f.store.table_exists("test1").await.unwrap());
        assert_eq!(f.manager.rollback(NS).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rollback_empty_history_is_noop() {
        let f = fixture();
        f.manager.connect().await.unwrap();

        assert_eq!(f.manager.rollback(NS).await.unwrap(), None);
        assert!(f.log.calls().is_empty());
        assert!(recorded(&f.history).await.is_empty());
    }

    #[tokio::test]
    async fn test_rollback_unresolved_migration() {
        let f = fixture();
        f.manager.connect().await.unwrap();
        f.history
            .put(&MigrationRecord::new(Timestamp::parse(U3).unwrap(), NS))
            .await
            .unwrap();

        let err = f.manager.rollback(NS).await.unwrap_err();

        assert!(matches!(err, MigrateError::UnresolvedMigration { .. }));
        assert_eq!(recorded(&f.history).await, vec![U3]);
    }

    #[tokio::test]
    async fn test_rollback_failure_keeps_record() {
        let log = InvocationLog::new();
        let units = vec![script(U1, "test1", &log).failing_rollback()];
        let f = fixture_with(units, log);
        f.manager.connect().await.unwrap();
        f.manager.apply(NS).await.unwrap();

        let err = f.manager.rollback(NS).await.unwrap_err();

        assert!(matches!(err, MigrateError::Rollback { .. }));
        assert_eq!(recorded(&f.history).await, vec![U1]);
        assert!(f.store.table_exists("test1").await.unwrap());
    }

    #[tokio::test]
    async fn test_rollback_scoped_to_namespace() {
        let log = InvocationLog::new();
        let units = vec![
            script(U1, "test1", &log),
            RecordingMigration::new(U3, "other").with_log(log.clone()),
        ];
        let f = fixture_with(units, log);
        f.manager.connect().await.unwrap();
        f.manager.apply(NS).await.unwrap();
        f.manager.apply("other").await.unwrap();

        assert_eq!(
            f.manager.rollback(NS).await.unwrap(),
            Some(Timestamp::parse(U1).unwrap())
        );
        assert_eq!(recorded(&f.history).await, vec![U3]);
    }

    #[tokio::test]
    async fn test_id_held_by_other_namespace_blocks_unit() {
        let f = fixture();
        f.manager.connect().await.unwrap();
        // Another namespace already owns U1's id
        f.history
            .put(&MigrationRecord::new(Timestamp::parse(U1).unwrap(), "other"))
            .await
            .unwrap();

        let err = f.manager.apply(NS).await.unwrap_err();

        assert!(matches!(err, MigrateError::HistoryConflict { ref id } if id == U1));
        assert!(f.log.calls().is_empty());
        assert!(!f.store.table_exists("test1").await.unwrap());

        // Nothing ran, so a retry fails the same way instead of drifting
        let err = f.manager.apply(NS).await.unwrap_err();
        assert!(matches!(err, MigrateError::HistoryConflict { .. }));
        assert!(f.log.calls().is_empty());
    }

    #[tokio::test]
    async fn test_timestamp_shared_across_namespaces_never_runs() {
        let log = InvocationLog::new();
        let units = vec![
            RecordingMigration::new(U1, "a")
                .creates_table(table("a1"))
                .with_log(log.clone()),
            RecordingMigration::new(U1, "b")
                .creates_table(table("b1"))
                .with_log(log.clone()),
        ];
        let f = fixture_with(units, log);
        f.manager.connect().await.unwrap();

        for namespace in ["a", "b"] {
            let err = f.manager.apply(namespace).await.unwrap_err();
            assert!(matches!(err, MigrateError::DuplicateTimestamp { .. }));
        }
        assert!(f.log.calls().is_empty());
        assert!(f.store.table_names().iter().all(|t| t == DEFAULT_HISTORY_TABLE));
    }

    #[tokio::test]
    async fn test_status() {
        let f = fixture();
        f.manager.connect().await.unwrap();
        seed_u1(&f).await;
        f.history
            .put(&MigrationRecord::new(Timestamp::parse(U3).unwrap(), NS))
            .await
            .unwrap();

        let status = f.manager.status(NS).await.unwrap();

        assert_eq!(status.applied.len(), 1);
        assert_eq!(status.applied[0].timestamp.as_str(), U1);
        assert_eq!(status.pending.len(), 1);
        assert_eq!(status.pending[0].timestamp.as_str(), U2);
        assert_eq!(status.orphaned.len(), 1);
        assert_eq!(status.orphaned[0].timestamp.as_str(), U3);
    }
}
