//! In-memory data store.
//!
//! Holds tables and JSON items behind a shared lock so that a gateway handle,
//! a history store and a test can all observe the same state.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;

use crate::error::{MigrateError, Result};
use crate::migration::{history_table_spec, HistoryStore, MigrationRecord, SchemaGateway};
use crate::schema::TableSpec;

#[derive(Debug, Clone)]
struct MemoryTable {
    spec: TableSpec,
    items: BTreeMap<String, Value>,
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, MemoryTable>,
    unreachable: bool,
}

/// In-memory implementation of the store primitives.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an unreachable store: every operation fails with `Connection`.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.write().unreachable = unreachable;
    }

    /// History store bound to a table in this store.
    pub fn history(&self, table: impl Into<String>) -> MemoryHistory {
        MemoryHistory {
            store: self.clone(),
            table: table.into(),
        }
    }

    /// Names of all tables, sorted.
    pub fn table_names(&self) -> Vec<String> {
        self.read().tables.keys().cloned().collect()
    }

    /// Spec a table was created with.
    pub fn describe(&self, table: &str) -> Result<TableSpec> {
        let state = self.checked_read()?;
        state
            .tables
            .get(table)
            .map(|t| t.spec.clone())
            .ok_or_else(|| MigrateError::TableNotFound(table.to_string()))
    }

    /// Insert or replace an item.
    pub fn put_item(&self, table: &str, item: Value) -> Result<()> {
        let mut state = self.checked_write()?;
        let table = table_mut(&mut state, table)?;
        let key = item_key(&table.spec, &item)?;
        table.items.insert(key, item);
        Ok(())
    }

    /// Insert an item only if no item with the same key exists.
    /// Returns `false` when the key was already taken.
    pub fn put_item_if_absent(&self, table: &str, item: Value) -> Result<bool> {
        let mut state = self.checked_write()?;
        let table = table_mut(&mut state, table)?;
        let key = item_key(&table.spec, &item)?;
        if table.items.contains_key(&key) {
            return Ok(false);
        }
        table.items.insert(key, item);
        Ok(true)
    }

    /// Remove an item by key. Removing a missing item is a no-op.
    pub fn delete_item(&self, table: &str, key: &str) -> Result<()> {
        let mut state = self.checked_write()?;
        table_mut(&mut state, table)?.items.remove(key);
        Ok(())
    }

    /// All items of a table in key order.
    pub fn scan(&self, table: &str) -> Result<Vec<Value>> {
        let state = self.checked_read()?;
        let table = state
            .tables
            .get(table)
            .ok_or_else(|| MigrateError::TableNotFound(table.to_string()))?;
        Ok(table.items.values().cloned().collect())
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn checked_read(&self) -> Result<RwLockReadGuard<'_, State>> {
        let state = self.read();
        if state.unreachable {
            return Err(unreachable_error());
        }
        Ok(state)
    }

    fn checked_write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        let state = self.write();
        if state.unreachable {
            return Err(unreachable_error());
        }
        Ok(state)
    }
}

fn unreachable_error() -> MigrateError {
    MigrateError::Connection("memory store is unreachable".into())
}

fn table_mut<'a>(state: &'a mut State, table: &str) -> Result<&'a mut MemoryTable> {
    state
        .tables
        .get_mut(table)
        .ok_or_else(|| MigrateError::TableNotFound(table.to_string()))
}

fn item_key(spec: &TableSpec, item: &Value) -> Result<String> {
    let part = |attr: &str| -> Result<String> {
        match item.get(attr) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            _ => Err(MigrateError::InvalidArgument(format!(
                "item for table '{}' is missing key attribute '{}'",
                spec.name, attr
            ))),
        }
    };

    let hash = part(&spec.key.hash_key)?;
    match &spec.key.range_key {
        Some(range) => Ok(format!("{}#{}", hash, part(range)?)),
        None => Ok(hash),
    }
}

impl SchemaGateway for MemoryStore {
    async fn table_exists(&self, name: &str) -> Result<bool> {
        Ok(self.checked_read()?.tables.contains_key(name))
    }

    async fn create_table(&self, spec: &TableSpec) -> Result<()> {
        spec.validate()?;
        let mut state = self.checked_write()?;
        if state.tables.contains_key(&spec.name) {
            return Err(MigrateError::TableExists(spec.name.clone()));
        }
        state.tables.insert(
            spec.name.clone(),
            MemoryTable {
                spec: spec.clone(),
                items: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn drop_table(&self, name: &str) -> Result<()> {
        self.checked_write()?.tables.remove(name);
        Ok(())
    }
}

/// History store backed by a [`MemoryStore`] table.
#[derive(Debug, Clone)]
pub struct MemoryHistory {
    store: MemoryStore,
    table: String,
}

impl HistoryStore for MemoryHistory {
    fn table_name(&self) -> &str {
        &self.table
    }

    async fn exists(&self) -> Result<bool> {
        self.store.table_exists(&self.table).await
    }

    async fn create(&self) -> Result<()> {
        self.store.create_table(&history_table_spec(&self.table)).await
    }

    async fn all(&self) -> Result<Vec<MigrationRecord>> {
        let mut records = self
            .store
            .scan(&self.table)?
            .into_iter()
            .map(serde_json::from_value::<MigrationRecord>)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    async fn put(&self, record: &MigrationRecord) -> Result<()> {
        let item = serde_json::to_value(record)?;
        if !self.store.put_item_if_absent(&self.table, item)? {
            return Err(MigrateError::HistoryConflict {
                id: record.id.clone(),
            });
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.store.delete_item(&self.table, id)
    }
}
