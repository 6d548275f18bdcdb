use std::collections::BTreeMap;
use std::sync::Arc;

use tidemark_core::error::{MigrateError, Result};
use tidemark_core::migration::{MigrationInfo, MigrationUnit, SchemaGateway, Timestamp};

/// Shared handle to a registered unit.
pub type BoxedMigration<G> = Arc<dyn MigrationUnit<G>>;

/// Catalog of all known migration units, grouped by namespace.
///
/// Registration order does not matter: listings are always sorted by
/// timestamp. A timestamp doubles as the history record id, so it may appear
/// only once across all namespaces; reuse is reported when a namespace is
/// listed.
pub struct MigrationRegistry<G: SchemaGateway + 'static> {
    units: BTreeMap<String, Vec<BoxedMigration<G>>>,
}

impl<G: SchemaGateway + 'static> Default for MigrationRegistry<G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G: SchemaGateway + 'static> Clone for MigrationRegistry<G> {
    fn clone(&self) -> Self {
        Self {
            units: self.units.clone(),
        }
    }
}

impl<G: SchemaGateway + 'static> MigrationRegistry<G> {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            units: BTreeMap::new(),
        }
    }

    /// Register a migration unit.
    pub fn register<M>(&mut self, unit: M)
    where
        M: MigrationUnit<G> + 'static,
    {
        self.register_arc(Arc::new(unit));
    }

    /// Register an already shared unit.
    pub fn register_arc(&mut self, unit: BoxedMigration<G>) {
        let namespace = unit.info().namespace.clone();
        self.units.entry(namespace).or_default().push(unit);
    }

    /// Register every unit from an iterator.
    pub fn extend<M, I>(&mut self, units: I)
    where
        M: MigrationUnit<G> + 'static,
        I: IntoIterator<Item = M>,
    {
        for unit in units {
            self.register(unit);
        }
    }

    /// Units of a namespace in ascending timestamp order.
    ///
    /// Unknown namespaces yield an empty list. A timestamp shared with another
    /// unit, in this or any other namespace, fails with `DuplicateTimestamp`.
    pub fn units_for(&self, namespace: &str) -> Result<Vec<BoxedMigration<G>>> {
        let mut units = self.units.get(namespace).cloned().unwrap_or_default();
        units.sort_by(|a, b| a.info().timestamp.cmp(&b.info().timestamp));

        for pair in units.windows(2) {
            if pair[0].info().timestamp == pair[1].info().timestamp {
                return Err(duplicate_timestamp(namespace, &pair[0].info().timestamp));
            }
        }

        for unit in &units {
            let timestamp = &unit.info().timestamp;
            if self.registered_elsewhere(namespace, timestamp) {
                return Err(duplicate_timestamp(namespace, timestamp));
            }
        }

        Ok(units)
    }

    fn registered_elsewhere(&self, namespace: &str, timestamp: &Timestamp) -> bool {
        self.units
            .iter()
            .filter(|(ns, _)| ns.as_str() != namespace)
            .any(|(_, units)| units.iter().any(|u| &u.info().timestamp == timestamp))
    }

    /// Identities of a namespace's units in ascending timestamp order.
    pub fn infos_for(&self, namespace: &str) -> Result<Vec<MigrationInfo>> {
        Ok(self
            .units_for(namespace)?
            .iter()
            .map(|u| u.info().clone())
            .collect())
    }

    /// Look up a unit by identity.
    pub fn resolve(
        &self,
        namespace: &str,
        timestamp: &Timestamp,
    ) -> Result<Option<BoxedMigration<G>>> {
        Ok(self
            .units_for(namespace)?
            .into_iter()
            .find(|u| &u.info().timestamp == timestamp))
    }

    /// Check that every timestamp is registered exactly once.
    pub fn validate(&self) -> Result<()> {
        for namespace in self.units.keys() {
            self.units_for(namespace)?;
        }
        Ok(())
    }

    /// All namespaces with at least one unit, sorted.
    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.units.keys().map(|s| s.as_str())
    }

    /// Total number of registered units.
    pub fn len(&self) -> usize {
        self.units.values().map(Vec::len).sum()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

fn duplicate_timestamp(namespace: &str, timestamp: &Timestamp) -> MigrateError {
    MigrateError::DuplicateTimestamp {
        namespace: namespace.to_string(),
        timestamp: timestamp.to_string(),
    }
}
