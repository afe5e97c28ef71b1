//! Process-wide registry of entity definitions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::error::DbError;

use super::entity::EntityDefinition;
use super::validation;

type SchemaMap = HashMap<String, Arc<EntityDefinition>>;

/// Registry of entity definitions, read-only after [`freeze`](Self::freeze).
///
/// Sessions read the current snapshot lock-free; registration is a
/// startup-time activity and is not expected to race with itself.
#[derive(Debug)]
pub struct SchemaRegistry {
    entities: ArcSwap<SchemaMap>,
    frozen: AtomicBool,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entities: ArcSwap::from_pointee(SchemaMap::new()),
            frozen: AtomicBool::new(false),
        }
    }

    /// Registers an entity definition.
    ///
    /// Validates the locally resolvable parts of its relationship mappings
    /// immediately; cross-entity checks run at [`freeze`](Self::freeze).
    ///
    /// # Returns
    /// `Result<(), DbError>` failing with `DuplicateEntity` on a name clash,
    /// `InvalidMapping` on a bad mapping, or `RegistryFrozen` after freeze.
    pub fn register(&self, definition: EntityDefinition) -> Result<(), DbError> {
        if self.is_frozen() {
            return Err(DbError::RegistryFrozen);
        }
        validation::validate_local_mappings(&definition)?;

        let current = self.entities.load();
        if current.contains_key(definition.name()) {
            return Err(DbError::DuplicateEntity {
                entity: definition.name().to_string(),
            });
        }

        let mut next: SchemaMap = (**current).clone();
        next.insert(definition.name().to_string(), Arc::new(definition));
        self.entities.store(Arc::new(next));
        Ok(())
    }

    /// Resolves an entity definition by name.
    pub fn resolve(&self, name: &str) -> Result<Arc<EntityDefinition>, DbError> {
        self.entities
            .load()
            .get(name)
            .cloned()
            .ok_or_else(|| DbError::UnknownEntity {
                entity: name.to_string(),
            })
    }

    /// Runs cross-entity validation and makes the registry immutable.
    ///
    /// Idempotent: freezing a frozen registry revalidates and succeeds.
    pub fn freeze(&self) -> Result<(), DbError> {
        let snapshot = self.entities.load();
        validation::validate_cross_entity(&snapshot)?;
        self.frozen.store(true, Ordering::Release);
        Ok(())
    }

    /// Returns `true` once the registry has been frozen.
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// Returns all registered definitions.
    pub fn definitions(&self) -> Vec<Arc<EntityDefinition>> {
        self.entities.load().values().cloned().collect()
    }

    /// Returns the number of registered entities.
    pub fn entity_count(&self) -> usize {
        self.entities.load().len()
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}
