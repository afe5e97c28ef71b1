//! In-memory entity instances tracked by a session.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::DbError;
use crate::reference::Reference;
use crate::schema::EntityDefinition;
use crate::value::Value;

/// Session-tracked handle to an entity instance.
///
/// Sessions are single-threaded; tracked instances are deliberately not
/// `Send`.
pub type Tracked = Rc<RefCell<EntityInstance>>;

/// Mapping from field name to value, plus relationship references.
///
/// # Invariants
///
/// - Composite key values must be fully assigned before the instance is
///   persisted; once persisted, key values are immutable.
#[derive(Debug)]
pub struct EntityInstance {
    definition: Arc<EntityDefinition>,
    values: HashMap<String, Value>,
    references: HashMap<String, Reference>,
    persisted: bool,
}

impl EntityInstance {
    /// Creates an empty instance of the defined entity.
    pub fn new(definition: Arc<EntityDefinition>) -> Self {
        Self {
            definition,
            values: HashMap::new(),
            references: HashMap::new(),
            persisted: false,
        }
    }

    /// Returns the entity name.
    pub fn entity(&self) -> &str {
        self.definition.name()
    }

    /// Returns the entity definition.
    pub fn definition(&self) -> &Arc<EntityDefinition> {
        &self.definition
    }

    /// Returns a field value, or `None` if unset.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Schema-checked field assignment.
    ///
    /// # Returns
    /// `Result<(), DbError>` failing with `FieldNotFound` for undeclared
    /// fields, `ImmutableKey` when assigning a key field after persistence,
    /// or `TypeMismatch` when the value does not fit the declared kind.
    pub fn set(&mut self, field: &str, value: Value) -> Result<(), DbError> {
        let declaration =
            self.definition
                .field(field)
                .ok_or_else(|| DbError::FieldNotFound {
                    entity: self.entity().to_string(),
                    field: field.to_string(),
                })?;

        if self.persisted && self.definition.is_key_field(field) {
            return Err(DbError::ImmutableKey {
                entity: self.entity().to_string(),
                field: field.to_string(),
            });
        }

        if value.is_null() {
            if !declaration.is_nullable() {
                return Err(DbError::TypeMismatch {
                    entity: self.entity().to_string(),
                    field: field.to_string(),
                    expected: declaration.kind().name().to_string(),
                    got: "null".to_string(),
                });
            }
        } else if !value.matches_kind(declaration.kind()) {
            return Err(DbError::TypeMismatch {
                entity: self.entity().to_string(),
                field: field.to_string(),
                expected: declaration.kind().name().to_string(),
                got: value.kind_name().to_string(),
            });
        }

        self.values.insert(field.to_string(), value);
        Ok(())
    }

    /// Unchecked assignment used by row materialization and foreign-key
    /// derivation. Callers guarantee schema consistency.
    pub(crate) fn set_raw(&mut self, field: impl Into<String>, value: Value) {
        self.values.insert(field.into(), value);
    }

    /// Assigns a relationship reference.
    pub fn set_reference(&mut self, name: &str, reference: Reference) -> Result<(), DbError> {
        if self.definition.relationship(name).is_none() {
            return Err(DbError::RelationshipNotFound {
                entity: self.entity().to_string(),
                relationship: name.to_string(),
            });
        }
        self.references.insert(name.to_string(), reference);
        Ok(())
    }

    /// Returns the reference held for a relationship, if any.
    pub fn reference(&self, name: &str) -> Option<&Reference> {
        self.references.get(name)
    }

    /// Returns `true` once the instance has been written to storage.
    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    pub(crate) fn mark_persisted(&mut self) {
        self.persisted = true;
    }

    /// Reverts to unpersisted state after the insert was rolled back.
    pub(crate) fn unmark_persisted(&mut self) {
        self.persisted = false;
    }

    /// Folds another instance's state into this one.
    ///
    /// Used by the identity map when a second persist or load of the same
    /// identity must update the already-tracked instance instead of
    /// duplicating it.
    pub(crate) fn merge_from(&mut self, other: &EntityInstance) {
        for (field, value) in &other.values {
            self.values.insert(field.clone(), value.clone());
        }
        for (name, reference) in &other.references {
            self.references.insert(name.clone(), reference.clone());
        }
    }
}
