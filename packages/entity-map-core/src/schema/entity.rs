//! Entity and field definitions.

use serde::{Deserialize, Serialize};

use crate::error::DbError;
use crate::value::ValueKind;

use super::relationship::RelationshipDefinition;

/// Field declaration on an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    name: String,
    kind: ValueKind,
    nullable: bool,
    /// Storage assigns the current instant when the column is omitted on insert
    default_now: bool,
    /// Storage reassigns the current instant on every update
    touch_on_update: bool,
}

impl FieldDef {
    /// Creates a non-nullable field with no storage-assigned defaults.
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: false,
            default_now: false,
            touch_on_update: false,
        }
    }

    /// Marks the field as nullable.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Storage assigns the current instant when the column is omitted on insert.
    #[must_use]
    pub fn default_now(mut self) -> Self {
        self.default_now = true;
        self
    }

    /// Storage reassigns the current instant on every update.
    #[must_use]
    pub fn touch_on_update(mut self) -> Self {
        self.touch_on_update = true;
        self
    }

    /// Returns the field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared value kind.
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Returns `true` if the field accepts `Null`.
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Returns `true` if storage assigns a default instant on insert.
    pub fn has_default_now(&self) -> bool {
        self.default_now
    }

    /// Returns `true` if storage reassigns the instant on update.
    pub fn touches_on_update(&self) -> bool {
        self.touch_on_update
    }
}

/// Entity definition: name, key composition, non-key fields, relationships.
///
/// # Invariants
///
/// - Key fields are non-empty and form a unique composite identity.
/// - Field names are unique across key and non-key fields.
/// - Definitions are immutable configuration built once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDefinition {
    name: String,
    key_fields: Vec<FieldDef>,
    fields: Vec<FieldDef>,
    relationships: Vec<RelationshipDefinition>,
}

impl EntityDefinition {
    /// Creates an entity definition, validating key composition and
    /// field-name uniqueness.
    ///
    /// # Arguments
    /// * `name` - Entity name, also the storage table name
    /// * `key_fields` - Ordered key fields forming the composite identity
    /// * `fields` - Non-key fields
    /// * `relationships` - Relationship declarations
    ///
    /// # Returns
    /// `Result<EntityDefinition, DbError>` failing with `IncompleteKey` on an
    /// empty key or `DuplicateField` on a name clash.
    pub fn new(
        name: impl Into<String>,
        key_fields: Vec<FieldDef>,
        fields: Vec<FieldDef>,
        relationships: Vec<RelationshipDefinition>,
    ) -> Result<Self, DbError> {
        let name = name.into();
        if key_fields.is_empty() {
            return Err(DbError::IncompleteKey {
                entity: name,
                field: "<none declared>".to_string(),
            });
        }

        let mut seen = std::collections::HashSet::new();
        for field in key_fields.iter().chain(fields.iter()) {
            if !seen.insert(field.name()) {
                return Err(DbError::DuplicateField {
                    entity: name.clone(),
                    field: field.name().to_string(),
                });
            }
        }

        Ok(Self {
            name,
            key_fields,
            fields,
            relationships,
        })
    }

    /// Returns the entity name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the storage table name (same as the entity name).
    pub fn table(&self) -> &str {
        &self.name
    }

    /// Returns the ordered key fields.
    pub fn key_fields(&self) -> &[FieldDef] {
        &self.key_fields
    }

    /// Returns the non-key fields.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Returns the relationship declarations.
    pub fn relationships(&self) -> &[RelationshipDefinition] {
        &self.relationships
    }

    /// Iterates over key fields followed by non-key fields.
    pub fn all_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.key_fields.iter().chain(self.fields.iter())
    }

    /// Returns the declaration of a field by name, key or non-key.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.all_fields().find(|f| f.name() == name)
    }

    /// Returns `true` if `name` is one of the key fields.
    pub fn is_key_field(&self, name: &str) -> bool {
        self.key_fields.iter().any(|f| f.name() == name)
    }

    /// Returns the declaration of a relationship by name.
    pub fn relationship(&self, name: &str) -> Option<&RelationshipDefinition> {
        self.relationships.iter().find(|r| r.name() == name)
    }
}
