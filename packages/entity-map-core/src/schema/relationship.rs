//! Relationship declarations between entities.

use serde::{Deserialize, Serialize};

/// Relationship cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationshipKind {
    OneToOne,
    OneToMany,
    ManyToOne,
}

/// Relationship declaration between two entities.
///
/// The owning side physically stores the foreign key columns listed in
/// `field_map`; a non-owning side is purely navigational and carries no
/// storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDefinition {
    name: String,
    kind: RelationshipKind,
    target: String,
    owning: bool,
    /// Local foreign-key column -> target key field, in target key order
    field_map: Vec<(String, String)>,
}

impl RelationshipDefinition {
    /// Declares an owning relationship holding the foreign key.
    ///
    /// # Arguments
    /// * `name` - Relationship name on this entity
    /// * `kind` - Cardinality
    /// * `target` - Target entity name
    /// * `field_map` - Local column to target key field pairs, in target key order
    pub fn owning(
        name: impl Into<String>,
        kind: RelationshipKind,
        target: impl Into<String>,
        field_map: Vec<(String, String)>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            target: target.into(),
            owning: true,
            field_map,
        }
    }

    /// Declares a non-owning back-reference with no storage.
    pub fn inverse(
        name: impl Into<String>,
        kind: RelationshipKind,
        target: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            target: target.into(),
            owning: false,
            field_map: Vec::new(),
        }
    }

    /// Returns the relationship name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the cardinality.
    pub fn kind(&self) -> RelationshipKind {
        self.kind
    }

    /// Returns the target entity name.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Returns `true` if this side stores the foreign key.
    pub fn is_owning(&self) -> bool {
        self.owning
    }

    /// Returns the local-column to target-key-field mapping.
    pub fn field_map(&self) -> &[(String, String)] {
        &self.field_map
    }
}
