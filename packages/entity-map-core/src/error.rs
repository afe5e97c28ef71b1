//! Persistence core error types.

use thiserror::Error;

/// Persistence core operation errors.
#[derive(Error, Debug, Clone)]
pub enum DbError {
    /// Entity already registered under this name
    #[error("Entity '{entity}' is already registered")]
    DuplicateEntity { entity: String },

    /// Entity not found in the schema registry
    #[error("Unknown entity '{entity}'")]
    UnknownEntity { entity: String },

    /// Field declared twice on the same entity
    #[error("Field '{field}' is declared twice on entity '{entity}'")]
    DuplicateField { entity: String, field: String },

    /// Relationship field mapping is inconsistent with the schema
    #[error("Invalid mapping on '{entity}.{relationship}': {reason}")]
    InvalidMapping {
        entity: String,
        relationship: String,
        reason: String,
    },

    /// Key field was unset when the composite key was computed
    #[error("Incomplete key for entity '{entity}': field '{field}' is unset")]
    IncompleteKey { entity: String, field: String },

    /// No row matched a required lookup
    #[error("No '{entity}' row matches {lookup}")]
    NotFound { entity: String, lookup: String },

    /// Unresolved reference dereferenced outside a session
    #[error("Reference to '{entity}' is detached; load it through a session first")]
    DetachedReference { entity: String },

    /// Mutual foreign-key ownership among pending inserts
    #[error("Cyclic ownership between pending inserts of '{a}' and '{b}'")]
    CyclicDependency { a: String, b: String },

    /// begin() called while a transaction is active
    #[error("A transaction is already active on this session")]
    AlreadyActive,

    /// commit()/rollback() called without an active transaction
    #[error("No active transaction on this session")]
    NotActive,

    /// Key field assignment after the instance was persisted
    #[error("Key field '{field}' of persisted '{entity}' instance is immutable")]
    ImmutableKey { entity: String, field: String },

    /// Value does not match the declared field kind
    #[error("Type mismatch for '{entity}.{field}': expected {expected}, got {got}")]
    TypeMismatch {
        entity: String,
        field: String,
        expected: String,
        got: String,
    },

    /// Field not declared on the entity
    #[error("Field '{field}' not found on entity '{entity}'")]
    FieldNotFound { entity: String, field: String },

    /// Relationship not declared on the entity
    #[error("Relationship '{relationship}' not found on entity '{entity}'")]
    RelationshipNotFound { entity: String, relationship: String },

    /// Registration attempted after the registry was frozen
    #[error("Schema registry is frozen")]
    RegistryFrozen,

    /// Storage collaborator failure with operation context
    #[error("Storage failure during {operation} on '{table}': {cause}")]
    Storage {
        operation: &'static str,
        table: String,
        cause: String,
    },

    /// Lock poisoned (Mutex/RwLock poisoned)
    #[error("Lock poisoned")]
    LockPoisoned,
}
