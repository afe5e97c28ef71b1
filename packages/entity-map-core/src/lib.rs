//! Embedded relational persistence core with composite-key entities,
//! one-to-one ownership relationships, and unit-of-work flushing.
//!
//! Entity definitions register once into a [`SchemaRegistry`]; a
//! [`Database`] freezes the registry against a [`StorageEngine`] and forks
//! cheap single-threaded [`Session`]s, each owning its identity map and
//! pending writes. Flushing orders inserts so foreign-key owners follow
//! their targets.

pub mod config;
pub mod database;
pub mod error;
pub mod instance;
pub mod key;
pub mod reference;
pub mod schema;
pub mod session;
pub mod storage;
pub mod transaction;
pub mod value;

pub use config::DbConfig;
pub use database::Database;
pub use error::DbError;
pub use instance::{EntityInstance, Tracked};
pub use key::{compute_key, same_identity, CompositeKey};
pub use reference::Reference;
pub use schema::{
    EntityDefinition, FieldDef, RelationshipDefinition, RelationshipKind, SchemaRegistry,
};
pub use session::{Filter, FindOptions, Session};
pub use storage::{ColumnPredicate, MemoryStorage, Row, StorageEngine};
pub use transaction::{IsolationLevel, TransactionContext, TxState};
pub use value::{Value, ValueKind};
