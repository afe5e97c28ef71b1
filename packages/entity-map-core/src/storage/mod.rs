//! Storage collaborator interface and the in-memory engine.
//!
//! The SQL execution layer is out of scope; everything behind this trait
//! (dialects, pooling, migrations) is an external collaborator. The
//! composite-key and relationship semantics of the core hold regardless of
//! which engine is plugged in.

mod memory;

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::DbError;
use crate::schema::EntityDefinition;
use crate::transaction::IsolationLevel;
use crate::value::Value;

pub use memory::MemoryStorage;

/// A materialized storage row.
pub type Row = HashMap<String, Value>;

/// Conjunctive column predicate: every pair must match.
pub type ColumnPredicate = Vec<(String, Value)>;

/// Narrow interface to the excluded SQL execution layer.
///
/// Implementations use interior mutability; methods take `&self` so an
/// engine can sit behind an `Arc` shared by independent sessions (it stands
/// in for a connection pool, which this core does not own).
pub trait StorageEngine {
    /// Inserts a row.
    ///
    /// # Arguments
    /// * `table` - Target table
    /// * `columns` - Column names, parallel to `values`
    /// * `values` - Column values
    ///
    /// # Returns
    /// Columns assigned by storage (e.g. server-generated timestamps), to be
    /// folded back into the in-memory instance.
    fn execute_insert(
        &self,
        table: &str,
        columns: &[String],
        values: &[Value],
    ) -> Result<Row, DbError>;

    /// Updates the row matching the full key.
    ///
    /// # Returns
    /// The number of affected rows.
    fn execute_update(
        &self,
        table: &str,
        key_columns: &[String],
        key_values: &[Value],
        changed_columns: &[String],
        changed_values: &[Value],
    ) -> Result<usize, DbError>;

    /// Returns all rows matching the predicate, finite and materialized.
    /// An empty `columns` slice selects every column.
    fn execute_select(
        &self,
        table: &str,
        predicate: &ColumnPredicate,
        columns: &[String],
    ) -> Result<Vec<Row>, DbError>;

    /// Opens a transaction on the scoped connection.
    fn begin_transaction(&self, isolation: IsolationLevel) -> Result<(), DbError>;

    /// Commits the open transaction.
    fn commit(&self) -> Result<(), DbError>;

    /// Rolls back the open transaction, discarding all of its effects.
    fn rollback(&self) -> Result<(), DbError>;

    /// Idempotent DDL application, used once at startup.
    fn ensure_schema(&self, definitions: &[Arc<EntityDefinition>]) -> Result<(), DbError>;
}
