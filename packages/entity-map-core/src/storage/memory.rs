//! In-memory storage engine for tests and development.
//!
//! Rows live in per-table vectors in insertion order. Transactions take a
//! whole-database snapshot at begin and restore it on rollback; commit
//! drops the snapshot. Composite primary key uniqueness is enforced on
//! insert when the table's definition is known.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::DbConfig;
use crate::error::DbError;
use crate::schema::EntityDefinition;
use crate::transaction::IsolationLevel;
use crate::value::Value;

use super::{ColumnPredicate, Row, StorageEngine};

#[derive(Default)]
struct Inner {
    tables: HashMap<String, Vec<Row>>,
    schemas: HashMap<String, Arc<EntityDefinition>>,
    /// Tables as of transaction begin, restored on rollback
    snapshot: Option<HashMap<String, Vec<Row>>>,
    active_isolation: Option<IsolationLevel>,
}

/// In-memory storage engine.
pub struct MemoryStorage {
    inner: Mutex<Inner>,
    config: DbConfig,
}

fn storage_error(operation: &'static str, table: &str, cause: impl Into<String>) -> DbError {
    DbError::Storage {
        operation,
        table: table.to_string(),
        cause: cause.into(),
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

impl MemoryStorage {
    /// Creates an empty engine with the given configuration.
    pub fn new(config: DbConfig) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            config,
        }
    }

    /// Statement timeout this engine was configured with, in milliseconds.
    /// Purely a passthrough setting: no in-memory operation blocks.
    pub fn statement_timeout_ms(&self) -> u64 {
        self.config.statement_timeout_ms
    }

    /// Isolation level of the open transaction, if any.
    pub fn active_isolation(&self) -> Option<IsolationLevel> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.active_isolation)
    }

    /// Total row count of a table; `None` if the table does not exist.
    pub fn row_count(&self, table: &str) -> Option<usize> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.tables.get(table).map(Vec::len))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, DbError> {
        self.inner.lock().map_err(|_| DbError::LockPoisoned)
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new(DbConfig::default())
    }
}

fn row_matches(row: &Row, predicate: &[(String, Value)]) -> bool {
    predicate.iter().all(|(column, expected)| {
        row.get(column).is_some_and(|actual| actual.loose_eq(expected))
    })
}

impl StorageEngine for MemoryStorage {
    fn execute_insert(
        &self,
        table: &str,
        columns: &[String],
        values: &[Value],
    ) -> Result<Row, DbError> {
        let mut inner = self.lock()?;
        if !inner.tables.contains_key(table) {
            return Err(storage_error("insert", table, "no such table"));
        }

        let mut row: Row = columns
            .iter()
            .cloned()
            .zip(values.iter().cloned())
            .collect();

        let mut assigned = Row::new();
        if let Some(definition) = inner.schemas.get(table).cloned() {
            // composite primary key uniqueness
            let key_predicate: Vec<(String, Value)> = definition
                .key_fields()
                .iter()
                .map(|field| {
                    row.get(field.name())
                        .cloned()
                        .map(|value| (field.name().to_string(), value))
                        .ok_or_else(|| {
                            storage_error(
                                "insert",
                                table,
                                format!("key column '{}' missing", field.name()),
                            )
                        })
                })
                .collect::<Result<_, _>>()?;

            let rows = inner
                .tables
                .get(table)
                .ok_or_else(|| storage_error("insert", table, "no such table"))?;
            if rows.iter().any(|existing| row_matches(existing, &key_predicate)) {
                return Err(storage_error(
                    "insert",
                    table,
                    "duplicate composite primary key",
                ));
            }

            // server-generated timestamp defaults
            for field in definition.all_fields() {
                if field.has_default_now() {
                    let missing = row.get(field.name()).is_none_or(Value::is_null);
                    if missing {
                        let value = Value::Instant(now_millis());
                        row.insert(field.name().to_string(), value.clone());
                        assigned.insert(field.name().to_string(), value);
                    }
                }
            }
        }

        inner
            .tables
            .get_mut(table)
            .ok_or_else(|| storage_error("insert", table, "no such table"))?
            .push(row);
        Ok(assigned)
    }

    fn execute_update(
        &self,
        table: &str,
        key_columns: &[String],
        key_values: &[Value],
        changed_columns: &[String],
        changed_values: &[Value],
    ) -> Result<usize, DbError> {
        let mut inner = self.lock()?;
        let definition = inner.schemas.get(table).cloned();
        let rows = inner
            .tables
            .get_mut(table)
            .ok_or_else(|| storage_error("update", table, "no such table"))?;

        let key_predicate: Vec<(String, Value)> = key_columns
            .iter()
            .cloned()
            .zip(key_values.iter().cloned())
            .collect();

        let mut affected = 0;
        for row in rows.iter_mut().filter(|row| row_matches(row, &key_predicate)) {
            for (column, value) in changed_columns.iter().zip(changed_values.iter()) {
                row.insert(column.clone(), value.clone());
            }
            if let Some(definition) = &definition {
                for field in definition.all_fields() {
                    if field.touches_on_update() {
                        row.insert(field.name().to_string(), Value::Instant(now_millis()));
                    }
                }
            }
            affected += 1;
        }
        Ok(affected)
    }

    fn execute_select(
        &self,
        table: &str,
        predicate: &ColumnPredicate,
        columns: &[String],
    ) -> Result<Vec<Row>, DbError> {
        let inner = self.lock()?;
        let rows = inner
            .tables
            .get(table)
            .ok_or_else(|| storage_error("select", table, "no such table"))?;

        Ok(rows
            .iter()
            .filter(|row| row_matches(row, predicate))
            .map(|row| {
                if columns.is_empty() {
                    row.clone()
                } else {
                    columns
                        .iter()
                        .filter_map(|column| {
                            row.get(column).map(|value| (column.clone(), value.clone()))
                        })
                        .collect()
                }
            })
            .collect())
    }

    fn begin_transaction(&self, isolation: IsolationLevel) -> Result<(), DbError> {
        let mut inner = self.lock()?;
        if inner.snapshot.is_some() {
            return Err(storage_error(
                "begin",
                "<connection>",
                "transaction already open on this connection",
            ));
        }
        inner.snapshot = Some(inner.tables.clone());
        inner.active_isolation = Some(isolation);
        tracing::debug!(?isolation, "Transaction opened");
        Ok(())
    }

    fn commit(&self) -> Result<(), DbError> {
        let mut inner = self.lock()?;
        if inner.snapshot.take().is_none() {
            return Err(storage_error("commit", "<connection>", "no open transaction"));
        }
        inner.active_isolation = None;
        tracing::debug!("Transaction committed");
        Ok(())
    }

    fn rollback(&self) -> Result<(), DbError> {
        let mut inner = self.lock()?;
        let snapshot = inner
            .snapshot
            .take()
            .ok_or_else(|| storage_error("rollback", "<connection>", "no open transaction"))?;
        inner.tables = snapshot;
        inner.active_isolation = None;
        tracing::debug!("Transaction rolled back");
        Ok(())
    }

    fn ensure_schema(&self, definitions: &[Arc<EntityDefinition>]) -> Result<(), DbError> {
        let mut inner = self.lock()?;
        for definition in definitions {
            let capacity = self.config.initial_table_capacity;
            inner
                .tables
                .entry(definition.table().to_string())
                .or_insert_with(|| Vec::with_capacity(capacity));
            inner
                .schemas
                .insert(definition.table().to_string(), definition.clone());
        }
        tracing::debug!(tables = definitions.len(), "Schema ensured");
        Ok(())
    }
}
