//! Unit of Work session: identity map, pending writes, ordered flush.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::config::DbConfig;
use crate::error::DbError;
use crate::instance::{EntityInstance, Tracked};
use crate::key::{compute_key, CompositeKey};
use crate::reference::Reference;
use crate::schema::{EntityDefinition, RelationshipDefinition, RelationshipKind, SchemaRegistry};
use crate::storage::{ColumnPredicate, Row, StorageEngine};
use crate::transaction::{IsolationLevel, TransactionContext};
use crate::value::Value;

use super::filter::{Condition, Filter, FindOptions};
use super::identity_map::IdentityMap;
use super::ordering;

/// Per-session unit of work.
///
/// Owns the identity map and the pending insert/update lists; shares only
/// the frozen schema registry and the storage handle with other sessions.
/// Not thread-safe: confine a session to one thread or serialize access
/// externally.
pub struct Session {
    registry: Arc<SchemaRegistry>,
    storage: Arc<dyn StorageEngine>,
    config: DbConfig,
    identity: IdentityMap,
    pending_inserts: Vec<Tracked>,
    pending_updates: Vec<Tracked>,
    /// Instances inserted within the active explicit transaction; their
    /// rows vanish if it rolls back
    tx_inserts: Vec<Tracked>,
    tx: TransactionContext,
}

impl Session {
    /// Creates a session with a fresh identity map and empty pending lists.
    pub fn new(
        registry: Arc<SchemaRegistry>,
        storage: Arc<dyn StorageEngine>,
        config: DbConfig,
    ) -> Self {
        Self {
            registry,
            storage,
            config,
            identity: IdentityMap::new(),
            pending_inserts: Vec::new(),
            pending_updates: Vec::new(),
            tx_inserts: Vec::new(),
            tx: TransactionContext::new(),
        }
    }

    /// Creates an untracked instance of the named entity.
    pub fn create(&self, entity: &str) -> Result<EntityInstance, DbError> {
        let definition = self.registry.resolve(entity)?;
        Ok(EntityInstance::new(definition))
    }

    /// Marks an instance for insertion (or update, if its identity was
    /// already persisted in this session) and registers it in the identity
    /// map. Side effect only; no storage write until [`flush`](Self::flush).
    ///
    /// # Returns
    /// The tracked handle. When the identity was already tracked, the
    /// existing instance is updated and returned instead of a duplicate.
    pub fn persist(&mut self, instance: EntityInstance) -> Result<Tracked, DbError> {
        self.enqueue(Rc::new(RefCell::new(instance)))
    }

    /// Re-queues an already-tracked instance, e.g. after mutating one
    /// returned by [`find_one`](Self::find_one).
    pub fn persist_tracked(&mut self, instance: &Tracked) -> Result<Tracked, DbError> {
        self.enqueue(instance.clone())
    }

    fn enqueue(&mut self, tracked: Tracked) -> Result<Tracked, DbError> {
        derive_foreign_keys(&tracked)?;

        let (entity, key) = {
            let instance = tracked.borrow();
            let definition = instance.definition().clone();
            let key = compute_key(&instance, &definition)?;
            (definition.name().to_string(), key)
        };

        let chosen = match self.identity.get(&entity, &key) {
            Some(existing) if !Rc::ptr_eq(&existing, &tracked) => {
                existing.borrow_mut().merge_from(&tracked.borrow());
                existing
            }
            Some(existing) => existing,
            None => {
                self.identity.insert(entity, key, tracked.clone());
                tracked
            }
        };

        let pending = if chosen.borrow().is_persisted() {
            &mut self.pending_updates
        } else {
            &mut self.pending_inserts
        };
        if !pending.iter().any(|t| Rc::ptr_eq(t, &chosen)) {
            pending.push(chosen.clone());
        }
        Ok(chosen)
    }

    /// Number of instances pending insertion.
    pub fn pending_insert_count(&self) -> usize {
        self.pending_inserts.len()
    }

    /// Number of instances pending update.
    pub fn pending_update_count(&self) -> usize {
        self.pending_updates.len()
    }

    /// Number of identities tracked by this session.
    pub fn tracked_count(&self) -> usize {
        self.identity.len()
    }

    /// Writes all pending changes through storage in dependency order.
    ///
    /// Inserts are topologically ordered so an owning side is written only
    /// after its target row exists. Runs inside the active transaction, or
    /// an implicit auto-committed one. On a cycle among pending owners the
    /// flush fails with `CyclicDependency` before any write and the pending
    /// lists are left untouched for inspection; on a write failure the rest
    /// of the batch is aborted and the original error surfaces.
    pub fn flush(&mut self) -> Result<(), DbError> {
        if self.pending_inserts.is_empty() && self.pending_updates.is_empty() {
            return Ok(());
        }

        // ordering runs before any write so a cycle leaves state untouched
        let order = ordering::order_inserts(&self.pending_inserts, &self.registry, &self.identity)?;

        let implicit = !self.tx.is_active();
        if implicit {
            self.storage.begin_transaction(self.config.default_isolation)?;
        }

        tracing::debug!(
            inserts = self.pending_inserts.len(),
            updates = self.pending_updates.len(),
            implicit,
            "Flushing session"
        );

        match self.write_batch(&order) {
            Ok(()) => {
                if implicit {
                    self.storage.commit()?;
                }
                self.pending_inserts.clear();
                self.pending_updates.clear();
                tracing::debug!("Flush completed");
                Ok(())
            }
            Err(error) => {
                tracing::error!(%error, "Flush aborted");
                if implicit {
                    if let Err(rollback_error) = self.storage.rollback() {
                        tracing::warn!(%rollback_error, "Rollback after failed flush also failed");
                    }
                }
                Err(error)
            }
        }
    }

    fn write_batch(&mut self, insert_order: &[usize]) -> Result<(), DbError> {
        for &i in insert_order {
            let tracked = self.pending_inserts[i].clone();
            self.insert_instance(&tracked)?;
        }
        let updates: Vec<Tracked> = self.pending_updates.clone();
        for tracked in updates {
            self.update_instance(&tracked)?;
        }
        Ok(())
    }

    fn insert_instance(&mut self, tracked: &Tracked) -> Result<(), DbError> {
        // references may have been attached after persist()
        derive_foreign_keys(tracked)?;

        let (table, columns, values) = {
            let instance = tracked.borrow();
            let definition = instance.definition().clone();
            let mut columns = Vec::new();
            let mut values = Vec::new();
            for field in definition.all_fields() {
                if let Some(value) = instance.get(field.name()) {
                    columns.push(field.name().to_string());
                    values.push(value.clone());
                }
            }
            (definition.table().to_string(), columns, values)
        };

        let assigned = self.storage.execute_insert(&table, &columns, &values)?;

        {
            let mut instance = tracked.borrow_mut();
            for (column, value) in assigned {
                instance.set_raw(column, value);
            }
            instance.mark_persisted();
        }
        if self.tx.is_active() {
            self.tx_inserts.push(tracked.clone());
        }
        Ok(())
    }

    fn update_instance(&self, tracked: &Tracked) -> Result<(), DbError> {
        let (table, entity, key, key_columns, key_values, changed_columns, changed_values) = {
            let instance = tracked.borrow();
            let definition = instance.definition().clone();
            let key = compute_key(&instance, &definition)?;
            let key_columns: Vec<String> = definition
                .key_fields()
                .iter()
                .map(|f| f.name().to_string())
                .collect();
            let key_values: Vec<Value> = key.values().to_vec();

            let mut changed_columns = Vec::new();
            let mut changed_values = Vec::new();
            for field in definition.fields() {
                if let Some(value) = instance.get(field.name()) {
                    changed_columns.push(field.name().to_string());
                    changed_values.push(value.clone());
                }
            }
            (
                definition.table().to_string(),
                definition.name().to_string(),
                key,
                key_columns,
                key_values,
                changed_columns,
                changed_values,
            )
        };

        let affected = self.storage.execute_update(
            &table,
            &key_columns,
            &key_values,
            &changed_columns,
            &changed_values,
        )?;
        if affected == 0 {
            return Err(DbError::NotFound {
                entity,
                lookup: key.to_string(),
            });
        }
        Ok(())
    }

    /// Looks up a single instance by partial or full key filter.
    ///
    /// A filter covering the full composite key checks the identity map
    /// first and returns the tracked instance without a storage round trip
    /// (read-your-writes). Relationships named in `options.populate` are
    /// resolved eagerly before returning.
    ///
    /// # Returns
    /// `Ok(None)` when no row matches; `NotFound` is reserved for dangling
    /// references during populate.
    pub fn find_one(
        &mut self,
        entity: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Option<Tracked>, DbError> {
        let definition = self.registry.resolve(entity)?;
        let predicate = flatten_filter(&definition, filter)?;

        if let Some(key) = full_key_from_predicate(&definition, &predicate) {
            if let Some(hit) = self.identity.get(definition.name(), &key) {
                // non-key conditions must also hold on the tracked instance
                let satisfied = {
                    let instance = hit.borrow();
                    predicate.iter().all(|(column, expected)| {
                        definition.is_key_field(column)
                            || instance
                                .get(column)
                                .is_some_and(|actual| actual.loose_eq(expected))
                    })
                };
                if !satisfied {
                    return Ok(None);
                }
                self.populate(&hit, &options.populate)?;
                return Ok(Some(hit));
            }
        }

        let rows = self
            .storage
            .execute_select(definition.table(), &predicate, &[])?;
        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };

        let tracked = self.materialize(&definition, row)?;
        self.populate(&tracked, &options.populate)?;
        Ok(Some(tracked))
    }

    /// Resolves a reference, caching the result on the reference itself.
    ///
    /// Resolved references return immediately. Unresolved references check
    /// the identity map (the target may be pending in this very session)
    /// and then storage.
    ///
    /// # Returns
    /// `Result<Tracked, DbError>` failing with `NotFound` when no row
    /// matches the reference's lookup (e.g. a dangling foreign key).
    pub fn load(&mut self, reference: &Reference) -> Result<Tracked, DbError> {
        if reference.is_resolved() {
            return reference.get();
        }
        let Some(lookup) = reference.lookup() else {
            // raced into a resolved state; get() now succeeds
            return reference.get();
        };
        let definition = self.registry.resolve(reference.target())?;

        if let Some(key) = full_key_from_predicate(&definition, &lookup) {
            if let Some(hit) = self.identity.get(definition.name(), &key) {
                reference.promote(hit.clone());
                return Ok(hit);
            }
        }

        let rows = self
            .storage
            .execute_select(definition.table(), &lookup, &[])?;
        let Some(row) = rows.into_iter().next() else {
            return Err(DbError::NotFound {
                entity: definition.name().to_string(),
                lookup: format_lookup(&lookup),
            });
        };

        let tracked = self.materialize(&definition, row)?;
        reference.promote(tracked.clone());
        Ok(tracked)
    }

    fn materialize(
        &mut self,
        definition: &Arc<EntityDefinition>,
        row: Row,
    ) -> Result<Tracked, DbError> {
        let mut instance = EntityInstance::new(definition.clone());
        for field in definition.all_fields() {
            if let Some(value) = row.get(field.name()) {
                instance.set_raw(field.name(), value.clone());
            }
        }
        instance.mark_persisted();

        let key = compute_key(&instance, definition)?;
        if let Some(existing) = self.identity.get(definition.name(), &key) {
            // second load of the same identity updates the tracked instance
            existing.borrow_mut().merge_from(&instance);
            return Ok(existing);
        }

        let tracked: Tracked = Rc::new(RefCell::new(instance));
        let references: Vec<(String, Reference)> = {
            let instance = tracked.borrow();
            let mut references = Vec::new();
            for rel in definition.relationships() {
                if let Some(reference) = self.build_reference(definition, &instance, rel)? {
                    references.push((rel.name().to_string(), reference));
                }
            }
            references
        };
        {
            let mut instance = tracked.borrow_mut();
            for (name, reference) in references {
                instance.set_reference(&name, reference)?;
            }
        }

        self.identity
            .insert(definition.name().to_string(), key, tracked.clone());
        Ok(tracked)
    }

    /// Builds the unresolved reference for a relationship from an
    /// instance's current column values. Returns `None` when the foreign
    /// key is unset (nullable relationship) or the navigation is to-many.
    fn build_reference(
        &self,
        definition: &EntityDefinition,
        instance: &EntityInstance,
        rel: &RelationshipDefinition,
    ) -> Result<Option<Reference>, DbError> {
        if rel.is_owning() {
            let mut lookup = Vec::with_capacity(rel.field_map().len());
            for (local, target_field) in rel.field_map() {
                match instance.get(local) {
                    Some(value) if !value.is_null() => {
                        lookup.push((target_field.clone(), value.clone()));
                    }
                    _ => return Ok(None),
                }
            }
            return Ok(Some(Reference::unresolved(rel.target(), lookup)));
        }

        if rel.kind() != RelationshipKind::OneToOne {
            // to-many navigations are not materialized as single references
            return Ok(None);
        }

        // non-owning one-to-one: locate the owner row whose foreign key
        // columns equal this instance's key values
        let target_def = self.registry.resolve(rel.target())?;
        let back = target_def
            .relationships()
            .iter()
            .find(|b| {
                b.is_owning()
                    && b.kind() == RelationshipKind::OneToOne
                    && b.target() == definition.name()
            })
            .ok_or_else(|| DbError::InvalidMapping {
                entity: definition.name().to_string(),
                relationship: rel.name().to_string(),
                reason: format!("no owning counterpart on '{}'", rel.target()),
            })?;

        let mut lookup = Vec::with_capacity(back.field_map().len());
        for (owner_column, my_key_field) in back.field_map() {
            match instance.get(my_key_field) {
                Some(value) if !value.is_null() => {
                    lookup.push((owner_column.clone(), value.clone()));
                }
                _ => return Ok(None),
            }
        }
        Ok(Some(Reference::unresolved(rel.target(), lookup)))
    }

    fn populate(&mut self, tracked: &Tracked, relationships: &[String]) -> Result<(), DbError> {
        for name in relationships {
            let definition = tracked.borrow().definition().clone();
            let rel = definition
                .relationship(name)
                .ok_or_else(|| DbError::RelationshipNotFound {
                    entity: definition.name().to_string(),
                    relationship: name.clone(),
                })?;

            let reference = match tracked.borrow().reference(name).cloned() {
                Some(reference) => Some(reference),
                None => {
                    let built = {
                        let instance = tracked.borrow();
                        self.build_reference(&definition, &instance, rel)?
                    };
                    if let Some(reference) = &built {
                        tracked.borrow_mut().set_reference(name, reference.clone())?;
                    }
                    built
                }
            };

            if let Some(reference) = reference {
                self.load(&reference)?;
            }
        }
        Ok(())
    }

    /// Opens a transaction on the shared connection.
    pub fn begin(&mut self, isolation: IsolationLevel) -> Result<(), DbError> {
        if self.tx.is_active() {
            return Err(DbError::AlreadyActive);
        }
        let mut tx = TransactionContext::new();
        tx.begin(isolation)?;
        self.storage.begin_transaction(isolation)?;
        self.tx = tx;
        Ok(())
    }

    /// Flushes pending changes and commits the active transaction.
    pub fn commit(&mut self) -> Result<(), DbError> {
        if !self.tx.is_active() {
            return Err(DbError::NotActive);
        }
        self.flush()?;
        self.storage.commit()?;
        self.tx_inserts.clear();
        self.tx.commit()
    }

    /// Rolls back the active transaction, discarding all of its pending
    /// effects. All-or-nothing: there is no partial-statement cancellation.
    ///
    /// Instances inserted by flushes inside the transaction lose their rows
    /// with it; they revert to unpersisted, untracked state so a later
    /// persist inserts them again.
    pub fn rollback(&mut self) -> Result<(), DbError> {
        if !self.tx.is_active() {
            return Err(DbError::NotActive);
        }
        self.storage.rollback()?;
        self.tx.rollback()?;
        self.pending_inserts.clear();
        self.pending_updates.clear();
        for tracked in std::mem::take(&mut self.tx_inserts) {
            let key = {
                let mut instance = tracked.borrow_mut();
                instance.unmark_persisted();
                let definition = instance.definition().clone();
                compute_key(&instance, &definition)
            };
            if let Ok(key) = key {
                self.identity.remove(tracked.borrow().entity(), &key);
            }
        }
        Ok(())
    }

    /// Returns `true` while a transaction is active on this session.
    pub fn in_transaction(&self) -> bool {
        self.tx.is_active()
    }
}

/// Copies key values of owning reference targets onto the owner's foreign
/// key columns, so child keys derived from a relationship become part of
/// the composite key before it is computed.
fn derive_foreign_keys(tracked: &Tracked) -> Result<(), DbError> {
    let updates: Vec<(String, Value)> = {
        let instance = tracked.borrow();
        let definition = instance.definition().clone();
        let mut updates = Vec::new();
        for rel in definition.relationships().iter().filter(|r| r.is_owning()) {
            let Some(reference) = instance.reference(rel.name()) else {
                continue;
            };
            if reference.is_resolved() {
                let target = reference.get()?;
                if Rc::ptr_eq(&target, tracked) {
                    continue;
                }
                let target_instance = target.borrow();
                for (local, target_field) in rel.field_map() {
                    if let Some(value) = target_instance.get(target_field) {
                        updates.push((local.clone(), value.clone()));
                    }
                }
            } else if let Some(lookup) = reference.lookup() {
                for (local, target_field) in rel.field_map() {
                    if let Some((_, value)) =
                        lookup.iter().find(|(name, _)| name == target_field)
                    {
                        updates.push((local.clone(), value.clone()));
                    }
                }
            }
        }
        updates
    };

    let mut instance = tracked.borrow_mut();
    for (column, value) in updates {
        instance.set_raw(column, value);
    }
    Ok(())
}

fn flatten_filter(
    definition: &EntityDefinition,
    filter: &Filter,
) -> Result<ColumnPredicate, DbError> {
    let mut predicate = Vec::new();
    for (name, condition) in filter.entries() {
        match condition {
            Condition::Eq(value) => {
                if definition.field(name).is_none() {
                    return Err(DbError::FieldNotFound {
                        entity: definition.name().to_string(),
                        field: name.clone(),
                    });
                }
                predicate.push((name.clone(), value.clone()));
            }
            Condition::Related(inner) => {
                let rel = definition.relationship(name).ok_or_else(|| {
                    DbError::RelationshipNotFound {
                        entity: definition.name().to_string(),
                        relationship: name.clone(),
                    }
                })?;
                if !rel.is_owning() {
                    return Err(DbError::InvalidMapping {
                        entity: definition.name().to_string(),
                        relationship: name.clone(),
                        reason: "filtering through a non-owning relationship is not supported"
                            .to_string(),
                    });
                }
                for (target_field, inner_condition) in inner.entries() {
                    let Condition::Eq(value) = inner_condition else {
                        return Err(DbError::InvalidMapping {
                            entity: definition.name().to_string(),
                            relationship: name.clone(),
                            reason: "nested relationship filters must be key equalities"
                                .to_string(),
                        });
                    };
                    let local = rel
                        .field_map()
                        .iter()
                        .find(|(_, t)| t == target_field)
                        .map(|(local, _)| local.clone())
                        .ok_or_else(|| DbError::InvalidMapping {
                            entity: definition.name().to_string(),
                            relationship: name.clone(),
                            reason: format!("'{}' is not a mapped target key field", target_field),
                        })?;
                    predicate.push((local, value.clone()));
                }
            }
        }
    }
    Ok(predicate)
}

/// Builds the composite key when the predicate covers every key field.
fn full_key_from_predicate(
    definition: &EntityDefinition,
    predicate: &[(String, Value)],
) -> Option<CompositeKey> {
    let mut values = Vec::with_capacity(definition.key_fields().len());
    for field in definition.key_fields() {
        let (_, value) = predicate.iter().find(|(name, _)| name == field.name())?;
        values.push(value.clone());
    }
    Some(CompositeKey::new(values))
}

fn format_lookup(lookup: &[(String, Value)]) -> String {
    let parts: Vec<String> = lookup
        .iter()
        .map(|(column, value)| format!("{}={}", column, value))
        .collect();
    format!("[{}]", parts.join(", "))
}
