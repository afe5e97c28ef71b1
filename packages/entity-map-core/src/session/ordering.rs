//! Foreign-key dependency ordering for pending inserts.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::error::DbError;
use crate::instance::{EntityInstance, Tracked};
use crate::key::CompositeKey;
use crate::schema::SchemaRegistry;

use super::identity_map::IdentityMap;

/// Orders pending inserts so that every owning side is written only after
/// its target (Kahn's algorithm over target -> owner edges).
///
/// # Arguments
/// * `pending` - Pending insert instances; positions double as node ids
/// * `registry` - Schema registry, used to resolve unresolved reference keys
/// * `identity` - Session identity map, used to recognize pending targets
///   behind unresolved references
///
/// # Returns
/// `Result<Vec<usize>, DbError>` with indices into `pending` in safe write
/// order, or `CyclicDependency` when two owners mutually depend on each
/// other. Detection runs before any write, so callers can surface the error
/// with their pending lists untouched.
pub(crate) fn order_inserts(
    pending: &[Tracked],
    registry: &SchemaRegistry,
    identity: &IdentityMap,
) -> Result<Vec<usize>, DbError> {
    let mut index_of: HashMap<*const RefCell<EntityInstance>, usize> = HashMap::new();
    for (i, tracked) in pending.iter().enumerate() {
        index_of.insert(Rc::as_ptr(tracked), i);
    }

    let n = pending.len();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut indegree = vec![0usize; n];

    for (owner_idx, tracked) in pending.iter().enumerate() {
        let instance = tracked.borrow();
        let definition = instance.definition().clone();
        for rel in definition.relationships().iter().filter(|r| r.is_owning()) {
            let Some(reference) = instance.reference(rel.name()) else {
                continue;
            };

            let target_idx = if reference.is_resolved() {
                let target = reference.get()?;
                index_of.get(&Rc::as_ptr(&target)).copied()
            } else {
                // an unresolved reference may still point at a row pending
                // in this same flush; recognize it through the identity map
                reference.lookup().and_then(|lookup| {
                    let target_def = registry.resolve(reference.target()).ok()?;
                    let mut values = Vec::with_capacity(target_def.key_fields().len());
                    for field in target_def.key_fields() {
                        let (_, value) =
                            lookup.iter().find(|(name, _)| name == field.name())?;
                        values.push(value.clone());
                    }
                    let key = CompositeKey::new(values);
                    let target = identity.get(target_def.name(), &key)?;
                    index_of.get(&Rc::as_ptr(&target)).copied()
                })
            };

            if let Some(target_idx) = target_idx {
                if target_idx != owner_idx {
                    dependents[target_idx].push(owner_idx);
                    indegree[owner_idx] += 1;
                }
            }
        }
    }

    let mut queue: VecDeque<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(i) = queue.pop_front() {
        order.push(i);
        for &dependent in &dependents[i] {
            indegree[dependent] -= 1;
            if indegree[dependent] == 0 {
                queue.push_back(dependent);
            }
        }
    }

    if order.len() != n {
        let mut stuck = (0..n).filter(|&i| indegree[i] > 0);
        let a = stuck.next().unwrap_or(0);
        let b = stuck.next().unwrap_or(a);
        return Err(DbError::CyclicDependency {
            a: pending[a].borrow().entity().to_string(),
            b: pending[b].borrow().entity().to_string(),
        });
    }
    Ok(order)
}
