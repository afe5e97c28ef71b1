//! Lazy and eager handles to related entities.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::DbError;
use crate::instance::Tracked;
use crate::key::CompositeKey;
use crate::schema::EntityDefinition;
use crate::value::Value;

/// Interior state of a reference.
enum RefState {
    /// Only a column predicate locating the target row is known
    Unresolved { lookup: Vec<(String, Value)> },
    /// The target instance has been materialized
    Resolved(Tracked),
}

/// Possibly-unresolved handle to a related entity instance.
///
/// Clones share resolution state: promoting one clone promotes them all.
/// Resolution happens explicitly through [`Session::load`] — there is no
/// hidden interception of field access.
///
/// [`Session::load`]: crate::session::Session::load
#[derive(Clone)]
pub struct Reference {
    target: String,
    state: Rc<RefCell<RefState>>,
}

impl Reference {
    /// Eager reference to an in-memory instance. No lookup is ever issued.
    pub fn resolved(instance: Tracked) -> Self {
        let target = instance.borrow().entity().to_string();
        Self {
            target,
            state: Rc::new(RefCell::new(RefState::Resolved(instance))),
        }
    }

    /// Unresolved reference located by a column predicate on the target
    /// table. Used when only a foreign key is known.
    pub fn unresolved(target: impl Into<String>, lookup: Vec<(String, Value)>) -> Self {
        Self {
            target: target.into(),
            state: Rc::new(RefCell::new(RefState::Unresolved { lookup })),
        }
    }

    /// Unresolved reference to the target row with the given composite key.
    pub fn by_key(target: &EntityDefinition, key: &CompositeKey) -> Self {
        let lookup = target
            .key_fields()
            .iter()
            .zip(key.values().iter())
            .map(|(field, value)| (field.name().to_string(), value.clone()))
            .collect();
        Self::unresolved(target.name(), lookup)
    }

    /// Returns the target entity name.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Returns `true` if the target instance has been materialized.
    pub fn is_resolved(&self) -> bool {
        matches!(&*self.state.borrow(), RefState::Resolved(_))
    }

    /// Returns the resolved instance.
    ///
    /// # Returns
    /// `Result<Tracked, DbError>` failing with `DetachedReference` if the
    /// reference is still unresolved; resolve it through a session first.
    pub fn get(&self) -> Result<Tracked, DbError> {
        match &*self.state.borrow() {
            RefState::Resolved(instance) => Ok(instance.clone()),
            RefState::Unresolved { .. } => Err(DbError::DetachedReference {
                entity: self.target.clone(),
            }),
        }
    }

    /// Returns the lookup predicate while unresolved.
    pub(crate) fn lookup(&self) -> Option<Vec<(String, Value)>> {
        match &*self.state.borrow() {
            RefState::Unresolved { lookup } => Some(lookup.clone()),
            RefState::Resolved(_) => None,
        }
    }

    /// Caches the materialized target; shared across clones.
    pub(crate) fn promote(&self, instance: Tracked) {
        *self.state.borrow_mut() = RefState::Resolved(instance);
    }
}

// Manual Debug: resolved one-to-one pairs reference each other, so deriving
// would recurse through the instances.
impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("target", &self.target)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
