//! Per-session identity map.

use std::collections::HashMap;

use crate::instance::Tracked;
use crate::key::CompositeKey;

/// Guarantees at most one in-memory instance per (entity, composite key)
/// per session. Entries live for the life of the session as a read cache.
#[derive(Debug, Default)]
pub struct IdentityMap {
    entries: HashMap<(String, CompositeKey), Tracked>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the tracked instance for an identity, if present.
    pub fn get(&self, entity: &str, key: &CompositeKey) -> Option<Tracked> {
        self.entries
            .get(&(entity.to_string(), key.clone()))
            .cloned()
    }

    /// Tracks an instance under its identity.
    pub fn insert(&mut self, entity: String, key: CompositeKey, instance: Tracked) {
        self.entries.insert((entity, key), instance);
    }

    /// Stops tracking an identity, e.g. after its insert was rolled back.
    pub fn remove(&mut self, entity: &str, key: &CompositeKey) -> Option<Tracked> {
        self.entries.remove(&(entity.to_string(), key.clone()))
    }

    /// Returns the number of tracked identities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
