//! Lookup filters and find options.

use crate::value::Value;

/// Condition on a single field or relationship.
#[derive(Debug, Clone)]
pub enum Condition {
    /// Direct field equality
    Eq(Value),
    /// Nested key filter through an owning relationship, flattened onto
    /// its foreign key columns
    Related(Filter),
}

/// Conjunctive filter over entity fields and relationships.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    entries: Vec<(String, Condition)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field equality condition.
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: Value) -> Self {
        self.entries.push((field.into(), Condition::Eq(value)));
        self
    }

    /// Adds a nested key filter through a relationship.
    #[must_use]
    pub fn related(mut self, relationship: impl Into<String>, filter: Filter) -> Self {
        self.entries
            .push((relationship.into(), Condition::Related(filter)));
        self
    }

    pub(crate) fn entries(&self) -> &[(String, Condition)] {
        &self.entries
    }
}

/// Options for [`Session::find_one`](crate::session::Session::find_one).
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Relationship names to resolve eagerly before returning
    pub populate: Vec<String>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a relationship to resolve eagerly.
    #[must_use]
    pub fn populate(mut self, relationship: impl Into<String>) -> Self {
        self.populate.push(relationship.into());
        self
    }
}
