//! Composite key computation and identity comparison.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::DbError;
use crate::instance::EntityInstance;
use crate::schema::EntityDefinition;
use crate::value::Value;

/// Ordered tuple of key field values uniquely identifying an entity instance.
///
/// # Invariants
///
/// - Integral `Float` values are normalized to `Int` at construction so
///   `Hash` agrees with the loose equality used by [`same_identity`].
/// - Non-integral floats hash by bit pattern and compare exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeKey(Vec<Value>);

impl CompositeKey {
    /// Creates a composite key from values in key-field order.
    pub fn new(values: Vec<Value>) -> Self {
        Self(values.into_iter().map(normalize).collect())
    }

    /// Returns the key values in key-field order.
    pub fn values(&self) -> &[Value] {
        &self.0
    }

    /// Returns the number of key fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the key holds no values.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn normalize(value: Value) -> Value {
    match value {
        Value::Float(f) if f.is_finite() && f.fract() == 0.0 => Value::Int(f as i64),
        other => other,
    }
}

impl PartialEq for CompositeKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self.0.iter().zip(other.0.iter()).all(|(a, b)| a.loose_eq(b))
    }
}

impl Eq for CompositeKey {}

impl Hash for CompositeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for value in &self.0 {
            match value {
                Value::Null => 0u8.hash(state),
                Value::Int(v) => {
                    1u8.hash(state);
                    v.hash(state);
                }
                Value::Float(v) => {
                    2u8.hash(state);
                    v.to_bits().hash(state);
                }
                Value::Text(v) => {
                    3u8.hash(state);
                    v.hash(state);
                }
                Value::Bool(v) => {
                    4u8.hash(state);
                    v.hash(state);
                }
                Value::Instant(v) => {
                    5u8.hash(state);
                    v.hash(state);
                }
                Value::IntList(v) => {
                    6u8.hash(state);
                    v.hash(state);
                }
            }
        }
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, ")")
    }
}

/// Projects `instance` onto the key fields of `definition`.
///
/// # Arguments
/// * `instance` - Entity instance to project
/// * `definition` - Entity definition declaring the key composition
///
/// # Returns
/// `Result<CompositeKey, DbError>` failing with `IncompleteKey` if any key
/// field is unset or `Null`.
pub fn compute_key(
    instance: &EntityInstance,
    definition: &EntityDefinition,
) -> Result<CompositeKey, DbError> {
    let mut values = Vec::with_capacity(definition.key_fields().len());
    for field in definition.key_fields() {
        match instance.get(field.name()) {
            Some(value) if !value.is_null() => values.push(value.clone()),
            _ => {
                return Err(DbError::IncompleteKey {
                    entity: definition.name().to_string(),
                    field: field.name().to_string(),
                });
            }
        }
    }
    Ok(CompositeKey::new(values))
}

/// Compares two instances of the same entity by composite key,
/// field-by-field with type-aware equality.
pub fn same_identity(
    a: &EntityInstance,
    b: &EntityInstance,
    definition: &EntityDefinition,
) -> Result<bool, DbError> {
    Ok(compute_key(a, definition)? == compute_key(b, definition)?)
}
