//! Dynamically typed field values.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of a field value, used in schema declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Int,
    Float,
    Text,
    Bool,
    /// Point in time (epoch milliseconds)
    Instant,
    IntList,
}

impl ValueKind {
    /// Returns the kind name used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Text => "text",
            ValueKind::Bool => "bool",
            ValueKind::Instant => "instant",
            ValueKind::IntList => "int list",
        }
    }
}

/// Dynamically typed field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    /// Point in time as milliseconds since the Unix epoch
    Instant(i64),
    IntList(Vec<i64>),
}

impl Value {
    /// Returns the kind of this value, or `None` for `Null`.
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Value::Null => None,
            Value::Int(_) => Some(ValueKind::Int),
            Value::Float(_) => Some(ValueKind::Float),
            Value::Text(_) => Some(ValueKind::Text),
            Value::Bool(_) => Some(ValueKind::Bool),
            Value::Instant(_) => Some(ValueKind::Instant),
            Value::IntList(_) => Some(ValueKind::IntList),
        }
    }

    /// Returns `true` if this value is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Type-aware equality.
    ///
    /// `Int` and `Float` compare numerically across variants, `Instant`
    /// compares as an instant, everything else compares within its own
    /// variant. `Null` equals only `Null`.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Instant(a), Value::Instant(b)) => a == b,
            (Value::IntList(a), Value::IntList(b)) => a == b,
            _ => false,
        }
    }

    /// Returns `true` if this value can be stored in a field of `kind`.
    ///
    /// `Null` matches any kind; nullability is checked separately.
    pub fn matches_kind(&self, kind: ValueKind) -> bool {
        match self.kind() {
            None => true,
            Some(own) => own == kind,
        }
    }

    /// Returns the kind name of this value for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self.kind() {
            None => "null",
            Some(kind) => kind.name(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "'{}'", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Instant(ms) => write!(f, "instant({})", ms),
            Value::IntList(v) => write!(f, "{:?}", v),
        }
    }
}
