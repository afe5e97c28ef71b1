//! Entity definitions, relationships, and the schema registry.

mod entity;
mod registry;
mod relationship;
pub(crate) mod validation;

pub use entity::{EntityDefinition, FieldDef};
pub use registry::SchemaRegistry;
pub use relationship::{RelationshipDefinition, RelationshipKind};
