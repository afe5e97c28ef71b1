//! Schema validation: per-entity at registration, cross-entity at freeze.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::DbError;

use super::entity::EntityDefinition;
use super::relationship::RelationshipKind;

fn mapping_error(entity: &str, relationship: &str, reason: impl Into<String>) -> DbError {
    DbError::InvalidMapping {
        entity: entity.to_string(),
        relationship: relationship.to_string(),
        reason: reason.into(),
    }
}

/// Validates the locally resolvable parts of an entity's relationships.
///
/// Owning sides must declare foreign-key columns that exist on this entity;
/// non-owning sides must not carry storage. Target-side checks wait for
/// [`validate_cross_entity`] since the target may not be registered yet.
pub(crate) fn validate_local_mappings(definition: &EntityDefinition) -> Result<(), DbError> {
    for rel in definition.relationships() {
        if rel.is_owning() {
            if rel.field_map().is_empty() {
                return Err(mapping_error(
                    definition.name(),
                    rel.name(),
                    "owning side declares no foreign key columns",
                ));
            }
            for (local, _target_field) in rel.field_map() {
                if definition.field(local).is_none() {
                    return Err(mapping_error(
                        definition.name(),
                        rel.name(),
                        format!("local column '{}' does not exist", local),
                    ));
                }
            }
        } else if !rel.field_map().is_empty() {
            return Err(mapping_error(
                definition.name(),
                rel.name(),
                "non-owning side must not carry foreign key columns",
            ));
        }
    }
    Ok(())
}

/// Validates every relationship against its target definition.
///
/// Checks that targets exist, that owning mappings cover the target's full
/// composite key with matching kinds, and that every non-owning one-to-one
/// has exactly one owning counterpart. Two mutually owning one-to-one
/// relationships are legal schema (two independent foreign keys); they fail
/// at flush time with `CyclicDependency` when both rows are pending.
pub(crate) fn validate_cross_entity(
    entities: &HashMap<String, Arc<EntityDefinition>>,
) -> Result<(), DbError> {
    for definition in entities.values() {
        for rel in definition.relationships() {
            let target = entities
                .get(rel.target())
                .ok_or_else(|| DbError::UnknownEntity {
                    entity: rel.target().to_string(),
                })?;

            if rel.is_owning() {
                if rel.field_map().len() != target.key_fields().len() {
                    return Err(mapping_error(
                        definition.name(),
                        rel.name(),
                        format!(
                            "mapping covers {} of {} target key fields",
                            rel.field_map().len(),
                            target.key_fields().len()
                        ),
                    ));
                }
                for (local, target_field) in rel.field_map() {
                    if !target.is_key_field(target_field) {
                        return Err(mapping_error(
                            definition.name(),
                            rel.name(),
                            format!("'{}' is not a key field of '{}'", target_field, rel.target()),
                        ));
                    }
                    let local_kind = definition
                        .field(local)
                        .map(|f| f.kind())
                        .ok_or_else(|| {
                            mapping_error(
                                definition.name(),
                                rel.name(),
                                format!("local column '{}' does not exist", local),
                            )
                        })?;
                    let target_kind = target
                        .field(target_field)
                        .map(|f| f.kind())
                        .ok_or_else(|| {
                            mapping_error(
                                definition.name(),
                                rel.name(),
                                format!("target key '{}' does not exist", target_field),
                            )
                        })?;
                    if local_kind != target_kind {
                        return Err(mapping_error(
                            definition.name(),
                            rel.name(),
                            format!(
                                "column '{}' is {} but target key '{}' is {}",
                                local,
                                local_kind.name(),
                                target_field,
                                target_kind.name()
                            ),
                        ));
                    }
                }
            } else if rel.kind() == RelationshipKind::OneToOne {
                let owners = target
                    .relationships()
                    .iter()
                    .filter(|back| {
                        back.kind() == RelationshipKind::OneToOne
                            && back.target() == definition.name()
                            && back.is_owning()
                    })
                    .count();
                if owners != 1 {
                    return Err(mapping_error(
                        definition.name(),
                        rel.name(),
                        format!(
                            "one-to-one pair needs exactly one owning side on '{}', found {}",
                            rel.target(),
                            owners
                        ),
                    ));
                }
            }
        }
    }
    Ok(())
}
