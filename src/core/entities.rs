//! Validated writes to target entities
//!
//! Values are coerced to the declared field types before validation, so a
//! text feed can populate integer and boolean fields.

use crate::adapters::store::Session;
use crate::config::schema::{EdiConfig, EntitySchema};
use crate::domain::{EdiError, Entity, EntityId, Result};
use serde_json::{Map, Value};

fn schema<'a>(config: &'a EdiConfig, kind: &str) -> Result<&'a EntitySchema> {
    config
        .entity(kind)
        .ok_or_else(|| EdiError::Configuration(format!("Unknown entity kind '{kind}'")))
}

/// Coerces every value to its declared field type
pub fn coerce_fields(schema: &EntitySchema, fields: Map<String, Value>) -> Map<String, Value> {
    fields
        .into_iter()
        .map(|(field, value)| {
            let value = schema.coerce(&field, value);
            (field, value)
        })
        .collect()
}

/// Creates an entity of `kind` after checking it against its schema
///
/// # Errors
///
/// Returns [`EdiError::Validation`] if a required field is missing or a
/// value has the wrong type
pub async fn create(
    session: &mut dyn Session,
    config: &EdiConfig,
    kind: &str,
    fields: Map<String, Value>,
) -> Result<Entity> {
    let schema = schema(config, kind)?;
    let fields = coerce_fields(schema, fields);
    schema.check(&fields).map_err(EdiError::Validation)?;
    session.create_entity(kind, fields).await
}

/// Merges `fields` into an entity after checking the merged result
///
/// # Errors
///
/// Returns [`EdiError::Validation`] if the merged entity would be invalid
pub async fn update(
    session: &mut dyn Session,
    config: &EdiConfig,
    id: EntityId,
    fields: Map<String, Value>,
) -> Result<Entity> {
    let current = session.entity(id).await?;
    let schema = schema(config, &current.kind)?;
    let fields = coerce_fields(schema, fields);
    let mut merged = current.fields.clone();
    merged.extend(fields.clone());
    schema.check(&merged).map_err(EdiError::Validation)?;
    session.update_entity(id, fields).await
}
