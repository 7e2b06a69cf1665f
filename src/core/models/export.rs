//! Entity export
//!
//! Writes one CSV output listing the current entities of a kind. Export
//! documents have no inputs; they are emitted and then sent.

use super::DocumentModel;
use crate::core::documents::DocumentContext;
use crate::domain::{EdiError, Entity, Result};
use async_trait::async_trait;
use csv::WriterBuilder;
use serde_json::{Map, Value};

/// Text of one CSV cell
fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render(fields: &[String], entities: &[Entity]) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(fields)?;
    for entity in entities {
        writer.write_record(fields.iter().map(|f| cell(entity.get(f))))?;
    }
    writer
        .into_inner()
        .map_err(|e| EdiError::Other(format!("Cannot finish export: {e}")))
}

/// Exports entities as CSV
pub struct ExportModel;

#[async_trait]
impl DocumentModel for ExportModel {
    async fn execute(&self, cx: &mut DocumentContext<'_>) -> Result<()> {
        cx.execute_records().await?;
        let options = cx.doc_type.export.as_ref().ok_or_else(|| {
            EdiError::Configuration(format!(
                "Document type '{}' has no [export] table",
                cx.doc_type.name
            ))
        })?;
        let schema = cx.config.entity(&options.kind).ok_or_else(|| {
            EdiError::Configuration(format!("Unknown entity kind '{}'", options.kind))
        })?;

        let fields: Vec<String> = if options.fields.is_empty() {
            std::iter::once(schema.key.clone())
                .chain(schema.fields.keys().filter(|f| **f != schema.key).cloned())
                .collect()
        } else {
            options.fields.clone()
        };
        let entities = cx.session.search_entities(&options.kind, &Map::new()).await?;
        let data = render(&fields, &entities)?;
        let name = options
            .filename
            .clone()
            .unwrap_or_else(|| format!("{}.csv", options.kind));
        tracing::info!(
            "{} exported {} {} to {}",
            cx.document.name,
            entities.len(),
            options.kind,
            name
        );
        cx.output(name, data).await?;
        Ok(())
    }
}
