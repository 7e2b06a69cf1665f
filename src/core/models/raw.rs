//! Raw entity import
//!
//! A file named `<kind>.csv` is loaded row by row into entities of that
//! kind, its header row naming the fields.

use super::delimited::{self, Table};
use super::DocumentModel;
use crate::config::schema::{CsvOptions, DocumentTypeConfig, EdiConfig};
use crate::core::documents::DocumentContext;
use crate::core::entities;
use crate::domain::{Attachment, AttachmentId, EdiError, NewRecord, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Record type of the per-row records a raw import leaves behind
pub const RAW_RECORD_TYPE: &str = "raw";

/// Entity kind named by a `<kind>.csv` file name
fn entity_kind<'a>(config: &'a EdiConfig, name: &str) -> Option<&'a str> {
    let stem = name.strip_suffix(".csv")?;
    config.entity(stem).map(|schema| schema.kind.as_str())
}

async fn load(cx: &mut DocumentContext<'_>) -> Result<(String, Table)> {
    let input = cx.input().await?;
    let kind = entity_kind(cx.config, &input.name)
        .ok_or_else(|| EdiError::user(format!("No entity kind for {}", input.name)))?
        .to_string();
    let table = delimited::parse(&CsvOptions::default(), &input.data)?;
    Ok((kind, table))
}

/// Imports `<kind>.csv` files into entities
pub struct RawModel;

#[async_trait]
impl DocumentModel for RawModel {
    fn autotype(
        &self,
        _doc_type: &DocumentTypeConfig,
        config: &EdiConfig,
        pool: &[Attachment],
    ) -> Result<Vec<Vec<AttachmentId>>> {
        Ok(pool
            .iter()
            .filter(|a| entity_kind(config, &a.name).is_some())
            .map(|a| vec![a.id])
            .collect())
    }

    async fn prepare(&self, cx: &mut DocumentContext<'_>) -> Result<()> {
        let (kind, table) = load(cx).await?;
        let schema = cx
            .config
            .entity(&kind)
            .ok_or_else(|| EdiError::Configuration(format!("Unknown entity kind '{kind}'")))?;
        let known = schema.known_fields();
        let unmatched: Vec<&str> = table
            .columns
            .iter()
            .map(String::as_str)
            .filter(|c| !known.contains(c))
            .collect();
        if !unmatched.is_empty() {
            return Err(EdiError::user(format!(
                "No match for headers: {}",
                unmatched.join(", ")
            )));
        }
        Ok(())
    }

    async fn execute(&self, cx: &mut DocumentContext<'_>) -> Result<()> {
        cx.execute_records().await?;
        let (kind, table) = load(cx).await?;

        let mut new_records = Vec::with_capacity(table.rows.len());
        for (index, row) in table.rows.into_iter().enumerate() {
            let fields: Map<String, Value> = row
                .into_iter()
                .filter(|(_, value)| value.as_str() != Some(""))
                .collect();
            let entity = entities::create(&mut *cx.session, cx.config, &kind, fields).await?;
            let mut values = Map::new();
            values.insert("kind".to_string(), Value::from(kind.as_str()));
            new_records.push(
                NewRecord::new(RAW_RECORD_TYPE, format!("{:05}", index + 1), values)
                    .with_target(Some(entity.id)),
            );
        }
        tracing::info!("{} imported {} {}", cx.document.name, new_records.len(), kind);
        cx.session.create_records(cx.document.id, new_records).await?;
        Ok(())
    }
}
