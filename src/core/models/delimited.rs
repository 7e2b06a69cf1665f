//! Delimited text documents
//!
//! Rows become record values keyed by column name. The document's single
//! synchronizer record type receives them; failing that, its single plain
//! record type.

use super::DocumentModel;
use crate::config::schema::{CsvOptions, DocumentTypeConfig, EdiConfig, RecordModelKind};
use crate::core::documents::DocumentContext;
use crate::core::{records, synchronizer};
use crate::domain::{Attachment, AttachmentId, EdiError, Result};
use async_trait::async_trait;
use csv::{ReaderBuilder, Trim};
use globset::Glob;
use serde_json::{Map, Value};

/// Parsed rows and the column names they are keyed by
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
}

/// Parses `data` according to `options`
///
/// Configured columns map positionally; without them the header row names
/// the columns. Surplus cells are dropped and missing cells are absent.
///
/// # Errors
///
/// Returns a user error for malformed input or a non-ASCII delimiter
pub fn parse(options: &CsvOptions, data: &[u8]) -> Result<Table> {
    if !options.delimiter.is_ascii() {
        return Err(EdiError::user(format!(
            "Delimiter '{}' is not an ASCII character",
            options.delimiter
        )));
    }
    let mut reader = ReaderBuilder::new()
        .delimiter(options.delimiter as u8)
        .has_headers(options.skip_header)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(data);

    let columns: Vec<String> = if !options.columns.is_empty() {
        options.columns.clone()
    } else if options.skip_header {
        reader.headers()?.iter().map(str::to_string).collect()
    } else {
        return Err(EdiError::user("No columns configured for a file without header"));
    };

    let mut rows = Vec::new();
    for row in reader.records() {
        let row = row?;
        let values: Map<String, Value> = columns
            .iter()
            .zip(row.iter())
            .filter(|(column, _)| !column.is_empty())
            .map(|(column, cell)| (column.clone(), Value::from(cell)))
            .collect();
        rows.push(values);
    }
    Ok(Table { columns, rows })
}

/// Documents built from delimited text files
pub struct CsvModel;

#[async_trait]
impl DocumentModel for CsvModel {
    fn autotype(
        &self,
        doc_type: &DocumentTypeConfig,
        _config: &EdiConfig,
        pool: &[Attachment],
    ) -> Result<Vec<Vec<AttachmentId>>> {
        let Some(pattern) = &doc_type.csv.pattern else {
            return Ok(Vec::new());
        };
        let matcher = Glob::new(pattern)
            .map_err(|e| EdiError::Configuration(format!("Invalid pattern '{pattern}': {e}")))?
            .compile_matcher();
        Ok(pool
            .iter()
            .filter(|a| matcher.is_match(&a.name))
            .map(|a| vec![a.id])
            .collect())
    }

    async fn prepare(&self, cx: &mut DocumentContext<'_>) -> Result<()> {
        let input = cx.input().await?;
        let table = parse(&cx.doc_type.csv, &input.data)?;
        tracing::debug!(
            document = %cx.document.name,
            rows = table.rows.len(),
            "Parsed {}",
            input.name
        );

        if let Some(record_type) = cx.record_type(RecordModelKind::Sync)? {
            return synchronizer::prepare(cx, record_type, table.rows).await;
        }
        if let Some(record_type) = cx.record_type(RecordModelKind::Plain)? {
            return records::prepare_plain(cx, record_type, table.rows).await;
        }
        Err(EdiError::Configuration(format!(
            "Document type '{}' has no record type",
            cx.doc_type.name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_parse_with_header() {
        let table = parse(&CsvOptions::default(), b"name,title\nE, Dr \nF,\n").unwrap();
        assert_eq!(table.columns, vec!["name", "title"]);
        assert_eq!(
            table.rows,
            vec![
                row(json!({"name": "E", "title": "Dr"})),
                row(json!({"name": "F", "title": ""}))
            ]
        );
    }

    #[test]
    fn test_parse_positional_columns() {
        let options = CsvOptions {
            columns: vec!["name".to_string(), String::new(), "qty".to_string()],
            skip_header: false,
            delimiter: ';',
            ..Default::default()
        };
        let table = parse(&options, b"A;skipped;3\nB;x\n").unwrap();
        assert_eq!(
            table.rows,
            vec![row(json!({"name": "A", "qty": "3"})), row(json!({"name": "B"}))]
        );
    }

    #[test]
    fn test_parse_without_columns_or_header() {
        let options = CsvOptions {
            skip_header: false,
            ..Default::default()
        };
        assert!(parse(&options, b"a,b\n").unwrap_err().is_user_error());
    }

    #[test]
    fn test_non_ascii_delimiter() {
        let options = CsvOptions {
            delimiter: '§',
            ..Default::default()
        };
        assert!(parse(&options, b"a").is_err());
    }
}
