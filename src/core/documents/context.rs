//! What a document model sees while preparing or executing a document

use crate::adapters::store::Session;
use crate::config::schema::{DocumentTypeConfig, EdiConfig, RecordModelKind, RecordTypeConfig};
use crate::core::records;
use crate::domain::{Attachment, AttachmentRole, Document, EdiError, NewAttachment, Result};

/// Record types of `doc_type`, in application order
pub fn ordered_record_types<'c>(
    config: &'c EdiConfig,
    doc_type: &'c DocumentTypeConfig,
) -> Vec<&'c RecordTypeConfig> {
    let mut types: Vec<&'c RecordTypeConfig> = doc_type
        .record_types
        .iter()
        .filter_map(|name| config.record_type(name))
        .collect();
    types.sort_by(|a, b| a.sequence.cmp(&b.sequence).then_with(|| a.name.cmp(&b.name)));
    types
}

pub struct DocumentContext<'a> {
    pub config: &'a EdiConfig,
    pub session: &'a mut dyn Session,
    pub document: &'a Document,
    pub doc_type: &'a DocumentTypeConfig,
}

impl<'a> DocumentContext<'a> {
    /// Input attachments, oldest first
    ///
    /// # Errors
    ///
    /// Fails with `Missing input attachment` when there are none
    pub async fn inputs(&mut self) -> Result<Vec<Attachment>> {
        let inputs = self
            .session
            .document_attachments(self.document.id, AttachmentRole::Input)
            .await?;
        if inputs.is_empty() {
            return Err(EdiError::user("Missing input attachment"));
        }
        Ok(inputs)
    }

    /// The single input attachment
    pub async fn input(&mut self) -> Result<Attachment> {
        let mut inputs = self.inputs().await?;
        if inputs.len() > 1 {
            return Err(EdiError::user("More than one input attachment"));
        }
        Ok(inputs.remove(0))
    }

    /// Stores an output attachment on the document
    pub async fn output(&mut self, name: impl Into<String>, data: Vec<u8>) -> Result<Attachment> {
        self.session
            .create_attachment(NewAttachment::output(self.document.id, name, data))
            .await
    }

    /// Record types of the document type, in application order
    pub fn record_types(&self) -> Vec<&'a RecordTypeConfig> {
        ordered_record_types(self.config, self.doc_type)
    }

    /// The only record type of the given model, if any
    ///
    /// # Errors
    ///
    /// Fails when more than one record type has that model
    pub fn record_type(&self, model: RecordModelKind) -> Result<Option<&'a RecordTypeConfig>> {
        let matching: Vec<&'a RecordTypeConfig> = self
            .record_types()
            .into_iter()
            .filter(|t| t.model == model)
            .collect();
        match matching.as_slice() {
            [] => Ok(None),
            [single] => Ok(Some(*single)),
            many => Err(EdiError::Configuration(format!(
                "Expected singleton record model: {}",
                many.iter()
                    .map(|t| t.name.as_str())
                    .collect::<Vec<_>>()
                    .join(",")
            ))),
        }
    }

    /// Executes every record of the document, one record type at a time
    pub async fn execute_records(&mut self) -> Result<()> {
        for record_type in self.record_types() {
            records::execute(self, record_type).await?;
        }
        Ok(())
    }
}
