//! Document models
//!
//! A document type names a model; the model decides which attachments it
//! recognizes and how a document of that type is prepared and executed.
//! Models are registered by key at startup in a [`ModelRegistry`].
//!
//! - `unknown` - holds unrecognized inputs and refuses to prepare
//! - `raw` - imports `<entity kind>.csv` files straight into entities
//! - `csv` - parses delimited rows into synchronizer records
//! - `export` - writes the current entities of a kind as a CSV output

pub mod delimited;
pub mod export;
pub mod raw;
pub mod unknown;

use crate::config::schema::{DocumentTypeConfig, EdiConfig};
use crate::core::documents::DocumentContext;
use crate::domain::{Attachment, AttachmentId, EdiError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

pub use delimited::CsvModel;
pub use export::ExportModel;
pub use raw::RawModel;
pub use unknown::UnknownModel;

/// Parsing and execution strategy of a document type
#[async_trait]
pub trait DocumentModel: Send + Sync {
    /// Groups of attachments from `pool` that each form one document of `doc_type`
    ///
    /// Called in autodetection order; attachments returned here are removed
    /// from the pool before the next type is asked.
    fn autotype(
        &self,
        _doc_type: &DocumentTypeConfig,
        _config: &EdiConfig,
        _pool: &[Attachment],
    ) -> Result<Vec<Vec<AttachmentId>>> {
        Ok(Vec::new())
    }

    /// Creates the document's records from its inputs
    async fn prepare(&self, _cx: &mut DocumentContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Applies the document
    async fn execute(&self, cx: &mut DocumentContext<'_>) -> Result<()> {
        cx.execute_records().await
    }
}

/// Document models by key
#[derive(Clone)]
pub struct ModelRegistry {
    models: HashMap<String, Arc<dyn DocumentModel>>,
}

impl ModelRegistry {
    /// Registry holding the built-in models
    pub fn new() -> Self {
        let mut registry = Self {
            models: HashMap::new(),
        };
        registry.register("unknown", Arc::new(UnknownModel));
        registry.register("raw", Arc::new(RawModel));
        registry.register("csv", Arc::new(CsvModel));
        registry.register("export", Arc::new(ExportModel));
        registry
    }

    /// Adds or replaces a model
    pub fn register(&mut self, key: impl Into<String>, model: Arc<dyn DocumentModel>) {
        self.models.insert(key.into(), model);
    }

    /// # Errors
    ///
    /// Returns a configuration error for an unregistered key
    pub fn get(&self, key: &str) -> Result<Arc<dyn DocumentModel>> {
        self.models
            .get(key)
            .cloned()
            .ok_or_else(|| EdiError::Configuration(format!("Unknown document model '{key}'")))
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
