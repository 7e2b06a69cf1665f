//! Emit command implementation
//!
//! Creates and executes input-less documents, such as exports, so that the
//! next transfer sends their outputs.

use super::{open_engine, print_documents};
use crate::domain::DocumentState;
use clap::Args;

/// Arguments for the emit command
#[derive(Args, Debug)]
pub struct EmitArgs {
    /// Document types to emit
    #[arg(required = true)]
    pub doc_types: Vec<String>,
}

impl EmitArgs {
    /// Execute the emit command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let edi = match open_engine(config_path).await {
            Ok(edi) => edi,
            Err(code) => return Ok(code),
        };
        let documents = edi.autoemit(&self.doc_types).await?;
        print_documents(&documents);
        let failed = documents.iter().any(|d| d.state != DocumentState::Done);
        Ok(if failed { 1 } else { 0 })
    }
}
