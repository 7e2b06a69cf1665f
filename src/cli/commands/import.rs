//! Import command implementation
//!
//! Stores local files as inputs and autodetects documents from them,
//! optionally processing them straight away.

use super::{open_engine, print_documents};
use crate::domain::DocumentState;
use anyhow::Context;
use clap::Args;
use std::path::PathBuf;

/// Arguments for the import command
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Input files
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Candidate document types (default: all)
    #[arg(short = 't', long = "doc-type")]
    pub doc_types: Vec<String>,

    /// Prepare the created documents
    #[arg(long, conflicts_with = "execute")]
    pub prepare: bool,

    /// Execute the created documents
    #[arg(long)]
    pub execute: bool,
}

impl ImportArgs {
    /// Execute the import command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let edi = match open_engine(config_path).await {
            Ok(edi) => edi,
            Err(code) => return Ok(code),
        };

        let mut files = Vec::with_capacity(self.files.len());
        for path in &self.files {
            let data = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            files.push((name, data));
        }

        let mut documents = edi.import(files, &self.doc_types).await?;
        let mut failed = false;
        for document in documents.iter_mut() {
            let ok = if self.execute {
                edi.action_execute(document.id).await?
            } else if self.prepare {
                edi.action_prepare(document.id).await?
            } else {
                true
            };
            failed |= !ok;
            *document = edi.document(document.id).await?;
        }

        println!("📥 Imported {} document(s)", documents.len());
        print_documents(&documents);
        if failed || documents.iter().any(|d| d.state == DocumentState::Cancel) {
            return Ok(1);
        }
        Ok(0)
    }
}
