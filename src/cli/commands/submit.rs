//! Submit command implementation
//!
//! Client for a running RPC server: uploads local files to one path of an
//! RPC gateway and saves the files the server hands back for that path.

use crate::adapters::connection::RpcFile;
use crate::core::{RpcRequest, RpcResponse};
use anyhow::Context;
use clap::Args;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Arguments for the submit command
#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Files to upload
    pub files: Vec<PathBuf>,

    /// RPC server base URL
    #[arg(short, long, default_value = "http://127.0.0.1:8069", env = "EDI_SERVER_URL")]
    pub server: String,

    /// Gateway name (default: the server's default gateway)
    #[arg(short, long)]
    pub gateway: Option<String>,

    /// Path locator on the gateway
    #[arg(short = 't', long = "path", default_value = "files")]
    pub path: String,

    /// Directory for returned files
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Receive only; do not process the created documents
    #[arg(short = 'n', long)]
    pub dummy: bool,

    /// Print created documents
    #[arg(short, long)]
    pub verbose: bool,
}

impl SubmitArgs {
    fn url(&self) -> String {
        let base = self.server.trim_end_matches('/');
        match &self.gateway {
            Some(gateway) => format!("{base}/gateways/{gateway}/transfer"),
            None => format!("{base}/transfer"),
        }
    }

    fn request(&self) -> anyhow::Result<RpcRequest> {
        let mut files = Vec::with_capacity(self.files.len());
        for path in &self.files {
            let data = std::fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            files.push(RpcFile::new(name, &data));
        }
        Ok(RpcRequest {
            paths: HashMap::from([(self.path.clone(), files)]),
            allow_process: Some(!self.dummy),
        })
    }

    /// Execute the submit command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        let request = self.request()?;
        let url = self.url();
        tracing::info!(url = %url, files = self.files.len(), "Submitting files");

        let response = reqwest::Client::new()
            .post(&url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to reach {url}"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            println!("❌ Server returned {status}");
            println!("   {body}");
            return Ok(if status.is_client_error() { 2 } else { 5 });
        }
        let response: RpcResponse = response.json().await?;

        if self.verbose {
            for doc in &response.docs {
                println!("  {} ({})", doc.name, doc.state.display_name());
            }
        }

        if let Some(files) = response.paths.get(&self.path) {
            for file in files {
                save(&self.output, file)?;
                println!("📄 {}", file.name);
            }
        }

        if response.errors.is_empty() {
            return Ok(0);
        }
        println!("❌ Transfer reported errors:");
        for issue in &response.errors {
            println!("  ⚠️  {}", issue.name);
        }
        Ok(1)
    }
}

/// Writes a returned file, refusing to replace an existing one
fn save(dir: &Path, file: &RpcFile) -> anyhow::Result<()> {
    let name = Path::new(&file.name)
        .file_name()
        .with_context(|| format!("Invalid file name '{}'", file.name))?;
    let dest = dir.join(name);
    let data = file.decode()?;
    let mut out = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&dest)
        .with_context(|| format!("Failed to create {}", dest.display()))?;
    out.write_all(&data)?;
    Ok(())
}
