//! Transfer command implementation
//!
//! Runs one transfer on a gateway, as a scheduler would.

use super::{open_engine, print_documents, print_issues};
use clap::Args;

/// Arguments for the transfer command
#[derive(Args, Debug)]
pub struct TransferArgs {
    /// Gateway name
    pub gateway: String,

    /// Receive and send only; leave received documents unprocessed
    #[arg(long)]
    pub no_process: bool,
}

impl TransferArgs {
    /// Execute the transfer command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(gateway = %self.gateway, "Starting transfer command");
        let edi = match open_engine(config_path).await {
            Ok(edi) => edi,
            Err(code) => return Ok(code),
        };

        let allow_process = self.no_process.then_some(false);
        let report = edi.do_transfer(&self.gateway, None, allow_process).await?;

        println!("📦 {} on {}", report.transfer.name, self.gateway);
        println!("  Received: {}", report.transfer.input_ids.len());
        println!("  Sent: {}", report.transfer.output_ids.len());
        if !report.documents.is_empty() {
            println!("Documents:");
            print_documents(&report.documents);
        }
        if report.is_success() {
            println!("✅ Transfer complete");
            Ok(0)
        } else {
            println!("Issues:");
            print_issues(&report.issues);
            Ok(1)
        }
    }
}
