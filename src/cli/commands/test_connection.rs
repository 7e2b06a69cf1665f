//! Test-connection command implementation

use super::open_engine;
use crate::domain::EdiError;
use clap::Args;

/// Arguments for the test-connection command
#[derive(Args, Debug)]
pub struct TestConnectionArgs {
    /// Gateway name
    pub gateway: String,
}

impl TestConnectionArgs {
    /// Execute the test-connection command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let edi = match open_engine(config_path).await {
            Ok(edi) => edi,
            Err(code) => return Ok(code),
        };

        match edi.action_test(&self.gateway).await {
            Ok(()) => {
                println!("✅ Connection to {} tested successfully", self.gateway);
                Ok(0)
            }
            Err(e) => {
                println!("❌ Connection test failed");
                println!("   Error: {e}");
                Ok(if matches!(e, EdiError::Configuration(_)) { 2 } else { 1 })
            }
        }
    }
}
