//! Serve command implementation

use super::open_engine;
use crate::server;
use clap::Args;
use tokio::sync::watch;

/// Arguments for the serve command
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Listen address (overrides `server.bind`)
    #[arg(short, long)]
    pub bind: Option<String>,
}

impl ServeArgs {
    /// Execute the serve command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        let edi = match open_engine(config_path).await {
            Ok(edi) => edi,
            Err(code) => return Ok(code),
        };
        let bind = self
            .bind
            .clone()
            .unwrap_or_else(|| edi.config().server.bind.clone());
        let listener = tokio::net::TcpListener::bind(&bind).await?;
        println!("🌐 RPC server listening on http://{bind}");
        server::serve(edi, listener, shutdown_signal).await?;
        Ok(0)
    }
}
