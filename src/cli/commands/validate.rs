//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the EDI configuration file.

use crate::config::load_config;
use crate::config::schema::StoreBackend;
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        // The loader validates after parsing
        let config = match load_config(config_path) {
            Ok(c) => {
                println!("✅ Configuration is valid");
                c
            }
            Err(e) => {
                println!("❌ Configuration validation failed");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        println!();
        println!("Configuration Summary:");
        println!("  Log Level: {}", config.application.log_level);
        match config.store.backend {
            StoreBackend::Memory => println!("  Store: memory (not persistent)"),
            StoreBackend::PostgreSQL => {
                if let Some(ref pg_config) = config.store.postgresql {
                    use secrecy::ExposeSecret;
                    println!(
                        "  Store: PostgreSQL {}",
                        pg_config
                            .connection_string
                            .expose_secret()
                            .as_str()
                            .split('@')
                            .next_back()
                            .unwrap_or("***")
                    );
                }
            }
        }
        println!("  RPC Server: {}", config.server.bind);
        println!("  Entity Kinds: {}", config.entities.len());
        println!("  Record Types: {}", config.record_types.len());
        println!("  Document Types: {}", config.document_types.len());
        for gateway in config.gateways.values() {
            let safety = gateway.safety.as_deref().unwrap_or("none");
            println!(
                "  Gateway {}: {} ({} paths, safety {})",
                gateway.name,
                gateway.connection,
                gateway.paths.len(),
                safety
            );
        }
        println!();
        Ok(0)
    }
}
