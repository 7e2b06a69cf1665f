//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for EDI using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// EDI - Electronic Data Interchange gateway
#[derive(Parser, Debug)]
#[command(name = "edi")]
#[command(version, about, long_about = None)]
#[command(author = "EDI Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "edi.toml", env = "EDI_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "EDI_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one transfer on a gateway
    Transfer(commands::transfer::TransferArgs),

    /// Check that a gateway can connect
    TestConnection(commands::test_connection::TestConnectionArgs),

    /// Upload files to a running RPC server
    Submit(commands::submit::SubmitArgs),

    /// Serve RPC transfers over HTTP
    Serve(commands::serve::ServeArgs),

    /// Import local files as documents
    Import(commands::import::ImportArgs),

    /// Prepare, execute, unprepare or cancel a document
    Document(commands::document::DocumentArgs),

    /// Create and execute documents without inputs
    Emit(commands::emit::EmitArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use commands::document::DocumentAction;

    #[test]
    fn test_cli_parse_transfer() {
        let cli = Cli::parse_from(["edi", "transfer", "inbox"]);
        assert_eq!(cli.config, "edi.toml");
        match cli.command {
            Commands::Transfer(args) => {
                assert_eq!(args.gateway, "inbox");
                assert!(!args.no_process);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_parse_with_config() {
        let cli = Cli::parse_from(["edi", "--config", "custom.toml", "validate-config"]);
        assert_eq!(cli.config, "custom.toml");
        assert!(matches!(cli.command, Commands::ValidateConfig(_)));
    }

    #[test]
    fn test_cli_parse_with_log_level() {
        let cli = Cli::parse_from(["edi", "--log-level", "debug", "test-connection", "inbox"]);
        assert_eq!(cli.log_level, Some("debug".to_string()));
        assert!(matches!(cli.command, Commands::TestConnection(_)));
    }

    #[test]
    fn test_cli_parse_submit() {
        let cli = Cli::parse_from(["edi", "submit", "-n", "-t", "orders", "-o", "/tmp", "a.csv"]);
        let Commands::Submit(args) = cli.command else {
            panic!("expected submit");
        };
        assert!(args.dummy);
        assert_eq!(args.path, "orders");
        assert_eq!(args.files.len(), 1);
        assert_eq!(args.server, "http://127.0.0.1:8069");
    }

    #[test]
    fn test_cli_parse_document() {
        let cli = Cli::parse_from(["edi", "document", "execute", "7"]);
        let Commands::Document(args) = cli.command else {
            panic!("expected document");
        };
        assert_eq!(args.action, DocumentAction::Execute);
    }

    #[test]
    fn test_cli_parse_import_conflict() {
        let result = Cli::try_parse_from(["edi", "import", "--prepare", "--execute", "a.csv"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_parse_init() {
        let cli = Cli::parse_from(["edi", "init"]);
        assert!(matches!(cli.command, Commands::Init(_)));
    }
}
