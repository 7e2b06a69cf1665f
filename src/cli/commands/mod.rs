//! CLI command implementations

pub mod document;
pub mod emit;
pub mod import;
pub mod init;
pub mod serve;
pub mod submit;
pub mod test_connection;
pub mod transfer;
pub mod validate;

use crate::config::load_config;
use crate::core::Edi;
use crate::domain::{Document, Issue};

/// Loads the configuration and opens the engine
///
/// On failure the error is printed and the exit code to stop with is
/// returned: 2 for configuration errors, 5 when the store cannot be opened.
pub(crate) async fn open_engine(config_path: &str) -> Result<Edi, i32> {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("❌ Failed to load configuration file");
            println!("   Error: {e}");
            return Err(2);
        }
    };
    match Edi::from_config(config).await {
        Ok(edi) => Ok(edi),
        Err(e) => {
            println!("❌ Failed to open the store");
            println!("   Error: {e}");
            Err(5)
        }
    }
}

pub(crate) fn print_documents(documents: &[Document]) {
    for document in documents {
        println!(
            "  {} ({}, {})",
            document.name,
            document.doc_type,
            document.state.display_name()
        );
    }
}

pub(crate) fn print_issues(issues: &[Issue]) {
    for issue in issues {
        println!("  ⚠️  {}", issue.title);
    }
}
