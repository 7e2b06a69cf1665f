//! Configuration management for EDI.
//!
//! EDI uses a single TOML file with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `EDI_*` environment overrides
//! - Default values for optional settings
//! - Validation of cross references (paths to document types, record types
//!   to entity kinds, and so on)
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use edi::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("edi.toml")?;
//! for gateway in config.gateways.values() {
//!     println!("{} ({})", gateway.name, gateway.connection);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Example Configuration
//!
//! ```toml
//! [options.edi]
//! production = true
//!
//! [entities.partner]
//! key = "ref"
//! required = ["ref", "name"]
//!
//! [record_types.partner]
//! target = "partner"
//! via = "ref"
//! values = { name = "full_name", title = "title" }
//!
//! [document_types.partners]
//! model = "csv"
//! record_types = ["partner"]
//! csv = { pattern = "partners*.csv", columns = ["name", "full_name", "title"] }
//!
//! [gateways.partner]
//! connection = "sftp"
//! server = "sftp.partner.example"
//! username = "edi"
//! password = "${EDI_PARTNER_PASSWORD}"
//! safety = "edi.production"
//!
//! [[gateways.partner.paths]]
//! name = "inbound"
//! path = "/outbox"
//! glob = "*.csv"
//! allow_send = false
//! ```

pub mod loader;
pub mod options;
pub mod schema;
pub mod secret;

// Re-export commonly used types
pub use loader::{load_config, parse_config};
pub use options::ConfigOptions;
pub use schema::{
    ApplicationConfig, ConnectionKind, CsvOptions, DocumentTypeConfig, EdiConfig, EntitySchema,
    ExportOptions, FieldType, GatewayConfig, LoggingConfig, LookupConfig, MailConfig, PathConfig,
    PostgreSQLConfig, RecordModelKind, RecordTypeConfig, ServerConfig, StoreBackend, StoreConfig,
    SynchronizerConfig,
};
pub use secret::{secret_string, SecretString, SecretValue};
