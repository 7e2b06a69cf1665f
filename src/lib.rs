// EDI - Electronic Data Interchange gateway
// Copyright (c) 2025 EDI Contributors
// Licensed under the MIT License

//! # EDI - Electronic Data Interchange gateway
//!
//! EDI moves business documents between this system and trading partners.
//! Files arrive over a gateway (local directories, SFTP, or HTTP RPC), are
//! recognised as typed documents, and are applied to target entities; the
//! documents produced in return leave through the same gateways.
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Transfers, documents, document models and the synchronizer
//! - [`adapters`] - Store sessions, gateway connections and mail delivery
//! - [`server`] - HTTP entry point for RPC transfers
//! - [`domain`] - Identifiers, rows and the error type
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging and observability
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edi::config::load_config;
//! use edi::core::Edi;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("edi.toml")?;
//!     let edi = Edi::from_config(config).await?;
//!
//!     let report = edi.do_transfer("inbox", None, None).await?;
//!     println!(
//!         "{}: {} documents, {} issues",
//!         report.transfer.name,
//!         report.documents.len(),
//!         report.issues.len()
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Documents
//!
//! Documents move through `Draft -> Prep -> Done`, or to `Cancel`. Each
//! step runs inside a savepoint: a failure rolls the document's work back
//! and leaves an open issue on it instead of failing the caller.
//!
//! ```rust,no_run
//! use edi::core::Edi;
//! use edi::domain::DocumentId;
//!
//! # async fn example(edi: &Edi, id: DocumentId) -> Result<(), Box<dyn std::error::Error>> {
//! if !edi.action_execute(id).await? {
//!     println!("{} needs attention", edi.document(id).await?.name);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`domain::Result`], whose error type
//! [`domain::EdiError`] separates user errors (bad input, shown to the
//! operator) from unexpected failures (logged with a trace).
//!
//! ## Logging
//!
//! EDI uses structured logging with the `tracing` crate:
//!
//! ```rust,no_run
//! use tracing::{info, warn};
//!
//! info!(gateway = "inbox", "Starting transfer");
//! warn!(document = "PARTNERS/00001", "Nothing to synchronize");
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
pub mod server;
