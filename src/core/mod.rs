//! Core business logic for EDI.
//!
//! # Modules
//!
//! - [`engine`] - the [`Edi`] engine tying configuration, store, models and connections together
//! - [`documents`] - document state machine and autodetection
//! - [`models`] - document model registry and the built-in models
//! - [`synchronizer`] - reconciliation of records against target entities
//! - [`records`] - records and lookup resolution
//! - [`transfer`] - gateway transfers
//! - [`rpc`] - the RPC entry point
//! - [`compare`], [`batch`], [`issues`], [`entities`] - supporting utilities
//!
//! # Transfer Workflow
//!
//! 1. **Lock**: create the transfer and take the gateway lock
//! 2. **Safety**: check the gateway's safety option
//! 3. **Receive**: fetch new inputs on every receive path
//! 4. **Autodetect**: turn inputs into documents
//! 5. **Process**: prepare and execute each document in its own savepoint
//! 6. **Send**: deliver eligible outputs on every send path
//!
//! # Example
//!
//! ```rust,no_run
//! use edi::config::load_config;
//! use edi::core::Edi;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("edi.toml")?;
//! let edi = Edi::from_config(config).await?;
//!
//! let report = edi.do_transfer("partner", None, None).await?;
//! println!("Documents: {}", report.documents.len());
//! println!("Issues: {}", report.issues.len());
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod compare;
pub mod documents;
pub mod engine;
pub mod entities;
pub mod issues;
pub mod models;
pub mod records;
pub mod rpc;
pub mod synchronizer;
pub mod transfer;

pub use documents::DocumentContext;
pub use engine::Edi;
pub use models::{DocumentModel, ModelRegistry};
pub use rpc::{RpcRequest, RpcResponse};
pub use transfer::TransferReport;
