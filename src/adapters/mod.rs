//! External system integrations for EDI.
//!
//! - [`store`] - persistence collaborator (trait-based, memory and PostgreSQL)
//! - [`postgresql`] - PostgreSQL implementation of the store
//! - [`connection`] - transports used by gateways
//! - [`mailer`] - outbound mail delivery
//!
//! # Design Pattern
//!
//! Adapters isolate external dependencies behind traits so the core can be
//! exercised against in-memory implementations.
//!
//! ```rust,no_run
//! use edi::adapters::store::{create_store, Session, Store};
//! use edi::config::StoreConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = create_store(&StoreConfig::default()).await?;
//! let session = store.begin().await?;
//! session.commit().await?;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod mailer;
pub mod postgresql;
pub mod store;
