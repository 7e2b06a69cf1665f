//! Persistence
//!
//! [`Store`] and [`Session`] abstract the backing store. Two
//! implementations ship: [`MemoryStore`] and
//! [`crate::adapters::postgresql::PostgresStore`].

pub mod factory;
pub mod memory;
pub mod traits;

pub use factory::create_store;
pub use memory::MemoryStore;
pub use traits::{links_for, Savepoint, Session, Store};
