//! PostgreSQL store
//!
//! Connection pooling with `deadpool-postgres`, explicit transactions with
//! savepoints, and advisory locks for gateway serialization.

pub mod client;
pub mod models;
pub mod session;

pub use client::PostgresStore;
pub use session::PostgresSession;
