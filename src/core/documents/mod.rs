//! Documents
//!
//! A document moves `draft -> prep -> done`, or to `cancel` before it is
//! done. Prepare and execute run the document type's model inside a
//! savepoint, so a failure rolls back only that document and leaves an
//! issue behind instead of an error.

pub mod actions;
pub mod autodetect;
pub mod context;

pub use context::DocumentContext;
