//! Domain models and types for EDI.
//!
//! The domain layer holds plain data: strongly-typed row identifiers, the
//! error type, and the rows the store persists (attachments, documents,
//! records, transfers, issues, entities). Behaviour lives in [`crate::core`].
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, EdiError>`]:
//!
//! ```rust
//! use edi::domain::{EdiError, Result};
//!
//! fn example() -> Result<()> {
//!     Err(EdiError::user("File size mismatch (expected 10 got 8)"))
//! }
//! ```

pub mod attachment;
pub mod document;
pub mod entity;
pub mod errors;
pub mod ids;
pub mod issue;
pub mod result;
pub mod transfer;

// Re-export commonly used types for convenience
pub use attachment::{Attachment, AttachmentRole, AttachmentSnapshot, NewAttachment};
pub use document::{Document, DocumentState, NewDocument, NewRecord, Record};
pub use entity::Entity;
pub use errors::EdiError;
pub use ids::{AttachmentId, DocumentId, EntityId, IssueId, MailId, RecordId, TransferId};
pub use issue::{AuditEntry, Issue, IssueLinks, NewIssue, Subject};
pub use result::Result;
pub use transfer::{MailRecord, NewMailRecord, NewTransfer, Transfer};
