//! Store abstraction traits
//!
//! The core never talks to a database directly. It opens a [`Session`]
//! (one transaction) from a [`Store`], does its work through it, and commits.
//! Savepoints inside a session bound the effect of a failing document action.

use crate::domain::{
    Attachment, AttachmentId, AttachmentRole, AuditEntry, Document, DocumentId, Entity, EntityId,
    Issue, IssueLinks, MailRecord, NewAttachment, NewDocument, NewIssue, NewMailRecord, NewRecord,
    NewTransfer, Record, Result, Subject, Transfer, TransferId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Checkpoint handle returned by [`Session::savepoint`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Savepoint(pub u32);

/// Backing store for documents, attachments, transfers and target entities
#[async_trait]
pub trait Store: Send + Sync {
    /// Opens a new transaction
    async fn begin(&self) -> Result<Box<dyn Session>>;

    /// Test the store connection
    async fn test_connection(&self) -> Result<()>;

    /// Create tables if they don't exist
    async fn ensure_schema(&self) -> Result<()>;

    /// Human-readable description, safe to log
    fn describe(&self) -> String;
}

/// One transaction against the store
///
/// Dropping a session without calling [`Session::commit`] rolls it back.
#[async_trait]
pub trait Session: Send {
    // Transaction control

    async fn savepoint(&mut self) -> Result<Savepoint>;

    async fn release(&mut self, savepoint: Savepoint) -> Result<()>;

    /// Undo everything written since `savepoint`, keeping the session open
    async fn rollback_to(&mut self, savepoint: Savepoint) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;

    /// Number of store operations issued so far, for statistics
    fn query_count(&self) -> u64;

    // Locks and sequences

    /// Serializes transfers on one gateway until the session ends
    ///
    /// Also records `transfer` as the gateway's last transfer.
    async fn lock_gateway(&mut self, gateway: &str, transfer: TransferId) -> Result<()>;

    /// Serializes actions on one document until the session ends
    async fn lock_document(&mut self, id: DocumentId) -> Result<()>;

    /// Next value of a named sequence, starting at 1
    async fn next_sequence(&mut self, name: &str) -> Result<i64>;

    // Attachments

    /// Stores an attachment, computing its checksum
    async fn create_attachment(&mut self, attachment: NewAttachment) -> Result<Attachment>;

    /// Attachments by id, in the order given; unknown ids are skipped
    async fn attachments(&mut self, ids: &[AttachmentId]) -> Result<Vec<Attachment>>;

    /// Moves attachments under a document
    async fn attach(&mut self, ids: &[AttachmentId], document: DocumentId) -> Result<()>;

    /// Whether an input attachment with this name and size already exists
    async fn input_exists(&mut self, name: &str, size: usize) -> Result<bool>;

    /// A document's attachments of one role, ordered by id
    async fn document_attachments(
        &mut self,
        document: DocumentId,
        role: AttachmentRole,
    ) -> Result<Vec<Attachment>>;

    // Documents

    async fn create_document(&mut self, document: NewDocument) -> Result<Document>;

    /// # Errors
    ///
    /// Returns [`crate::domain::EdiError::NotFound`] for an unknown id.
    async fn document(&mut self, id: DocumentId) -> Result<Document>;

    async fn update_document(&mut self, document: &Document) -> Result<()>;

    /// Documents created by a transfer, ordered by id
    async fn transfer_documents(&mut self, transfer: TransferId) -> Result<Vec<Document>>;

    /// Documents executed at or after `since`, restricted to `doc_types` unless empty
    async fn executed_documents(
        &mut self,
        since: DateTime<Utc>,
        doc_types: &[String],
    ) -> Result<Vec<Document>>;

    // Records

    async fn create_records(
        &mut self,
        document: DocumentId,
        records: Vec<NewRecord>,
    ) -> Result<Vec<Record>>;

    /// Records of one type, ordered by id
    async fn records(&mut self, document: DocumentId, record_type: &str) -> Result<Vec<Record>>;

    async fn update_record(&mut self, record: &Record) -> Result<()>;

    async fn delete_records(&mut self, document: DocumentId, record_type: &str) -> Result<u64>;

    // Transfers

    /// Creates a transfer named from the `transfer` sequence
    async fn create_transfer(&mut self, transfer: NewTransfer) -> Result<Transfer>;

    async fn transfer(&mut self, id: TransferId) -> Result<Transfer>;

    async fn add_transfer_attachments(
        &mut self,
        transfer: TransferId,
        role: AttachmentRole,
        ids: &[AttachmentId],
    ) -> Result<()>;

    /// Outputs sent by any transfer of `gateway`, optionally only transfers since a date
    async fn sent_outputs(
        &mut self,
        gateway: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<HashSet<AttachmentId>>;

    // Issues and audit trail

    async fn create_issue(&mut self, issue: NewIssue) -> Result<Issue>;

    /// Issues linked to `subject`, ordered by id
    async fn issues(&mut self, subject: &Subject, open_only: bool) -> Result<Vec<Issue>>;

    /// Closes open issues raised on `subject`, returning how many were closed
    async fn close_issues(&mut self, subject: &Subject) -> Result<u64>;

    async fn create_audit(
        &mut self,
        subject: &Subject,
        body: &str,
        attachments: &[AttachmentId],
    ) -> Result<()>;

    async fn audits(&mut self, subject: &Subject) -> Result<Vec<AuditEntry>>;

    // Target entities

    /// Entities of `kind` whose `field` renders as one of `keys` and that match `filter`
    async fn find_entities(
        &mut self,
        kind: &str,
        field: &str,
        keys: &[String],
        filter: &Map<String, Value>,
    ) -> Result<Vec<Entity>>;

    /// All entities of `kind` matching `filter`, ordered by id
    async fn search_entities(&mut self, kind: &str, filter: &Map<String, Value>)
        -> Result<Vec<Entity>>;

    async fn entity(&mut self, id: EntityId) -> Result<Entity>;

    async fn create_entity(&mut self, kind: &str, fields: Map<String, Value>) -> Result<Entity>;

    /// Merges `fields` into an existing entity
    async fn update_entity(&mut self, id: EntityId, fields: Map<String, Value>) -> Result<Entity>;

    // Sent mail

    async fn record_mail(&mut self, mail: NewMailRecord) -> Result<MailRecord>;

    /// Mails sent through one gateway path since a date
    async fn mails_since(
        &mut self,
        gateway: &str,
        path: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<MailRecord>>;
}

/// Links an issue for a subject would carry when raised outside a transfer
pub fn links_for(subject: &Subject) -> IssueLinks {
    let mut links = IssueLinks::default();
    match subject {
        Subject::Document(id) => links.document = Some(*id),
        Subject::Gateway(name) => links.gateway = Some(name.clone()),
        Subject::Transfer(id) => links.transfer = Some(*id),
    }
    links
}
