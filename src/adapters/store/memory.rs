//! In-memory store
//!
//! Tables live behind a shared mutex. Sessions write straight into them and
//! keep an undo log of compensating writes, so rolling back to a savepoint
//! restores exactly what was overwritten and deletes what was created since.
//! Locks are per-key async mutexes held until the session ends.
//!
//! Suitable for tests, demos and single-process deployments.

use super::traits::{Savepoint, Session, Store};
use crate::domain::attachment::checksum;
use crate::domain::{
    Attachment, AttachmentId, AttachmentRole, AttachmentSnapshot, AuditEntry, Document,
    DocumentId, DocumentState, EdiError, Entity, EntityId, Issue, IssueId, MailId, MailRecord,
    NewAttachment, NewDocument, NewIssue, NewMailRecord, NewRecord, NewTransfer, Record,
    RecordId, Result, Subject, Transfer, TransferId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OwnedMutexGuard;

#[derive(Debug, Default)]
struct Tables {
    next_id: i64,
    sequences: HashMap<String, i64>,
    gateways: HashMap<String, TransferId>,
    attachments: BTreeMap<AttachmentId, Attachment>,
    documents: BTreeMap<DocumentId, Document>,
    records: BTreeMap<RecordId, Record>,
    transfers: BTreeMap<TransferId, Transfer>,
    issues: BTreeMap<IssueId, Issue>,
    audits: BTreeMap<i64, AuditEntry>,
    entities: BTreeMap<EntityId, Entity>,
    mails: BTreeMap<MailId, MailRecord>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// A compensating write: the previous row, or `None` if the row was created
#[derive(Debug)]
enum Undo {
    Sequence(String, Option<i64>),
    Gateway(String, Option<TransferId>),
    Attachment(AttachmentId, Option<Attachment>),
    Document(DocumentId, Option<Document>),
    Record(RecordId, Option<Record>),
    Transfer(TransferId, Option<Transfer>),
    Issue(IssueId, Option<Issue>),
    Audit(i64),
    Entity(EntityId, Option<Entity>),
    Mail(MailId, Option<MailRecord>),
}

fn restore<K: Ord, V>(map: &mut BTreeMap<K, V>, key: K, previous: Option<V>) {
    match previous {
        Some(row) => {
            map.insert(key, row);
        }
        None => {
            map.remove(&key);
        }
    }
}

impl Undo {
    fn revert(self, tables: &mut Tables) {
        match self {
            Undo::Sequence(name, previous) => match previous {
                Some(value) => {
                    tables.sequences.insert(name, value);
                }
                None => {
                    tables.sequences.remove(&name);
                }
            },
            Undo::Gateway(name, previous) => match previous {
                Some(value) => {
                    tables.gateways.insert(name, value);
                }
                None => {
                    tables.gateways.remove(&name);
                }
            },
            Undo::Attachment(id, previous) => restore(&mut tables.attachments, id, previous),
            Undo::Document(id, previous) => restore(&mut tables.documents, id, previous),
            Undo::Record(id, previous) => restore(&mut tables.records, id, previous),
            Undo::Transfer(id, previous) => restore(&mut tables.transfers, id, previous),
            Undo::Issue(id, previous) => restore(&mut tables.issues, id, previous),
            Undo::Audit(id) => {
                tables.audits.remove(&id);
            }
            Undo::Entity(id, previous) => restore(&mut tables.entities, id, previous),
            Undo::Mail(id, previous) => restore(&mut tables.mails, id, previous),
        }
    }
}

type LockTable = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

fn lock_tables(tables: &Mutex<Tables>) -> Result<MutexGuard<'_, Tables>> {
    tables
        .lock()
        .map_err(|_| EdiError::Store("Memory store mutex poisoned".to_string()))
}

/// Shared in-memory store
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    locks: Arc<LockTable>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn Session>> {
        Ok(Box::new(MemorySession {
            tables: Arc::clone(&self.tables),
            locks: Arc::clone(&self.locks),
            held: HashMap::new(),
            undo: Vec::new(),
            marks: Vec::new(),
            queries: 0,
            finished: false,
        }))
    }

    async fn test_connection(&self) -> Result<()> {
        lock_tables(&self.tables).map(|_| ())
    }

    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// A transaction on a [`MemoryStore`]
pub struct MemorySession {
    tables: Arc<Mutex<Tables>>,
    locks: Arc<LockTable>,
    held: HashMap<String, OwnedMutexGuard<()>>,
    undo: Vec<Undo>,
    marks: Vec<usize>,
    queries: u64,
    finished: bool,
}

impl MemorySession {
    fn undo_to(&mut self, mark: usize) -> Result<()> {
        let mut tables = lock_tables(&self.tables)?;
        while self.undo.len() > mark {
            if let Some(entry) = self.undo.pop() {
                entry.revert(&mut tables);
            }
        }
        Ok(())
    }

    async fn acquire(&mut self, key: String) -> Result<()> {
        if self.held.contains_key(&key) {
            return Ok(());
        }
        let mutex = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|_| EdiError::Store("Memory lock table poisoned".to_string()))?;
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        let guard = mutex.lock_owned().await;
        self.held.insert(key, guard);
        Ok(())
    }

    /// Releases held locks and forgets the ones nobody else is waiting on
    fn release_locks(&mut self) {
        if self.held.is_empty() {
            return;
        }
        let keys: Vec<String> = self.held.drain().map(|(key, _guard)| key).collect();
        if let Ok(mut locks) = self.locks.lock() {
            for key in keys {
                if locks.get(&key).is_some_and(|m| Arc::strong_count(m) == 1) {
                    locks.remove(&key);
                }
            }
        }
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        if !self.finished {
            if let Ok(mut tables) = self.tables.lock() {
                while let Some(entry) = self.undo.pop() {
                    entry.revert(&mut tables);
                }
            }
        }
        self.release_locks();
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn savepoint(&mut self) -> Result<Savepoint> {
        self.marks.push(self.undo.len());
        Ok(Savepoint((self.marks.len() - 1) as u32))
    }

    async fn release(&mut self, savepoint: Savepoint) -> Result<()> {
        self.marks.truncate(savepoint.0 as usize);
        Ok(())
    }

    async fn rollback_to(&mut self, savepoint: Savepoint) -> Result<()> {
        let index = savepoint.0 as usize;
        let mark = *self
            .marks
            .get(index)
            .ok_or_else(|| EdiError::Store(format!("Unknown savepoint {}", savepoint.0)))?;
        self.undo_to(mark)?;
        self.marks.truncate(index + 1);
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        self.undo.clear();
        self.finished = true;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        self.undo_to(0)?;
        self.finished = true;
        Ok(())
    }

    fn query_count(&self) -> u64 {
        self.queries
    }

    async fn lock_gateway(&mut self, gateway: &str, transfer: TransferId) -> Result<()> {
        self.queries += 1;
        self.acquire(format!("gateway:{gateway}")).await?;
        let mut tables = lock_tables(&self.tables)?;
        let previous = tables.gateways.insert(gateway.to_string(), transfer);
        self.undo.push(Undo::Gateway(gateway.to_string(), previous));
        Ok(())
    }

    async fn lock_document(&mut self, id: DocumentId) -> Result<()> {
        self.queries += 1;
        self.acquire(format!("document:{id}")).await
    }

    async fn next_sequence(&mut self, name: &str) -> Result<i64> {
        self.queries += 1;
        let mut tables = lock_tables(&self.tables)?;
        let previous = tables.sequences.get(name).copied();
        let value = previous.unwrap_or(0) + 1;
        tables.sequences.insert(name.to_string(), value);
        self.undo.push(Undo::Sequence(name.to_string(), previous));
        Ok(value)
    }

    async fn create_attachment(&mut self, attachment: NewAttachment) -> Result<Attachment> {
        self.queries += 1;
        let mut tables = lock_tables(&self.tables)?;
        let id = AttachmentId::new(tables.next_id());
        let row = Attachment {
            id,
            checksum: checksum(&attachment.data),
            name: attachment.name,
            role: attachment.role,
            document: attachment.document,
            data: attachment.data,
            created_at: Utc::now(),
        };
        tables.attachments.insert(id, row.clone());
        self.undo.push(Undo::Attachment(id, None));
        Ok(row)
    }

    async fn attachments(&mut self, ids: &[AttachmentId]) -> Result<Vec<Attachment>> {
        self.queries += 1;
        let tables = lock_tables(&self.tables)?;
        Ok(ids
            .iter()
            .filter_map(|id| tables.attachments.get(id).cloned())
            .collect())
    }

    async fn attach(&mut self, ids: &[AttachmentId], document: DocumentId) -> Result<()> {
        self.queries += 1;
        let mut tables = lock_tables(&self.tables)?;
        for id in ids {
            if let Some(row) = tables.attachments.get_mut(id) {
                let previous = row.clone();
                row.document = Some(document);
                self.undo.push(Undo::Attachment(*id, Some(previous)));
            }
        }
        Ok(())
    }

    async fn input_exists(&mut self, name: &str, size: usize) -> Result<bool> {
        self.queries += 1;
        let tables = lock_tables(&self.tables)?;
        Ok(tables
            .attachments
            .values()
            .any(|a| a.role == AttachmentRole::Input && a.name == name && a.size() == size))
    }

    async fn document_attachments(
        &mut self,
        document: DocumentId,
        role: AttachmentRole,
    ) -> Result<Vec<Attachment>> {
        self.queries += 1;
        let tables = lock_tables(&self.tables)?;
        Ok(tables
            .attachments
            .values()
            .filter(|a| a.document == Some(document) && a.role == role)
            .cloned()
            .collect())
    }

    async fn create_document(&mut self, document: NewDocument) -> Result<Document> {
        self.queries += 1;
        let mut tables = lock_tables(&self.tables)?;
        let id = DocumentId::new(tables.next_id());
        let row = Document {
            id,
            name: document.name,
            doc_type: document.doc_type,
            state: DocumentState::Draft,
            prepare_date: None,
            execute_date: None,
            transfer: document.transfer,
            gateway: document.gateway,
            created_at: Utc::now(),
        };
        tables.documents.insert(id, row.clone());
        self.undo.push(Undo::Document(id, None));
        Ok(row)
    }

    async fn document(&mut self, id: DocumentId) -> Result<Document> {
        self.queries += 1;
        let tables = lock_tables(&self.tables)?;
        tables
            .documents
            .get(&id)
            .cloned()
            .ok_or_else(|| EdiError::NotFound(format!("document {id}")))
    }

    async fn update_document(&mut self, document: &Document) -> Result<()> {
        self.queries += 1;
        let mut tables = lock_tables(&self.tables)?;
        let previous = tables.documents.insert(document.id, document.clone());
        if previous.is_none() {
            tables.documents.remove(&document.id);
            return Err(EdiError::NotFound(format!("document {}", document.id)));
        }
        self.undo.push(Undo::Document(document.id, previous));
        Ok(())
    }

    async fn transfer_documents(&mut self, transfer: TransferId) -> Result<Vec<Document>> {
        self.queries += 1;
        let tables = lock_tables(&self.tables)?;
        Ok(tables
            .documents
            .values()
            .filter(|d| d.transfer == Some(transfer))
            .cloned()
            .collect())
    }

    async fn executed_documents(
        &mut self,
        since: DateTime<Utc>,
        doc_types: &[String],
    ) -> Result<Vec<Document>> {
        self.queries += 1;
        let tables = lock_tables(&self.tables)?;
        Ok(tables
            .documents
            .values()
            .filter(|d| d.state == DocumentState::Done)
            .filter(|d| d.execute_date.is_some_and(|date| date >= since))
            .filter(|d| doc_types.is_empty() || doc_types.contains(&d.doc_type))
            .cloned()
            .collect())
    }

    async fn create_records(
        &mut self,
        document: DocumentId,
        records: Vec<NewRecord>,
    ) -> Result<Vec<Record>> {
        self.queries += 1;
        let mut tables = lock_tables(&self.tables)?;
        let mut created = Vec::with_capacity(records.len());
        for record in records {
            let id = RecordId::new(tables.next_id());
            let row = Record {
                id,
                document,
                record_type: record.record_type,
                name: record.name,
                target: record.target,
                values: record.values,
                deactivate: record.deactivate,
                error: None,
            };
            tables.records.insert(id, row.clone());
            self.undo.push(Undo::Record(id, None));
            created.push(row);
        }
        Ok(created)
    }

    async fn records(&mut self, document: DocumentId, record_type: &str) -> Result<Vec<Record>> {
        self.queries += 1;
        let tables = lock_tables(&self.tables)?;
        Ok(tables
            .records
            .values()
            .filter(|r| r.document == document && r.record_type == record_type)
            .cloned()
            .collect())
    }

    async fn update_record(&mut self, record: &Record) -> Result<()> {
        self.queries += 1;
        let mut tables = lock_tables(&self.tables)?;
        let previous = tables.records.insert(record.id, record.clone());
        if previous.is_none() {
            tables.records.remove(&record.id);
            return Err(EdiError::NotFound(format!("record {}", record.id)));
        }
        self.undo.push(Undo::Record(record.id, previous));
        Ok(())
    }

    async fn delete_records(&mut self, document: DocumentId, record_type: &str) -> Result<u64> {
        self.queries += 1;
        let mut tables = lock_tables(&self.tables)?;
        let ids: Vec<RecordId> = tables
            .records
            .values()
            .filter(|r| r.document == document && r.record_type == record_type)
            .map(|r| r.id)
            .collect();
        for id in &ids {
            let previous = tables.records.remove(id);
            self.undo.push(Undo::Record(*id, previous));
        }
        Ok(ids.len() as u64)
    }

    async fn create_transfer(&mut self, transfer: NewTransfer) -> Result<Transfer> {
        let sequence = self.next_sequence("transfer").await?;
        self.queries += 1;
        let mut tables = lock_tables(&self.tables)?;
        let id = TransferId::new(tables.next_id());
        let row = Transfer {
            id,
            name: format!("TRANSFER/{sequence:05}"),
            gateway: transfer.gateway,
            allow_receive: transfer.allow_receive,
            allow_process: transfer.allow_process,
            allow_send: transfer.allow_send,
            created_at: Utc::now(),
            input_ids: Vec::new(),
            output_ids: Vec::new(),
        };
        tables.transfers.insert(id, row.clone());
        self.undo.push(Undo::Transfer(id, None));
        Ok(row)
    }

    async fn transfer(&mut self, id: TransferId) -> Result<Transfer> {
        self.queries += 1;
        let tables = lock_tables(&self.tables)?;
        tables
            .transfers
            .get(&id)
            .cloned()
            .ok_or_else(|| EdiError::NotFound(format!("transfer {id}")))
    }

    async fn add_transfer_attachments(
        &mut self,
        transfer: TransferId,
        role: AttachmentRole,
        ids: &[AttachmentId],
    ) -> Result<()> {
        self.queries += 1;
        let mut tables = lock_tables(&self.tables)?;
        let row = tables
            .transfers
            .get_mut(&transfer)
            .ok_or_else(|| EdiError::NotFound(format!("transfer {transfer}")))?;
        let previous = row.clone();
        let set = match role {
            AttachmentRole::Input => &mut row.input_ids,
            AttachmentRole::Output => &mut row.output_ids,
        };
        for id in ids {
            if !set.contains(id) {
                set.push(*id);
            }
        }
        self.undo.push(Undo::Transfer(transfer, Some(previous)));
        Ok(())
    }

    async fn sent_outputs(
        &mut self,
        gateway: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<HashSet<AttachmentId>> {
        self.queries += 1;
        let tables = lock_tables(&self.tables)?;
        Ok(tables
            .transfers
            .values()
            .filter(|t| t.gateway == gateway)
            .filter(|t| since.map_or(true, |since| t.created_at >= since))
            .flat_map(|t| t.output_ids.iter().copied())
            .collect())
    }

    async fn create_issue(&mut self, issue: NewIssue) -> Result<Issue> {
        self.queries += 1;
        let mut tables = lock_tables(&self.tables)?;
        let id = IssueId::new(tables.next_id());
        let row = Issue {
            id,
            subject: issue.subject,
            links: issue.links,
            title: issue.title,
            summary: issue.summary,
            trace: issue.trace,
            open: true,
            created_at: Utc::now(),
        };
        tables.issues.insert(id, row.clone());
        self.undo.push(Undo::Issue(id, None));
        Ok(row)
    }

    async fn issues(&mut self, subject: &Subject, open_only: bool) -> Result<Vec<Issue>> {
        self.queries += 1;
        let tables = lock_tables(&self.tables)?;
        Ok(tables
            .issues
            .values()
            .filter(|i| &i.subject == subject || i.links.includes(subject))
            .filter(|i| !open_only || i.open)
            .cloned()
            .collect())
    }

    async fn close_issues(&mut self, subject: &Subject) -> Result<u64> {
        self.queries += 1;
        let mut tables = lock_tables(&self.tables)?;
        let mut closed = 0;
        for issue in tables.issues.values_mut() {
            if issue.open && &issue.subject == subject {
                let previous = issue.clone();
                issue.open = false;
                self.undo.push(Undo::Issue(issue.id, Some(previous)));
                closed += 1;
            }
        }
        Ok(closed)
    }

    async fn create_audit(
        &mut self,
        subject: &Subject,
        body: &str,
        attachments: &[AttachmentId],
    ) -> Result<()> {
        self.queries += 1;
        let mut tables = lock_tables(&self.tables)?;
        let snapshots = attachments
            .iter()
            .filter_map(|id| tables.attachments.get(id))
            .map(AttachmentSnapshot::from)
            .collect();
        let id = tables.next_id();
        tables.audits.insert(
            id,
            AuditEntry {
                subject: subject.clone(),
                body: body.to_string(),
                attachments: snapshots,
                created_at: Utc::now(),
            },
        );
        self.undo.push(Undo::Audit(id));
        Ok(())
    }

    async fn audits(&mut self, subject: &Subject) -> Result<Vec<AuditEntry>> {
        self.queries += 1;
        let tables = lock_tables(&self.tables)?;
        Ok(tables
            .audits
            .values()
            .filter(|a| &a.subject == subject)
            .cloned()
            .collect())
    }

    async fn find_entities(
        &mut self,
        kind: &str,
        field: &str,
        keys: &[String],
        filter: &Map<String, Value>,
    ) -> Result<Vec<Entity>> {
        self.queries += 1;
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let keys: HashSet<&str> = keys.iter().map(String::as_str).collect();
        let tables = lock_tables(&self.tables)?;
        Ok(tables
            .entities
            .values()
            .filter(|e| e.kind == kind)
            .filter(|e| e.key(field).is_some_and(|k| keys.contains(k.as_str())))
            .filter(|e| e.matches(filter))
            .cloned()
            .collect())
    }

    async fn search_entities(
        &mut self,
        kind: &str,
        filter: &Map<String, Value>,
    ) -> Result<Vec<Entity>> {
        self.queries += 1;
        let tables = lock_tables(&self.tables)?;
        Ok(tables
            .entities
            .values()
            .filter(|e| e.kind == kind && e.matches(filter))
            .cloned()
            .collect())
    }

    async fn entity(&mut self, id: EntityId) -> Result<Entity> {
        self.queries += 1;
        let tables = lock_tables(&self.tables)?;
        tables
            .entities
            .get(&id)
            .cloned()
            .ok_or_else(|| EdiError::NotFound(format!("entity {id}")))
    }

    async fn create_entity(&mut self, kind: &str, fields: Map<String, Value>) -> Result<Entity> {
        self.queries += 1;
        let mut tables = lock_tables(&self.tables)?;
        let id = EntityId::new(tables.next_id());
        let row = Entity {
            id,
            kind: kind.to_string(),
            fields,
        };
        tables.entities.insert(id, row.clone());
        self.undo.push(Undo::Entity(id, None));
        Ok(row)
    }

    async fn update_entity(&mut self, id: EntityId, fields: Map<String, Value>) -> Result<Entity> {
        self.queries += 1;
        let mut tables = lock_tables(&self.tables)?;
        let row = tables
            .entities
            .get_mut(&id)
            .ok_or_else(|| EdiError::NotFound(format!("entity {id}")))?;
        let previous = row.clone();
        row.fields.extend(fields);
        let updated = row.clone();
        self.undo.push(Undo::Entity(id, Some(previous)));
        Ok(updated)
    }

    async fn record_mail(&mut self, mail: NewMailRecord) -> Result<MailRecord> {
        self.queries += 1;
        let mut tables = lock_tables(&self.tables)?;
        let id = MailId::new(tables.next_id());
        let row = MailRecord {
            id,
            gateway: mail.gateway,
            path: mail.path,
            document: mail.document,
            recipient: mail.recipient,
            subject: mail.subject,
            attachment_ids: mail.attachment_ids,
            sent_at: Utc::now(),
        };
        tables.mails.insert(id, row.clone());
        self.undo.push(Undo::Mail(id, None));
        Ok(row)
    }

    async fn mails_since(
        &mut self,
        gateway: &str,
        path: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<MailRecord>> {
        self.queries += 1;
        let tables = lock_tables(&self.tables)?;
        Ok(tables
            .mails
            .values()
            .filter(|m| m.gateway == gateway && m.path == path && m.sent_at >= since)
            .cloned()
            .collect())
    }
}
