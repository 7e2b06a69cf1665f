//! PostgreSQL transaction
//!
//! A session pins one pooled connection for its lifetime and drives the
//! transaction by hand (`BEGIN`, `SAVEPOINT sp_N`, `COMMIT`). A session
//! dropped mid-transaction detaches its connection from the pool so the
//! server rolls it back when the socket closes.

use super::models::{
    attachment_from_row, audit_from_row, document_from_row, entity_from_row, issue_from_row,
    mail_from_row, record_from_row, subject_parts, ATTACHMENT_COLUMNS, DOCUMENT_COLUMNS,
    ISSUE_COLUMNS, MAIL_COLUMNS, RECORD_COLUMNS,
};
use crate::adapters::store::traits::{Savepoint, Session};
use crate::domain::attachment::checksum;
use crate::domain::{
    Attachment, AttachmentId, AttachmentRole, AttachmentSnapshot, AuditEntry, Document,
    DocumentId, EdiError, Entity, EntityId, Issue, MailRecord, NewAttachment, NewDocument,
    NewIssue, NewMailRecord, NewRecord, NewTransfer, Record, Result, Subject, Transfer,
    TransferId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Object;
use serde_json::{Map, Value};
use std::collections::HashSet;
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;

type Params<'a> = &'a [&'a (dyn ToSql + Sync)];

/// A transaction on a [`super::PostgresStore`]
pub struct PostgresSession {
    client: Option<Object>,
    next_savepoint: u32,
    queries: u64,
}

impl PostgresSession {
    pub(crate) async fn begin(client: Object, statement_timeout_ms: u64) -> Result<Self> {
        client
            .batch_execute("BEGIN")
            .await
            .map_err(|e| EdiError::Store(format!("Failed to begin transaction: {}", e)))?;
        client
            .batch_execute(&format!("SET LOCAL statement_timeout = {statement_timeout_ms}"))
            .await
            .map_err(|e| EdiError::Store(format!("Failed to set statement timeout: {}", e)))?;
        Ok(Self {
            client: Some(client),
            next_savepoint: 0,
            queries: 2,
        })
    }

    fn client(&self) -> Result<&Object> {
        self.client
            .as_ref()
            .ok_or_else(|| EdiError::Store("Session already finished".to_string()))
    }

    async fn batch(&mut self, sql: &str) -> Result<()> {
        self.queries += 1;
        self.client()?
            .batch_execute(sql)
            .await
            .map_err(|e| EdiError::Store(format!("{sql} failed: {e}")))
    }

    async fn query(&mut self, sql: &str, params: Params<'_>) -> Result<Vec<Row>> {
        self.queries += 1;
        self.client()?
            .query(sql, params)
            .await
            .map_err(|e| EdiError::Store(format!("Query failed: {}", e)))
    }

    async fn query_one(&mut self, sql: &str, params: Params<'_>) -> Result<Row> {
        self.queries += 1;
        self.client()?
            .query_one(sql, params)
            .await
            .map_err(|e| EdiError::Store(format!("Query failed: {}", e)))
    }

    async fn execute(&mut self, sql: &str, params: Params<'_>) -> Result<u64> {
        self.queries += 1;
        self.client()?
            .execute(sql, params)
            .await
            .map_err(|e| EdiError::Store(format!("Statement execution failed: {}", e)))
    }

    async fn transfer_attachment_ids(
        &mut self,
        transfer: TransferId,
        role: AttachmentRole,
    ) -> Result<Vec<AttachmentId>> {
        let rows = self
            .query(
                "SELECT attachment_id FROM edi_transfer_attachment \
                 WHERE transfer_id = $1 AND role = $2 ORDER BY attachment_id",
                &[&transfer.get(), &role.as_str()],
            )
            .await?;
        Ok(rows
            .iter()
            .map(|row| AttachmentId::new(row.get(0)))
            .collect())
    }

    async fn finish(&mut self, sql: &str) -> Result<()> {
        let client = self.client.take().ok_or_else(|| {
            EdiError::Store("Session already finished".to_string())
        })?;
        client
            .batch_execute(sql)
            .await
            .map_err(|e| EdiError::Store(format!("{sql} failed: {e}")))
    }
}

impl Drop for PostgresSession {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            tracing::warn!("PostgreSQL session dropped without commit; discarding connection");
            drop(Object::take(client));
        }
    }
}

#[async_trait]
impl Session for PostgresSession {
    async fn savepoint(&mut self) -> Result<Savepoint> {
        let savepoint = Savepoint(self.next_savepoint);
        self.next_savepoint += 1;
        self.batch(&format!("SAVEPOINT sp_{}", savepoint.0)).await?;
        Ok(savepoint)
    }

    async fn release(&mut self, savepoint: Savepoint) -> Result<()> {
        self.batch(&format!("RELEASE SAVEPOINT sp_{}", savepoint.0))
            .await
    }

    async fn rollback_to(&mut self, savepoint: Savepoint) -> Result<()> {
        self.batch(&format!("ROLLBACK TO SAVEPOINT sp_{}", savepoint.0))
            .await
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        self.finish("ROLLBACK").await
    }

    fn query_count(&self) -> u64 {
        self.queries
    }

    async fn lock_gateway(&mut self, gateway: &str, transfer: TransferId) -> Result<()> {
        let key = format!("gateway:{gateway}");
        self.execute("SELECT pg_advisory_xact_lock(hashtext($1))", &[&key])
            .await?;
        self.execute(
            "INSERT INTO edi_gateway (name, last_transfer_id, updated_at) VALUES ($1, $2, NOW()) \
             ON CONFLICT (name) DO UPDATE SET last_transfer_id = EXCLUDED.last_transfer_id, \
             updated_at = EXCLUDED.updated_at",
            &[&gateway, &transfer.get()],
        )
        .await?;
        Ok(())
    }

    async fn lock_document(&mut self, id: DocumentId) -> Result<()> {
        let rows = self
            .query(
                "SELECT id FROM edi_document WHERE id = $1 FOR UPDATE",
                &[&id.get()],
            )
            .await?;
        if rows.is_empty() {
            return Err(EdiError::NotFound(format!("document {id}")));
        }
        Ok(())
    }

    async fn next_sequence(&mut self, name: &str) -> Result<i64> {
        let row = self
            .query_one(
                "INSERT INTO edi_sequence (name, value) VALUES ($1, 1) \
                 ON CONFLICT (name) DO UPDATE SET value = edi_sequence.value + 1 \
                 RETURNING value",
                &[&name],
            )
            .await?;
        Ok(row.get(0))
    }

    async fn create_attachment(&mut self, attachment: NewAttachment) -> Result<Attachment> {
        let sum = checksum(&attachment.data);
        let size = attachment.data.len() as i64;
        let document = attachment.document.map(DocumentId::get);
        let sql = format!(
            "INSERT INTO edi_attachment (name, role, document_id, data, size, checksum) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {ATTACHMENT_COLUMNS}"
        );
        let row = self
            .query_one(
                &sql,
                &[
                    &attachment.name,
                    &attachment.role.as_str(),
                    &document,
                    &attachment.data,
                    &size,
                    &sum,
                ],
            )
            .await?;
        attachment_from_row(&row)
    }

    async fn attachments(&mut self, ids: &[AttachmentId]) -> Result<Vec<Attachment>> {
        let raw: Vec<i64> = ids.iter().map(|id| id.get()).collect();
        let sql = format!("SELECT {ATTACHMENT_COLUMNS} FROM edi_attachment WHERE id = ANY($1)");
        let rows = self.query(&sql, &[&raw]).await?;
        let mut found = rows
            .iter()
            .map(attachment_from_row)
            .collect::<Result<Vec<_>>>()?;
        found.sort_by_key(|a| ids.iter().position(|id| *id == a.id));
        Ok(found)
    }

    async fn attach(&mut self, ids: &[AttachmentId], document: DocumentId) -> Result<()> {
        let raw: Vec<i64> = ids.iter().map(|id| id.get()).collect();
        self.execute(
            "UPDATE edi_attachment SET document_id = $2 WHERE id = ANY($1)",
            &[&raw, &document.get()],
        )
        .await?;
        Ok(())
    }

    async fn input_exists(&mut self, name: &str, size: usize) -> Result<bool> {
        let size = size as i64;
        let row = self
            .query_one(
                "SELECT EXISTS(SELECT 1 FROM edi_attachment \
                 WHERE role = 'input' AND name = $1 AND size = $2)",
                &[&name, &size],
            )
            .await?;
        Ok(row.get(0))
    }

    async fn document_attachments(
        &mut self,
        document: DocumentId,
        role: AttachmentRole,
    ) -> Result<Vec<Attachment>> {
        let sql = format!(
            "SELECT {ATTACHMENT_COLUMNS} FROM edi_attachment \
             WHERE document_id = $1 AND role = $2 ORDER BY id"
        );
        let rows = self.query(&sql, &[&document.get(), &role.as_str()]).await?;
        rows.iter().map(attachment_from_row).collect()
    }

    async fn create_document(&mut self, document: NewDocument) -> Result<Document> {
        let transfer = document.transfer.map(TransferId::get);
        let sql = format!(
            "INSERT INTO edi_document (name, doc_type, transfer_id, gateway) \
             VALUES ($1, $2, $3, $4) RETURNING {DOCUMENT_COLUMNS}"
        );
        let row = self
            .query_one(
                &sql,
                &[&document.name, &document.doc_type, &transfer, &document.gateway],
            )
            .await?;
        document_from_row(&row)
    }

    async fn document(&mut self, id: DocumentId) -> Result<Document> {
        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM edi_document WHERE id = $1");
        let rows = self.query(&sql, &[&id.get()]).await?;
        match rows.first() {
            Some(row) => document_from_row(row),
            None => Err(EdiError::NotFound(format!("document {id}"))),
        }
    }

    async fn update_document(&mut self, document: &Document) -> Result<()> {
        let updated = self
            .execute(
                "UPDATE edi_document SET name = $2, state = $3, prepare_date = $4, \
                 execute_date = $5 WHERE id = $1",
                &[
                    &document.id.get(),
                    &document.name,
                    &document.state.as_str(),
                    &document.prepare_date,
                    &document.execute_date,
                ],
            )
            .await?;
        if updated == 0 {
            return Err(EdiError::NotFound(format!("document {}", document.id)));
        }
        Ok(())
    }

    async fn transfer_documents(&mut self, transfer: TransferId) -> Result<Vec<Document>> {
        let sql =
            format!("SELECT {DOCUMENT_COLUMNS} FROM edi_document WHERE transfer_id = $1 ORDER BY id");
        let rows = self.query(&sql, &[&transfer.get()]).await?;
        rows.iter().map(document_from_row).collect()
    }

    async fn executed_documents(
        &mut self,
        since: DateTime<Utc>,
        doc_types: &[String],
    ) -> Result<Vec<Document>> {
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM edi_document \
             WHERE state = 'done' AND execute_date >= $1 \
             AND (cardinality($2::text[]) = 0 OR doc_type = ANY($2)) ORDER BY id"
        );
        let rows = self.query(&sql, &[&since, &doc_types]).await?;
        rows.iter().map(document_from_row).collect()
    }

    async fn create_records(
        &mut self,
        document: DocumentId,
        records: Vec<NewRecord>,
    ) -> Result<Vec<Record>> {
        let sql = format!(
            "INSERT INTO edi_record (document_id, record_type, name, target_id, record_values, \
             deactivate, keyed) VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {RECORD_COLUMNS}"
        );
        let mut created = Vec::with_capacity(records.len());
        for record in records {
            let target = record.target.map(EntityId::get);
            let values = Value::Object(record.values);
            let row = self
                .query_one(
                    &sql,
                    &[
                        &document.get(),
                        &record.record_type,
                        &record.name,
                        &target,
                        &values,
                        &record.deactivate,
                        &record.keyed,
                    ],
                )
                .await?;
            created.push(record_from_row(&row));
        }
        Ok(created)
    }

    async fn records(&mut self, document: DocumentId, record_type: &str) -> Result<Vec<Record>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM edi_record \
             WHERE document_id = $1 AND record_type = $2 ORDER BY id"
        );
        let rows = self.query(&sql, &[&document.get(), &record_type]).await?;
        Ok(rows.iter().map(record_from_row).collect())
    }

    async fn update_record(&mut self, record: &Record) -> Result<()> {
        let target = record.target.map(EntityId::get);
        let values = Value::Object(record.values.clone());
        let updated = self
            .execute(
                "UPDATE edi_record SET name = $2, target_id = $3, record_values = $4, \
                 deactivate = $5, error = $6 WHERE id = $1",
                &[
                    &record.id.get(),
                    &record.name,
                    &target,
                    &values,
                    &record.deactivate,
                    &record.error,
                ],
            )
            .await?;
        if updated == 0 {
            return Err(EdiError::NotFound(format!("record {}", record.id)));
        }
        Ok(())
    }

    async fn delete_records(&mut self, document: DocumentId, record_type: &str) -> Result<u64> {
        self.execute(
            "DELETE FROM edi_record WHERE document_id = $1 AND record_type = $2",
            &[&document.get(), &record_type],
        )
        .await
    }

    async fn create_transfer(&mut self, transfer: NewTransfer) -> Result<Transfer> {
        let sequence = self.next_sequence("transfer").await?;
        let name = format!("TRANSFER/{sequence:05}");
        let row = self
            .query_one(
                "INSERT INTO edi_transfer (name, gateway, allow_receive, allow_process, allow_send) \
                 VALUES ($1, $2, $3, $4, $5) RETURNING id, created_at",
                &[
                    &name,
                    &transfer.gateway,
                    &transfer.allow_receive,
                    &transfer.allow_process,
                    &transfer.allow_send,
                ],
            )
            .await?;
        Ok(Transfer {
            id: TransferId::new(row.get("id")),
            gateway: transfer.gateway,
            name,
            allow_receive: transfer.allow_receive,
            allow_process: transfer.allow_process,
            allow_send: transfer.allow_send,
            created_at: row.get("created_at"),
            input_ids: Vec::new(),
            output_ids: Vec::new(),
        })
    }

    async fn transfer(&mut self, id: TransferId) -> Result<Transfer> {
        let rows = self
            .query(
                "SELECT id, name, gateway, allow_receive, allow_process, allow_send, created_at \
                 FROM edi_transfer WHERE id = $1",
                &[&id.get()],
            )
            .await?;
        let row = rows
            .first()
            .ok_or_else(|| EdiError::NotFound(format!("transfer {id}")))?;
        let mut transfer = Transfer {
            id,
            name: row.get("name"),
            gateway: row.get("gateway"),
            allow_receive: row.get("allow_receive"),
            allow_process: row.get("allow_process"),
            allow_send: row.get("allow_send"),
            created_at: row.get("created_at"),
            input_ids: Vec::new(),
            output_ids: Vec::new(),
        };
        transfer.input_ids = self
            .transfer_attachment_ids(id, AttachmentRole::Input)
            .await?;
        transfer.output_ids = self
            .transfer_attachment_ids(id, AttachmentRole::Output)
            .await?;
        Ok(transfer)
    }

    async fn add_transfer_attachments(
        &mut self,
        transfer: TransferId,
        role: AttachmentRole,
        ids: &[AttachmentId],
    ) -> Result<()> {
        let raw: Vec<i64> = ids.iter().map(|id| id.get()).collect();
        self.execute(
            "INSERT INTO edi_transfer_attachment (transfer_id, attachment_id, role) \
             SELECT $1, unnest($2::bigint[]), $3 ON CONFLICT DO NOTHING",
            &[&transfer.get(), &raw, &role.as_str()],
        )
        .await?;
        Ok(())
    }

    async fn sent_outputs(
        &mut self,
        gateway: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<HashSet<AttachmentId>> {
        let rows = self
            .query(
                "SELECT DISTINCT ta.attachment_id FROM edi_transfer_attachment ta \
                 JOIN edi_transfer t ON t.id = ta.transfer_id \
                 WHERE t.gateway = $1 AND ta.role = 'output' \
                 AND ($2::timestamptz IS NULL OR t.created_at >= $2)",
                &[&gateway, &since],
            )
            .await?;
        Ok(rows
            .iter()
            .map(|row| AttachmentId::new(row.get(0)))
            .collect())
    }

    async fn create_issue(&mut self, issue: NewIssue) -> Result<Issue> {
        let (kind, key) = subject_parts(&issue.subject);
        let document = issue.links.document.map(DocumentId::get);
        let transfer = issue.links.transfer.map(TransferId::get);
        let sql = format!(
            "INSERT INTO edi_issue (subject_kind, subject_key, document_id, gateway, transfer_id, \
             title, summary, trace) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {ISSUE_COLUMNS}"
        );
        let row = self
            .query_one(
                &sql,
                &[
                    &kind,
                    &key,
                    &document,
                    &issue.links.gateway,
                    &transfer,
                    &issue.title,
                    &issue.summary,
                    &issue.trace,
                ],
            )
            .await?;
        issue_from_row(&row)
    }

    async fn issues(&mut self, subject: &Subject, open_only: bool) -> Result<Vec<Issue>> {
        let (kind, key) = subject_parts(subject);
        let link = match subject {
            Subject::Document(_) => "document_id::text = $2",
            Subject::Gateway(_) => "gateway = $2",
            Subject::Transfer(_) => "transfer_id::text = $2",
        };
        let sql = format!(
            "SELECT {ISSUE_COLUMNS} FROM edi_issue \
             WHERE ((subject_kind = $1 AND subject_key = $2) OR {link}) \
             AND (open OR NOT $3) ORDER BY id"
        );
        let rows = self.query(&sql, &[&kind, &key, &open_only]).await?;
        rows.iter().map(issue_from_row).collect()
    }

    async fn close_issues(&mut self, subject: &Subject) -> Result<u64> {
        let (kind, key) = subject_parts(subject);
        self.execute(
            "UPDATE edi_issue SET open = FALSE \
             WHERE open AND subject_kind = $1 AND subject_key = $2",
            &[&kind, &key],
        )
        .await
    }

    async fn create_audit(
        &mut self,
        subject: &Subject,
        body: &str,
        attachments: &[AttachmentId],
    ) -> Result<()> {
        let snapshots: Vec<AttachmentSnapshot> = self
            .attachments(attachments)
            .await?
            .iter()
            .map(AttachmentSnapshot::from)
            .collect();
        let snapshots = serde_json::to_value(snapshots)?;
        let (kind, key) = subject_parts(subject);
        self.execute(
            "INSERT INTO edi_audit (subject_kind, subject_key, body, attachments) \
             VALUES ($1, $2, $3, $4)",
            &[&kind, &key, &body, &snapshots],
        )
        .await?;
        Ok(())
    }

    async fn audits(&mut self, subject: &Subject) -> Result<Vec<AuditEntry>> {
        let (kind, key) = subject_parts(subject);
        let rows = self
            .query(
                "SELECT subject_kind, subject_key, body, attachments, created_at FROM edi_audit \
                 WHERE subject_kind = $1 AND subject_key = $2 ORDER BY id",
                &[&kind, &key],
            )
            .await?;
        rows.iter().map(audit_from_row).collect()
    }

    async fn find_entities(
        &mut self,
        kind: &str,
        field: &str,
        keys: &[String],
        filter: &Map<String, Value>,
    ) -> Result<Vec<Entity>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self
            .query(
                "SELECT id, kind, fields FROM edi_entity \
                 WHERE kind = $1 AND fields->>$2 = ANY($3) ORDER BY id",
                &[&kind, &field, &keys],
            )
            .await?;
        Ok(rows
            .iter()
            .map(entity_from_row)
            .filter(|e| e.matches(filter))
            .collect())
    }

    async fn search_entities(
        &mut self,
        kind: &str,
        filter: &Map<String, Value>,
    ) -> Result<Vec<Entity>> {
        let rows = self
            .query(
                "SELECT id, kind, fields FROM edi_entity WHERE kind = $1 ORDER BY id",
                &[&kind],
            )
            .await?;
        Ok(rows
            .iter()
            .map(entity_from_row)
            .filter(|e| e.matches(filter))
            .collect())
    }

    async fn entity(&mut self, id: EntityId) -> Result<Entity> {
        let rows = self
            .query(
                "SELECT id, kind, fields FROM edi_entity WHERE id = $1",
                &[&id.get()],
            )
            .await?;
        rows.first()
            .map(entity_from_row)
            .ok_or_else(|| EdiError::NotFound(format!("entity {id}")))
    }

    async fn create_entity(&mut self, kind: &str, fields: Map<String, Value>) -> Result<Entity> {
        let fields = Value::Object(fields);
        let row = self
            .query_one(
                "INSERT INTO edi_entity (kind, fields) VALUES ($1, $2) RETURNING id, kind, fields",
                &[&kind, &fields],
            )
            .await?;
        Ok(entity_from_row(&row))
    }

    async fn update_entity(&mut self, id: EntityId, fields: Map<String, Value>) -> Result<Entity> {
        let fields = Value::Object(fields);
        let rows = self
            .query(
                "UPDATE edi_entity SET fields = fields || $2 WHERE id = $1 \
                 RETURNING id, kind, fields",
                &[&id.get(), &fields],
            )
            .await?;
        rows.first()
            .map(entity_from_row)
            .ok_or_else(|| EdiError::NotFound(format!("entity {id}")))
    }

    async fn record_mail(&mut self, mail: NewMailRecord) -> Result<MailRecord> {
        let ids: Vec<i64> = mail.attachment_ids.iter().map(|id| id.get()).collect();
        let sql = format!(
            "INSERT INTO edi_mail (gateway, path, document_id, recipient, subject, attachment_ids) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {MAIL_COLUMNS}"
        );
        let row = self
            .query_one(
                &sql,
                &[
                    &mail.gateway,
                    &mail.path,
                    &mail.document.get(),
                    &mail.recipient,
                    &mail.subject,
                    &ids,
                ],
            )
            .await?;
        Ok(mail_from_row(&row))
    }

    async fn mails_since(
        &mut self,
        gateway: &str,
        path: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<MailRecord>> {
        let sql = format!(
            "SELECT {MAIL_COLUMNS} FROM edi_mail \
             WHERE gateway = $1 AND path = $2 AND sent_at >= $3 ORDER BY id"
        );
        let rows = self.query(&sql, &[&gateway, &path, &since]).await?;
        Ok(rows.iter().map(mail_from_row).collect())
    }
}
