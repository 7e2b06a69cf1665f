//! Row mapping for the PostgreSQL store
//!
//! Column layouts follow `migrations/001_initial_schema.sql`.

use crate::domain::{
    Attachment, AttachmentId, AttachmentRole, AttachmentSnapshot, AuditEntry, Document,
    DocumentId, DocumentState, EdiError, Entity, EntityId, Issue, IssueId, IssueLinks, MailId,
    MailRecord, Record, RecordId, Result, Subject, TransferId,
};
use serde_json::{Map, Value};
use tokio_postgres::Row;

pub const DOCUMENT_COLUMNS: &str =
    "id, name, doc_type, state, prepare_date, execute_date, transfer_id, gateway, created_at";

pub const ATTACHMENT_COLUMNS: &str = "id, name, role, document_id, data, checksum, created_at";

pub const RECORD_COLUMNS: &str =
    "id, document_id, record_type, name, target_id, record_values, deactivate, error";

pub const ISSUE_COLUMNS: &str = "id, subject_kind, subject_key, document_id, gateway, \
     transfer_id, title, summary, trace, open, created_at";

pub const MAIL_COLUMNS: &str =
    "id, gateway, path, document_id, recipient, subject, attachment_ids, sent_at";

fn corrupt(what: &str, detail: impl std::fmt::Display) -> EdiError {
    EdiError::Store(format!("Invalid {what} row: {detail}"))
}

pub fn subject_parts(subject: &Subject) -> (&'static str, String) {
    (subject.kind(), subject.key())
}

pub fn subject_from_parts(kind: &str, key: &str) -> Result<Subject> {
    let parse = |key: &str| {
        key.parse::<i64>()
            .map_err(|e| corrupt("subject", format!("{kind}:{key}: {e}")))
    };
    match kind {
        "document" => Ok(Subject::Document(DocumentId::new(parse(key)?))),
        "transfer" => Ok(Subject::Transfer(TransferId::new(parse(key)?))),
        "gateway" => Ok(Subject::Gateway(key.to_string())),
        other => Err(corrupt("subject", other)),
    }
}

fn json_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

pub fn document_from_row(row: &Row) -> Result<Document> {
    let state: String = row.get("state");
    Ok(Document {
        id: DocumentId::new(row.get("id")),
        name: row.get("name"),
        doc_type: row.get("doc_type"),
        state: state
            .parse::<DocumentState>()
            .map_err(|e| corrupt("document", e))?,
        prepare_date: row.get("prepare_date"),
        execute_date: row.get("execute_date"),
        transfer: row.get::<_, Option<i64>>("transfer_id").map(TransferId::new),
        gateway: row.get("gateway"),
        created_at: row.get("created_at"),
    })
}

pub fn attachment_from_row(row: &Row) -> Result<Attachment> {
    let role: String = row.get("role");
    Ok(Attachment {
        id: AttachmentId::new(row.get("id")),
        name: row.get("name"),
        role: role
            .parse::<AttachmentRole>()
            .map_err(|e| corrupt("attachment", e))?,
        document: row.get::<_, Option<i64>>("document_id").map(DocumentId::new),
        data: row.get("data"),
        checksum: row.get("checksum"),
        created_at: row.get("created_at"),
    })
}

pub fn record_from_row(row: &Row) -> Record {
    Record {
        id: RecordId::new(row.get("id")),
        document: DocumentId::new(row.get("document_id")),
        record_type: row.get("record_type"),
        name: row.get("name"),
        target: row.get::<_, Option<i64>>("target_id").map(EntityId::new),
        values: json_object(row.get("record_values")),
        deactivate: row.get("deactivate"),
        error: row.get("error"),
    }
}

pub fn issue_from_row(row: &Row) -> Result<Issue> {
    let kind: String = row.get("subject_kind");
    let key: String = row.get("subject_key");
    Ok(Issue {
        id: IssueId::new(row.get("id")),
        subject: subject_from_parts(&kind, &key)?,
        links: IssueLinks {
            document: row.get::<_, Option<i64>>("document_id").map(DocumentId::new),
            gateway: row.get("gateway"),
            transfer: row.get::<_, Option<i64>>("transfer_id").map(TransferId::new),
        },
        title: row.get("title"),
        summary: row.get("summary"),
        trace: row.get("trace"),
        open: row.get("open"),
        created_at: row.get("created_at"),
    })
}

pub fn audit_from_row(row: &Row) -> Result<AuditEntry> {
    let kind: String = row.get("subject_kind");
    let key: String = row.get("subject_key");
    let attachments: Vec<AttachmentSnapshot> =
        serde_json::from_value(row.get("attachments")).map_err(|e| corrupt("audit", e))?;
    Ok(AuditEntry {
        subject: subject_from_parts(&kind, &key)?,
        body: row.get("body"),
        attachments,
        created_at: row.get("created_at"),
    })
}

pub fn entity_from_row(row: &Row) -> Entity {
    Entity {
        id: EntityId::new(row.get("id")),
        kind: row.get("kind"),
        fields: json_object(row.get("fields")),
    }
}

pub fn mail_from_row(row: &Row) -> MailRecord {
    let attachment_ids: Vec<i64> = row.get("attachment_ids");
    MailRecord {
        id: MailId::new(row.get("id")),
        gateway: row.get("gateway"),
        path: row.get("path"),
        document: DocumentId::new(row.get("document_id")),
        recipient: row.get("recipient"),
        subject: row.get("subject"),
        attachment_ids: attachment_ids.into_iter().map(AttachmentId::new).collect(),
        sent_at: row.get("sent_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_parts_round_trip() {
        for subject in [
            Subject::Document(DocumentId::new(3)),
            Subject::Gateway("partner".to_string()),
            Subject::Transfer(TransferId::new(9)),
        ] {
            let (kind, key) = subject_parts(&subject);
            assert_eq!(subject_from_parts(kind, &key).unwrap(), subject);
        }
    }

    #[test]
    fn test_corrupt_subject() {
        assert!(subject_from_parts("document", "abc").is_err());
        assert!(subject_from_parts("invoice", "1").is_err());
    }
}
