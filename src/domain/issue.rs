//! Issues and the attachment audit trail

use super::attachment::AttachmentSnapshot;
use super::ids::{DocumentId, IssueId, TransferId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The object an issue or audit entry is raised against
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Subject {
    Document(DocumentId),
    Gateway(String),
    Transfer(TransferId),
}

impl Subject {
    /// Storage tag of the subject kind
    pub fn kind(&self) -> &'static str {
        match self {
            Subject::Document(_) => "document",
            Subject::Gateway(_) => "gateway",
            Subject::Transfer(_) => "transfer",
        }
    }

    /// Storage key of the subject within its kind
    pub fn key(&self) -> String {
        match self {
            Subject::Document(id) => id.to_string(),
            Subject::Gateway(name) => name.clone(),
            Subject::Transfer(id) => id.to_string(),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.key())
    }
}

/// Objects an issue links back to
///
/// A document issue raised during a transfer links to the document, the
/// transfer and the gateway, so it shows up in all three issue lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueLinks {
    pub document: Option<DocumentId>,
    pub gateway: Option<String>,
    pub transfer: Option<TransferId>,
}

impl IssueLinks {
    /// Whether these links include the given subject
    pub fn includes(&self, subject: &Subject) -> bool {
        match subject {
            Subject::Document(id) => self.document == Some(*id),
            Subject::Gateway(name) => self.gateway.as_deref() == Some(name.as_str()),
            Subject::Transfer(id) => self.transfer == Some(*id),
        }
    }
}

/// A failure ticket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: IssueId,
    pub subject: Subject,
    pub links: IssueLinks,
    /// `[<subject name>] <message>`
    pub title: String,
    /// `<context>: <message>`
    pub summary: String,
    /// Error chain and backtrace, for unexpected failures only
    pub trace: Option<String>,
    pub open: bool,
    pub created_at: DateTime<Utc>,
}

/// Values for a new issue
#[derive(Debug, Clone)]
pub struct NewIssue {
    pub subject: Subject,
    pub links: IssueLinks,
    pub title: String,
    pub summary: String,
    pub trace: Option<String>,
}

/// One message in a subject's audit thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub subject: Subject,
    pub body: String,
    pub attachments: Vec<AttachmentSnapshot>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_links_include_subject() {
        let links = IssueLinks {
            document: Some(DocumentId::new(1)),
            gateway: Some("partner".to_string()),
            transfer: Some(TransferId::new(2)),
        };
        assert!(links.includes(&Subject::Document(DocumentId::new(1))));
        assert!(links.includes(&Subject::Gateway("partner".to_string())));
        assert!(links.includes(&Subject::Transfer(TransferId::new(2))));
        assert!(!links.includes(&Subject::Transfer(TransferId::new(3))));
    }

    #[test]
    fn test_subject_display() {
        assert_eq!(Subject::Gateway("sftp".into()).to_string(), "gateway:sftp");
        assert_eq!(Subject::Document(DocumentId::new(5)).to_string(), "document:5");
    }
}
