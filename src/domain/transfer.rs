//! Transfers and sent-mail bookkeeping

use super::ids::{AttachmentId, DocumentId, MailId, TransferId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One receive/process/send invocation against a gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    pub gateway: String,
    /// Timestamp-derived display name
    pub name: String,
    pub allow_receive: bool,
    pub allow_process: bool,
    pub allow_send: bool,
    pub created_at: DateTime<Utc>,
    pub input_ids: Vec<AttachmentId>,
    pub output_ids: Vec<AttachmentId>,
}

/// Values for a new transfer
#[derive(Debug, Clone)]
pub struct NewTransfer {
    pub gateway: String,
    pub allow_receive: bool,
    pub allow_process: bool,
    pub allow_send: bool,
}

impl NewTransfer {
    /// A transfer with every phase enabled
    pub fn new(gateway: impl Into<String>) -> Self {
        Self {
            gateway: gateway.into(),
            allow_receive: true,
            allow_process: true,
            allow_send: true,
        }
    }
}

/// A document mailed out through a mail gateway path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailRecord {
    pub id: MailId,
    pub gateway: String,
    pub path: String,
    pub document: DocumentId,
    pub recipient: String,
    pub subject: String,
    pub attachment_ids: Vec<AttachmentId>,
    pub sent_at: DateTime<Utc>,
}

/// Values for a new sent-mail record
#[derive(Debug, Clone)]
pub struct NewMailRecord {
    pub gateway: String,
    pub path: String,
    pub document: DocumentId,
    pub recipient: String,
    pub subject: String,
    pub attachment_ids: Vec<AttachmentId>,
}
