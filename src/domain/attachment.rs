//! Binary attachments exchanged with trading partners

use super::ids::{AttachmentId, DocumentId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Whether an attachment was received (input) or produced (output)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentRole {
    /// Received from a partner
    Input,
    /// Produced for a partner
    Output,
}

impl AttachmentRole {
    /// Stable storage name
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentRole::Input => "input",
            AttachmentRole::Output => "output",
        }
    }
}

impl fmt::Display for AttachmentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AttachmentRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "input" => Ok(AttachmentRole::Input),
            "output" => Ok(AttachmentRole::Output),
            other => Err(format!("Invalid attachment role: {other}")),
        }
    }
}

/// A stored binary blob
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: AttachmentId,
    pub name: String,
    pub role: AttachmentRole,
    /// Owning document, if the attachment has been classified
    pub document: Option<DocumentId>,
    pub data: Vec<u8>,
    /// Hex SHA-256 of `data`
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

impl Attachment {
    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Values for a new attachment
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub name: String,
    pub role: AttachmentRole,
    pub document: Option<DocumentId>,
    pub data: Vec<u8>,
}

impl NewAttachment {
    /// A received attachment, not yet classified into a document
    pub fn input(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            role: AttachmentRole::Input,
            document: None,
            data,
        }
    }

    /// An output attachment produced by a document
    pub fn output(document: DocumentId, name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            role: AttachmentRole::Output,
            document: Some(document),
            data,
        }
    }
}

/// Hex-encoded SHA-256 digest of a payload
///
/// # Examples
///
/// ```
/// use edi::domain::attachment::checksum;
///
/// assert_eq!(
///     checksum(b""),
///     "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
/// );
/// ```
pub fn checksum(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Name, size and checksum of an attachment, as recorded in the audit trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentSnapshot {
    pub name: String,
    pub size: usize,
    pub checksum: String,
}

impl From<&Attachment> for AttachmentSnapshot {
    fn from(attachment: &Attachment) -> Self {
        Self {
            name: attachment.name.clone(),
            size: attachment.size(),
            checksum: attachment.checksum.clone(),
        }
    }
}
