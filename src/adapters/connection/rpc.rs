//! RPC backend
//!
//! The "transport" is caller-supplied data: files keyed by path locator,
//! base64-encoded. Received files are consumed from the container and sent
//! outputs are appended to it, so the caller reads the container back after
//! the transfer.

use super::filter::{check_size, PathFilter};
use super::traits::{Connection, TransferContext};
use crate::config::schema::PathConfig;
use crate::domain::{Attachment, AttachmentRole, DocumentState, NewAttachment, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A file exchanged through the RPC entry point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcFile {
    pub name: String,

    /// Base64 payload
    pub data: String,

    /// Decoded size, checked on receive when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl RpcFile {
    pub fn new(name: impl Into<String>, data: &[u8]) -> Self {
        Self {
            name: name.into(),
            data: base64::engine::general_purpose::STANDARD.encode(data),
            size: Some(data.len() as u64),
        }
    }

    pub fn decode(&self) -> Result<Vec<u8>> {
        Ok(base64::engine::general_purpose::STANDARD.decode(self.data.trim())?)
    }
}

#[derive(Debug, Default)]
pub struct RpcConnection {
    pub files: HashMap<String, Vec<RpcFile>>,
}

impl RpcConnection {
    pub fn new(files: HashMap<String, Vec<RpcFile>>) -> Self {
        Self { files }
    }

    pub fn into_files(self) -> HashMap<String, Vec<RpcFile>> {
        self.files
    }
}

#[async_trait]
impl Connection for RpcConnection {
    async fn receive_inputs(
        &mut self,
        cx: &mut TransferContext<'_>,
        path: &PathConfig,
    ) -> Result<Vec<Attachment>> {
        let filter = PathFilter::new(path, cx.now)?;
        let Some(pending) = self.files.get_mut(&path.path) else {
            return Ok(Vec::new());
        };
        let (matching, rest): (Vec<RpcFile>, Vec<RpcFile>) = std::mem::take(pending)
            .into_iter()
            .partition(|f| filter.matches_name(&f.name));
        *pending = rest;

        let mut received = Vec::new();
        for file in matching {
            let data = file.decode()?;
            if let Some(size) = file.size {
                check_size(size, data.len())?;
            }
            if cx.session.input_exists(&file.name, data.len()).await? {
                tracing::debug!(file = %file.name, "Skipping already received file");
                continue;
            }
            let attachment = cx
                .session
                .create_attachment(NewAttachment::input(file.name, data))
                .await?;
            received.push(attachment);
        }
        Ok(received)
    }

    async fn send_outputs(
        &mut self,
        cx: &mut TransferContext<'_>,
        path: &PathConfig,
    ) -> Result<Vec<Attachment>> {
        let filter = PathFilter::new(path, cx.now)?;
        let already_sent = if cx.gateway.resend {
            Default::default()
        } else {
            cx.session.sent_outputs(&cx.gateway.name, None).await?
        };

        let documents = cx.session.transfer_documents(cx.transfer.id).await?;
        let mut sent = Vec::new();
        for document in documents {
            if document.state != DocumentState::Done {
                continue;
            }
            if !path.doc_types.is_empty() && !path.doc_types.contains(&document.doc_type) {
                continue;
            }
            let outputs = cx
                .session
                .document_attachments(document.id, AttachmentRole::Output)
                .await?;
            for attachment in outputs {
                if !filter.matches_name(&attachment.name) || already_sent.contains(&attachment.id) {
                    continue;
                }
                self.files
                    .entry(path.path.clone())
                    .or_default()
                    .push(RpcFile::new(attachment.name.clone(), &attachment.data));
                sent.push(attachment);
            }
        }
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_file_round_trip() {
        let file = RpcFile::new("hello.txt", b"hello");
        assert_eq!(file.data, "aGVsbG8=");
        assert_eq!(file.size, Some(5));
        assert_eq!(file.decode().unwrap(), b"hello".to_vec());
    }

    #[test]
    fn test_invalid_base64_is_user_error() {
        let file = RpcFile {
            name: "x".to_string(),
            data: "***".to_string(),
            size: None,
        };
        assert!(file.decode().unwrap_err().is_user_error());
    }

    #[test]
    fn test_size_is_optional_on_the_wire() {
        let file: RpcFile = serde_json::from_str(r#"{"name": "a", "data": "YQ=="}"#).unwrap();
        assert_eq!(file.size, None);
    }
}
