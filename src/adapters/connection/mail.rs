//! Mail backend
//!
//! Send-only. A mailbox cannot be read back, so "already sent" is decided
//! from the log of earlier sends through the same path within the window.

use super::filter::{eligible_outputs, PathFilter};
use super::traits::{Connection, TransferContext};
use crate::adapters::mailer::{Mailer, OutboundMail};
use crate::config::schema::PathConfig;
use crate::domain::{Attachment, AttachmentId, NewMailRecord, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

pub struct MailConnection {
    mailer: Arc<dyn Mailer>,
}

impl MailConnection {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }
}

#[async_trait]
impl Connection for MailConnection {
    async fn receive_inputs(
        &mut self,
        _cx: &mut TransferContext<'_>,
        _path: &PathConfig,
    ) -> Result<Vec<Attachment>> {
        Ok(Vec::new())
    }

    async fn send_outputs(
        &mut self,
        cx: &mut TransferContext<'_>,
        path: &PathConfig,
    ) -> Result<Vec<Attachment>> {
        let filter = PathFilter::new(path, cx.now)?;
        let already_mailed: HashSet<AttachmentId> = cx
            .session
            .mails_since(&cx.gateway.name, &path.name, filter.min_date)
            .await?
            .into_iter()
            .flat_map(|mail| mail.attachment_ids)
            .collect();

        let mut sent = Vec::new();
        for (document, outputs) in eligible_outputs(&mut *cx.session, path, &filter).await? {
            if outputs.iter().all(|a| already_mailed.contains(&a.id)) {
                tracing::debug!(document = %document.name, "Skipping already mailed document");
                continue;
            }

            let mail = OutboundMail {
                to: path.path.clone(),
                subject: document.name.clone(),
                body: format!("Please find attached {}.", document.name),
                attachments: outputs
                    .iter()
                    .map(|a| (a.name.clone(), a.data.clone()))
                    .collect(),
            };
            self.mailer.send(&mail).await?;
            cx.session
                .record_mail(NewMailRecord {
                    gateway: cx.gateway.name.clone(),
                    path: path.name.clone(),
                    document: document.id,
                    recipient: mail.to,
                    subject: mail.subject,
                    attachment_ids: outputs.iter().map(|a| a.id).collect(),
                })
                .await?;
            sent.extend(outputs);
        }
        Ok(sent)
    }
}
