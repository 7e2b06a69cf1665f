//! Gateway transfers
//!
//! A transfer receives new inputs on every receive path, turns them into
//! documents, processes the documents and sends outputs on every send
//! path. The whole run happens in one session under the gateway lock; a
//! failure rolls the run back to its savepoint and leaves an issue on the
//! transfer, which is still returned.

use crate::adapters::connection::{Connection, TransferContext};
use crate::adapters::store::{links_for, Session};
use crate::config::schema::GatewayConfig;
use crate::core::engine::Edi;
use crate::core::issues::{raise_issue, IssueTarget};
use crate::domain::{
    AttachmentRole, Document, DocumentState, EdiError, Issue, IssueLinks, NewTransfer, Result,
    Subject, Transfer,
};
use crate::{log_transfer_complete, log_transfer_start};
use chrono::Utc;
use serde::Serialize;
use std::time::Instant;

/// Outcome of one transfer
#[derive(Debug, Clone, Serialize)]
pub struct TransferReport {
    pub transfer: Transfer,
    /// Documents created by the transfer
    pub documents: Vec<Document>,
    /// Open issues on the transfer, including those of its documents
    pub issues: Vec<Issue>,
}

impl TransferReport {
    pub fn is_success(&self) -> bool {
        self.issues.is_empty()
    }
}

fn transfer_target(gateway: &GatewayConfig, transfer: &Transfer) -> IssueTarget {
    IssueTarget {
        subject: Subject::Transfer(transfer.id),
        links: IssueLinks {
            document: None,
            gateway: Some(gateway.name.clone()),
            transfer: Some(transfer.id),
        },
        name: transfer.name.clone(),
    }
}

impl Edi {
    /// Checks that the gateway's safety option is present and truthy
    ///
    /// # Errors
    ///
    /// Returns a user error naming the missing or disabled option
    pub fn check_safety(&self, gateway: &GatewayConfig) -> Result<()> {
        let key = gateway
            .safety
            .as_deref()
            .ok_or_else(|| EdiError::user("Missing safety configuration option"))?;
        match self.config().options.is_enabled(key) {
            None => Err(EdiError::user(format!(
                "Missing configuration option '{key}'"
            ))),
            Some(false) => Err(EdiError::user(format!(
                "Gateway disabled via configuration option '{key}'"
            ))),
            Some(true) => Ok(()),
        }
    }

    /// Runs one transfer on `gateway`
    ///
    /// Without a `connection` one is opened through the connection factory
    /// and closed afterwards. `allow_process` defaults to the gateway's
    /// `automatic` flag.
    ///
    /// # Errors
    ///
    /// Fails only for an unknown gateway or store failures outside the
    /// transfer's savepoint; everything else becomes an issue on the report
    pub async fn do_transfer(
        &self,
        gateway: &str,
        connection: Option<&mut dyn Connection>,
        allow_process: Option<bool>,
    ) -> Result<TransferReport> {
        let gateway = self.gateway(gateway)?;
        let started = Instant::now();
        let mut session = self.begin().await?;
        let transfer = session
            .create_transfer(NewTransfer {
                allow_process: allow_process.unwrap_or(gateway.automatic),
                ..NewTransfer::new(&gateway.name)
            })
            .await?;
        session.lock_gateway(&gateway.name, transfer.id).await?;
        log_transfer_start!(gateway.name, transfer.name);

        let savepoint = session.savepoint().await?;
        match self
            .run_transfer(session.as_mut(), gateway, &transfer, connection)
            .await
        {
            Ok(()) => session.release(savepoint).await?,
            Err(err) => {
                session.rollback_to(savepoint).await?;
                session.release(savepoint).await?;
                raise_issue(
                    session.as_mut(),
                    &transfer_target(gateway, &transfer),
                    "Transfer failed",
                    &err,
                )
                .await?;
            }
        }

        let report = TransferReport {
            transfer: session.transfer(transfer.id).await?,
            documents: session.transfer_documents(transfer.id).await?,
            issues: session.issues(&Subject::Transfer(transfer.id), true).await?,
        };
        session.commit().await?;
        log_transfer_complete!(
            gateway.name,
            report.documents.len(),
            report.issues.len(),
            started.elapsed()
        );
        Ok(report)
    }

    /// Runs a transfer and reports whether it completed without issues
    pub async fn action_transfer(&self, gateway: &str) -> Result<bool> {
        Ok(self.do_transfer(gateway, None, None).await?.is_success())
    }

    /// Checks the safety option and opens and closes a connection
    ///
    /// # Errors
    ///
    /// A failure is raised as an issue on the gateway, committed, and then
    /// returned
    pub async fn action_test(&self, gateway: &str) -> Result<()> {
        let gateway = self.gateway(gateway)?;
        let subject = Subject::Gateway(gateway.name.clone());
        let mut session = self.begin().await?;
        session.close_issues(&subject).await?;

        let result = async {
            self.check_safety(gateway)?;
            let mut connection = self.connections().connect(gateway).await?;
            connection.close().await
        }
        .await;

        match result {
            Ok(()) => {
                session
                    .create_audit(&subject, "Connection tested successfully", &[])
                    .await?;
                session.commit().await?;
                tracing::info!(gateway = %gateway.name, "Connection tested successfully");
                Ok(())
            }
            Err(err) => {
                let target = IssueTarget {
                    links: links_for(&subject),
                    subject,
                    name: gateway.name.clone(),
                };
                raise_issue(session.as_mut(), &target, "Connection test failed", &err).await?;
                session.commit().await?;
                Err(err)
            }
        }
    }

    async fn run_transfer(
        &self,
        session: &mut dyn Session,
        gateway: &GatewayConfig,
        transfer: &Transfer,
        connection: Option<&mut dyn Connection>,
    ) -> Result<()> {
        self.check_safety(gateway)?;
        if let Some(connection) = connection {
            return self.transfer_phases(session, gateway, transfer, connection).await;
        }

        let mut connection = self.connections().connect(gateway).await?;
        let result = self
            .transfer_phases(session, gateway, transfer, connection.as_mut())
            .await;
        let closed = connection.close().await;
        if let (Err(_), Err(close_err)) = (&result, &closed) {
            tracing::warn!(gateway = %gateway.name, error = %close_err, "Failed to close connection");
        }
        result?;
        closed
    }

    async fn transfer_phases(
        &self,
        session: &mut dyn Session,
        gateway: &GatewayConfig,
        transfer: &Transfer,
        connection: &mut dyn Connection,
    ) -> Result<()> {
        let subject = Subject::Transfer(transfer.id);
        let paths = gateway.paths_in_sequence();
        let mut cx = TransferContext {
            session,
            gateway,
            transfer,
            now: Utc::now(),
        };

        if transfer.allow_receive {
            for path in paths.iter().filter(|p| p.allow_receive) {
                tracing::info!("{} reading {}", gateway.name, path.path);
                let received = connection.receive_inputs(&mut cx, path).await?;
                if received.is_empty() {
                    continue;
                }
                let ids: Vec<_> = received.iter().map(|a| a.id).collect();
                cx.session
                    .add_transfer_attachments(transfer.id, AttachmentRole::Input, &ids)
                    .await?;
                cx.session
                    .create_audit(&subject, &format!("Received {}", path.name), &ids)
                    .await?;
                let documents = self
                    .autocreate_in(&mut *cx.session, &received, &path.doc_types, Some(transfer))
                    .await?;
                for document in &documents {
                    cx.session
                        .create_audit(&subject, &format!("Created {}", document.name), &[])
                        .await?;
                }
                tracing::info!(
                    "{} received {} file(s) on {}, created {} document(s)",
                    gateway.name,
                    received.len(),
                    path.name,
                    documents.len()
                );
            }
        }

        if transfer.allow_process {
            for document in cx.session.transfer_documents(transfer.id).await? {
                if !matches!(document.state, DocumentState::Draft | DocumentState::Prep) {
                    continue;
                }
                let executed = self.execute_in(&mut *cx.session, document.id).await?;
                let state = cx.session.document(document.id).await?.state;
                let body = if executed {
                    format!("Executed {}", document.name)
                } else if state == DocumentState::Prep {
                    format!("Prepared {}", document.name)
                } else {
                    continue;
                };
                cx.session.create_audit(&subject, &body, &[]).await?;
            }
        }

        if transfer.allow_send {
            for path in paths.iter().filter(|p| p.allow_send) {
                tracing::info!("{} writing {}", gateway.name, path.path);
                let sent = connection.send_outputs(&mut cx, path).await?;
                if sent.is_empty() {
                    continue;
                }
                let ids: Vec<_> = sent.iter().map(|a| a.id).collect();
                cx.session
                    .add_transfer_attachments(transfer.id, AttachmentRole::Output, &ids)
                    .await?;
                cx.session
                    .create_audit(&subject, &format!("Sent {}", path.name), &ids)
                    .await?;
            }
        }

        tracing::info!("{} transfer complete", gateway.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::store::MemoryStore;
    use crate::config::parse_config;
    use std::sync::Arc;
    use test_case::test_case;

    fn edi(options: &str) -> Edi {
        let config = parse_config(&format!(
            r#"
            {options}

            [gateways.partner]
            connection = "local"
            safety = "partner.enabled"
            "#
        ))
        .unwrap();
        Edi::new(config, Arc::new(MemoryStore::new())).unwrap()
    }

    #[test_case("", "Missing configuration option 'partner.enabled'" ; "missing option")]
    #[test_case("[options.partner]\nenabled = false", "Gateway disabled via configuration option 'partner.enabled'" ; "disabled")]
    fn test_safety_refusals(options: &str, message: &str) {
        let edi = edi(options);
        let err = edi.check_safety(edi.gateway("partner").unwrap()).unwrap_err();
        assert!(err.is_user_error());
        assert_eq!(err.to_string(), message);
    }

    #[test]
    fn test_safety_not_configured() {
        let edi = edi("");
        let mut gateway = edi.gateway("partner").unwrap().clone();
        gateway.safety = None;
        assert_eq!(
            edi.check_safety(&gateway).unwrap_err().to_string(),
            "Missing safety configuration option"
        );
    }

    #[tokio::test]
    async fn test_disabled_gateway_reports_issue_on_transfer() {
        let edi = edi("[options.partner]\nenabled = \"no\"");
        let report = edi.do_transfer("partner", None, None).await.unwrap();
        assert!(!report.is_success());
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].subject, Subject::Transfer(report.transfer.id));
        assert!(report.issues[0].trace.is_none());
        assert!(!edi.action_transfer("partner").await.unwrap());
    }

    #[tokio::test]
    async fn test_connection_test_raises_gateway_issue() {
        let edi = edi("");
        assert!(edi.action_test("partner").await.is_err());

        let mut session = edi.begin().await.unwrap();
        let issues = session
            .issues(&Subject::Gateway("partner".to_string()), true)
            .await
            .unwrap();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].summary.starts_with("Connection test failed: "));
    }

    #[tokio::test]
    async fn test_connection_test_succeeds() {
        let edi = edi("[options.partner]\nenabled = true");
        edi.action_test("partner").await.unwrap();
    }
}
