//! Document actions
//!
//! The `*_in` variants work inside a caller's session (a transfer runs
//! many documents in one transaction). The `action_*` variants open their
//! own session and commit it.

use super::context::{ordered_record_types, DocumentContext};
use crate::adapters::store::Session;
use crate::core::engine::Edi;
use crate::core::issues::{raise_issue, IssueTarget};
use crate::domain::{
    AttachmentRole, Document, DocumentId, DocumentState, EdiError, IssueLinks, Result, Subject,
};
use crate::log_document_action;
use chrono::Utc;

/// Issue target of a document, linked to its transfer and gateway
pub fn issue_target(document: &Document) -> IssueTarget {
    IssueTarget {
        subject: Subject::Document(document.id),
        links: IssueLinks {
            document: Some(document.id),
            gateway: document.gateway.clone(),
            transfer: document.transfer,
        },
        name: document.name.clone(),
    }
}

fn illegal(verb: &str, document: &Document) -> EdiError {
    EdiError::user(format!(
        "Cannot {} a {} document",
        verb,
        document.state.display_name()
    ))
}

/// Which model hook to run
#[derive(Clone, Copy)]
enum Step {
    Prepare,
    Execute,
}

impl Edi {
    /// Runs a model hook inside a savepoint
    ///
    /// On failure the savepoint is rolled back and an issue is raised;
    /// returns whether the hook succeeded.
    async fn run_model(
        &self,
        session: &mut dyn Session,
        document: &Document,
        step: Step,
    ) -> Result<bool> {
        let savepoint = session.savepoint().await?;
        let result = async {
            let doc_type = self.document_type(&document.doc_type)?;
            let model = self.models().get(&doc_type.model)?;
            let mut cx = DocumentContext {
                config: self.config(),
                session: &mut *session,
                document,
                doc_type,
            };
            match step {
                Step::Prepare => model.prepare(&mut cx).await,
                Step::Execute => model.execute(&mut cx).await,
            }
        }
        .await;

        match result {
            Ok(()) => {
                session.release(savepoint).await?;
                Ok(true)
            }
            Err(err) => {
                session.rollback_to(savepoint).await?;
                session.release(savepoint).await?;
                let context = match step {
                    Step::Prepare => "Preparation failed",
                    Step::Execute => "Execution failed",
                };
                raise_issue(session, &issue_target(document), context, &err).await?;
                Ok(false)
            }
        }
    }

    async fn audit_attachments(
        &self,
        session: &mut dyn Session,
        document: &Document,
        role: AttachmentRole,
    ) -> Result<()> {
        let ids: Vec<_> = session
            .document_attachments(document.id, role)
            .await?
            .iter()
            .map(|a| a.id)
            .collect();
        let body = match role {
            AttachmentRole::Input => "Input attachments",
            AttachmentRole::Output => "Output attachments",
        };
        session
            .create_audit(&Subject::Document(document.id), body, &ids)
            .await
    }

    async fn prepare_locked(&self, session: &mut dyn Session, document: &mut Document) -> Result<bool> {
        if document.state != DocumentState::Draft {
            return Err(illegal("prepare", document));
        }
        session.close_issues(&Subject::Document(document.id)).await?;
        self.audit_attachments(session, document, AttachmentRole::Input)
            .await?;

        if !self.run_model(session, document, Step::Prepare).await? {
            return Ok(false);
        }
        document.prepare_date = Some(Utc::now());
        document.state = DocumentState::Prep;
        session.update_document(document).await?;
        log_document_action!(document.name, "prepare", document.state);
        Ok(true)
    }

    /// Parses a draft document into records
    ///
    /// # Errors
    ///
    /// Fails if the document is not a draft; model failures raise an issue
    /// and return `Ok(false)`
    pub async fn prepare_in(&self, session: &mut dyn Session, id: DocumentId) -> Result<bool> {
        session.lock_document(id).await?;
        let mut document = session.document(id).await?;
        self.prepare_locked(session, &mut document).await
    }

    /// Executes a document, preparing it first if it is still a draft
    ///
    /// # Errors
    ///
    /// Fails if the document is neither draft nor prepared; model failures
    /// raise an issue and return `Ok(false)`
    pub async fn execute_in(&self, session: &mut dyn Session, id: DocumentId) -> Result<bool> {
        session.lock_document(id).await?;
        let mut document = session.document(id).await?;
        if document.state == DocumentState::Draft
            && !self.prepare_locked(session, &mut document).await?
        {
            return Ok(false);
        }
        if document.state != DocumentState::Prep {
            return Err(illegal("execute", &document));
        }
        session.close_issues(&Subject::Document(id)).await?;

        if !self.run_model(session, &document, Step::Execute).await? {
            return Ok(false);
        }
        self.audit_attachments(session, &document, AttachmentRole::Output)
            .await?;
        document.execute_date = Some(Utc::now());
        document.state = DocumentState::Done;
        session.update_document(&document).await?;
        log_document_action!(document.name, "execute", document.state);
        Ok(true)
    }

    /// Deletes a prepared document's records and returns it to draft
    ///
    /// # Errors
    ///
    /// Fails unless the document is prepared
    pub async fn unprepare_in(&self, session: &mut dyn Session, id: DocumentId) -> Result<()> {
        session.lock_document(id).await?;
        let mut document = session.document(id).await?;
        if document.state != DocumentState::Prep {
            return Err(illegal("unprepare", &document));
        }
        let doc_type = self.document_type(&document.doc_type)?;
        for record_type in ordered_record_types(self.config(), doc_type).iter().rev() {
            let deleted = session.delete_records(id, &record_type.name).await?;
            tracing::debug!(document = %document.name, record_type = %record_type.name, deleted, "Deleted records");
        }
        document.prepare_date = None;
        document.state = DocumentState::Draft;
        session.update_document(&document).await?;
        log_document_action!(document.name, "unprepare", document.state);
        Ok(())
    }

    /// Cancels a document that is not done
    ///
    /// # Errors
    ///
    /// Fails for done or already cancelled documents
    pub async fn cancel_in(&self, session: &mut dyn Session, id: DocumentId) -> Result<()> {
        session.lock_document(id).await?;
        let mut document = session.document(id).await?;
        if !matches!(document.state, DocumentState::Draft | DocumentState::Prep) {
            return Err(illegal("cancel", &document));
        }
        session.close_issues(&Subject::Document(id)).await?;
        document.state = DocumentState::Cancel;
        session.update_document(&document).await?;
        log_document_action!(document.name, "cancel", document.state);
        Ok(())
    }

    /// [`Edi::prepare_in`] in its own transaction
    pub async fn action_prepare(&self, id: DocumentId) -> Result<bool> {
        let mut session = self.begin().await?;
        let prepared = self.prepare_in(session.as_mut(), id).await?;
        session.commit().await?;
        Ok(prepared)
    }

    /// [`Edi::execute_in`] in its own transaction
    pub async fn action_execute(&self, id: DocumentId) -> Result<bool> {
        let mut session = self.begin().await?;
        let executed = self.execute_in(session.as_mut(), id).await?;
        session.commit().await?;
        Ok(executed)
    }

    /// [`Edi::unprepare_in`] in its own transaction
    pub async fn action_unprepare(&self, id: DocumentId) -> Result<()> {
        let mut session = self.begin().await?;
        self.unprepare_in(session.as_mut(), id).await?;
        session.commit().await
    }

    /// [`Edi::cancel_in`] in its own transaction
    pub async fn action_cancel(&self, id: DocumentId) -> Result<()> {
        let mut session = self.begin().await?;
        self.cancel_in(session.as_mut(), id).await?;
        session.commit().await
    }

    /// Reads a document
    pub async fn document(&self, id: DocumentId) -> Result<Document> {
        let mut session = self.begin().await?;
        session.document(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::store::MemoryStore;
    use crate::config::parse_config;
    use crate::domain::{NewAttachment, NewDocument};
    use std::sync::Arc;

    fn edi() -> Edi {
        let config = parse_config(
            r#"
            [entities.partner]
            required = ["name"]

            [document_types.partners]
            model = "raw"
            "#,
        )
        .unwrap();
        Edi::new(config, Arc::new(MemoryStore::new())).unwrap()
    }

    async fn document(edi: &Edi, doc_type: &str, input: Option<(&str, &[u8])>) -> Document {
        let mut session = edi.begin().await.unwrap();
        let document = session
            .create_document(NewDocument {
                name: "DOC/00001".to_string(),
                doc_type: doc_type.to_string(),
                transfer: None,
                gateway: None,
            })
            .await
            .unwrap();
        if let Some((name, data)) = input {
            let attachment = session
                .create_attachment(NewAttachment::input(name, data.to_vec()))
                .await
                .unwrap();
            session.attach(&[attachment.id], document.id).await.unwrap();
        }
        session.commit().await.unwrap();
        document
    }

    async fn open_issues(edi: &Edi, id: DocumentId) -> Vec<String> {
        let mut session = edi.begin().await.unwrap();
        session
            .issues(&Subject::Document(id), true)
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.summary)
            .collect()
    }

    #[tokio::test]
    async fn test_execute_from_draft_runs_prepare() {
        let edi = edi();
        let doc = document(&edi, "partners", Some(("partner.csv", b"name\nAcme\n"))).await;

        assert!(edi.action_execute(doc.id).await.unwrap());
        let doc = edi.document(doc.id).await.unwrap();
        assert_eq!(doc.state, DocumentState::Done);
        assert!(doc.prepare_date.is_some());
        assert!(doc.execute_date.is_some());

        let mut session = edi.begin().await.unwrap();
        let records = session.records(doc.id, "raw").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "00001");
    }

    #[tokio::test]
    async fn test_execute_done_document_is_refused() {
        let edi = edi();
        let doc = document(&edi, "partners", Some(("partner.csv", b"name\nAcme\n"))).await;
        assert!(edi.action_execute(doc.id).await.unwrap());

        let err = edi.action_execute(doc.id).await.unwrap_err();
        assert_eq!(err.to_string(), "Cannot execute a Completed document");
        assert_eq!(edi.document(doc.id).await.unwrap().state, DocumentState::Done);
        assert!(edi.action_cancel(doc.id).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_prepare_raises_issue_and_stays_draft() {
        let edi = edi();
        let doc = document(&edi, "unknown", Some(("dummy.txt", b"x"))).await;

        assert!(!edi.action_prepare(doc.id).await.unwrap());
        assert_eq!(edi.document(doc.id).await.unwrap().state, DocumentState::Draft);
        assert_eq!(
            open_issues(&edi, doc.id).await,
            vec!["Preparation failed: Unknown document type"]
        );

        // the next action closes the stale issue
        edi.action_cancel(doc.id).await.unwrap();
        assert!(open_issues(&edi, doc.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_execute_rolls_back_entities() {
        let edi = edi();
        let doc = document(&edi, "partners", Some(("partner.csv", b"name\nAcme\n\"\"\n"))).await;

        assert!(!edi.action_execute(doc.id).await.unwrap());
        assert_eq!(edi.document(doc.id).await.unwrap().state, DocumentState::Prep);

        let mut session = edi.begin().await.unwrap();
        let partners = session
            .search_entities("partner", &serde_json::Map::new())
            .await
            .unwrap();
        assert!(partners.is_empty());
        let issues = open_issues(&edi, doc.id).await;
        assert_eq!(issues.len(), 1);
        assert!(issues[0].starts_with("Execution failed: "));
    }

    #[tokio::test]
    async fn test_unprepare_and_cancel() {
        let edi = edi();
        let doc = document(&edi, "partners", Some(("partner.csv", b"name\nAcme\n"))).await;

        assert!(edi.action_prepare(doc.id).await.unwrap());
        let err = edi.action_prepare(doc.id).await.unwrap_err();
        assert_eq!(err.to_string(), "Cannot prepare a Prepared document");

        edi.action_unprepare(doc.id).await.unwrap();
        let draft = edi.document(doc.id).await.unwrap();
        assert_eq!(draft.state, DocumentState::Draft);
        assert!(draft.prepare_date.is_none());
        assert!(edi.action_unprepare(doc.id).await.is_err());

        edi.action_cancel(doc.id).await.unwrap();
        assert_eq!(edi.document(doc.id).await.unwrap().state, DocumentState::Cancel);
    }
}
