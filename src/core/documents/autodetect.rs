//! Document type autodetection
//!
//! Each candidate type, in autodetection order, claims the attachments its
//! model recognizes; whatever is left becomes one document of the unknown
//! type, or of the only candidate type when exactly one was given.

use crate::adapters::store::Session;
use crate::core::engine::Edi;
use crate::domain::{Attachment, AttachmentId, Document, EdiError, NewAttachment, NewDocument, Result, Transfer};
use std::collections::HashMap;

impl Edi {
    /// Creates documents from unclassified inputs
    ///
    /// Documents come back in the order of their first input. With an empty
    /// `doc_types` every configured type is a candidate.
    ///
    /// # Errors
    ///
    /// Fails on an unknown document type or model
    pub async fn autocreate_in(
        &self,
        session: &mut dyn Session,
        inputs: &[Attachment],
        doc_types: &[String],
        origin: Option<&Transfer>,
    ) -> Result<Vec<Document>> {
        for name in doc_types {
            self.document_type(name)?;
        }
        let position: HashMap<AttachmentId, usize> =
            inputs.iter().enumerate().map(|(i, a)| (a.id, i)).collect();

        let mut pool: Vec<Attachment> = inputs.to_vec();
        let mut groups: Vec<(String, Vec<AttachmentId>)> = Vec::new();
        for doc_type in self.config().document_types_in_sequence(doc_types) {
            if pool.is_empty() {
                break;
            }
            let model = self.models().get(&doc_type.model)?;
            for group in model.autotype(doc_type, self.config(), &pool)? {
                let claimed: Vec<AttachmentId> = group
                    .into_iter()
                    .filter(|id| pool.iter().any(|a| a.id == *id))
                    .collect();
                if claimed.is_empty() {
                    continue;
                }
                pool.retain(|a| !claimed.contains(&a.id));
                groups.push((doc_type.name.clone(), claimed));
            }
        }
        if !pool.is_empty() {
            let leftover = match doc_types {
                [only] => only.clone(),
                _ => self.config().unknown_document_type().to_string(),
            };
            groups.push((leftover, pool.iter().map(|a| a.id).collect()));
        }
        groups.sort_by_key(|(_, ids)| {
            ids.iter()
                .filter_map(|id| position.get(id))
                .min()
                .copied()
                .unwrap_or(usize::MAX)
        });

        let mut documents = Vec::with_capacity(groups.len());
        for (doc_type, ids) in groups {
            let document = self.create_document_in(session, &doc_type, origin).await?;
            session.attach(&ids, document.id).await?;
            documents.push(document);
        }
        Ok(documents)
    }

    /// Creates an empty document named from its type's sequence
    pub async fn create_document_in(
        &self,
        session: &mut dyn Session,
        doc_type: &str,
        origin: Option<&Transfer>,
    ) -> Result<Document> {
        let prefix = self.document_type(doc_type)?.name_prefix();
        let number = session.next_sequence(&prefix).await?;
        let document = session
            .create_document(NewDocument {
                name: format!("{prefix}{number:05}"),
                doc_type: doc_type.to_string(),
                transfer: origin.map(|t| t.id),
                gateway: origin.map(|t| t.gateway.clone()),
            })
            .await?;
        tracing::info!(document = %document.name, doc_type, "Created document");
        Ok(document)
    }

    /// Creates and executes one input-less document per type
    ///
    /// # Errors
    ///
    /// Fails on an unknown document type; execution failures are raised as
    /// issues on the documents
    pub async fn autoemit_in(
        &self,
        session: &mut dyn Session,
        doc_types: &[String],
    ) -> Result<Vec<Document>> {
        let mut documents = Vec::with_capacity(doc_types.len());
        for doc_type in doc_types {
            let document = self.create_document_in(session, doc_type, None).await?;
            self.execute_in(session, document.id).await?;
            documents.push(session.document(document.id).await?);
        }
        Ok(documents)
    }

    /// [`Edi::autoemit_in`] in its own transaction
    pub async fn autoemit(&self, doc_types: &[String]) -> Result<Vec<Document>> {
        let mut session = self.begin().await?;
        let documents = self.autoemit_in(session.as_mut(), doc_types).await?;
        session.commit().await?;
        Ok(documents)
    }

    /// Stores local files as inputs and autocreates documents from them
    ///
    /// # Errors
    ///
    /// Fails when no files are given or on an unknown document type
    pub async fn import(
        &self,
        files: Vec<(String, Vec<u8>)>,
        doc_types: &[String],
    ) -> Result<Vec<Document>> {
        if files.is_empty() {
            return Err(EdiError::user("Nothing to import"));
        }
        let mut session = self.begin().await?;
        let mut inputs = Vec::with_capacity(files.len());
        for (name, data) in files {
            inputs.push(session.create_attachment(NewAttachment::input(name, data)).await?);
        }
        let documents = self
            .autocreate_in(session.as_mut(), &inputs, doc_types, None)
            .await?;
        session.commit().await?;
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::store::MemoryStore;
    use crate::config::parse_config;
    use crate::domain::DocumentState;
    use std::sync::Arc;

    fn edi() -> Edi {
        let config = parse_config(
            r#"
            [entities."res.users"]
            [entities.partner]

            [document_types.model]
            model = "raw"
            sequence = 10

            [document_types.orders]
            model = "csv"
            sequence = 20
            prefix = "ORD/"
            csv = { pattern = "orders_*.csv" }
            "#,
        )
        .unwrap();
        Edi::new(config, Arc::new(MemoryStore::new())).unwrap()
    }

    async fn inputs(session: &mut dyn Session, names: &[&str]) -> Vec<Attachment> {
        let mut inputs = Vec::new();
        for name in names {
            inputs.push(
                session
                    .create_attachment(NewAttachment::input(*name, b"x".to_vec()))
                    .await
                    .unwrap(),
            );
        }
        inputs
    }

    #[tokio::test]
    async fn test_unrecognized_inputs_go_to_unknown() {
        let edi = edi();
        let mut session = edi.begin().await.unwrap();
        let inputs = inputs(session.as_mut(), &["dummy.txt", "res.users.csv"]).await;

        let docs = edi
            .autocreate_in(session.as_mut(), &inputs, &[], None)
            .await
            .unwrap();
        let types: Vec<&str> = docs.iter().map(|d| d.doc_type.as_str()).collect();
        assert_eq!(types, vec!["unknown", "model"]);
        assert!(docs.iter().all(|d| d.state == DocumentState::Draft));
    }

    #[tokio::test]
    async fn test_documents_follow_input_order() {
        let edi = edi();
        let mut session = edi.begin().await.unwrap();
        let inputs = inputs(
            session.as_mut(),
            &["orders_2.csv", "partner.csv", "stray.bin", "orders_1.csv"],
        )
        .await;

        let docs = edi
            .autocreate_in(session.as_mut(), &inputs, &[], None)
            .await
            .unwrap();
        let summary: Vec<(&str, &str)> = docs
            .iter()
            .map(|d| (d.doc_type.as_str(), d.name.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("orders", "ORD/00001"),
                ("model", "MODEL/00001"),
                ("unknown", "UNKNOWN/00001"),
                ("orders", "ORD/00002"),
            ]
        );
    }

    #[tokio::test]
    async fn test_single_candidate_takes_leftovers() {
        let edi = edi();
        let mut session = edi.begin().await.unwrap();
        let inputs = inputs(session.as_mut(), &["a.txt", "b.txt"]).await;

        let docs = edi
            .autocreate_in(session.as_mut(), &inputs, &["orders".to_string()], None)
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].doc_type, "orders");
        let attached = session
            .document_attachments(docs[0].id, crate::domain::AttachmentRole::Input)
            .await
            .unwrap();
        assert_eq!(attached.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_candidate_type() {
        let edi = edi();
        let mut session = edi.begin().await.unwrap();
        let err = edi
            .autocreate_in(session.as_mut(), &[], &["idoc".to_string()], None)
            .await
            .unwrap_err();
        assert!(matches!(err, EdiError::Configuration(_)));
    }
}
