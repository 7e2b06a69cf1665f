//! Document command implementation
//!
//! Applies one state-machine action to a document.

use super::{open_engine, print_documents};
use crate::domain::{DocumentId, Subject};
use clap::{Args, ValueEnum};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentAction {
    Prepare,
    Unprepare,
    Execute,
    Cancel,
}

/// Arguments for the document command
#[derive(Args, Debug)]
pub struct DocumentArgs {
    /// Action to apply
    #[arg(value_enum)]
    pub action: DocumentAction,

    /// Document id
    pub id: DocumentId,
}

impl DocumentArgs {
    /// Execute the document command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let edi = match open_engine(config_path).await {
            Ok(edi) => edi,
            Err(code) => return Ok(code),
        };

        let outcome = match self.action {
            DocumentAction::Prepare => edi.action_prepare(self.id).await,
            DocumentAction::Execute => edi.action_execute(self.id).await,
            DocumentAction::Unprepare => edi.action_unprepare(self.id).await.map(|_| true),
            DocumentAction::Cancel => edi.action_cancel(self.id).await.map(|_| true),
        };
        let succeeded = match outcome {
            Ok(succeeded) => succeeded,
            Err(e) if e.is_user_error() => {
                println!("❌ {e}");
                return Ok(1);
            }
            Err(e) => return Err(e.into()),
        };

        let document = edi.document(self.id).await?;
        print_documents(std::slice::from_ref(&document));
        if succeeded {
            return Ok(0);
        }
        let mut session = edi.begin().await?;
        for issue in session.issues(&Subject::Document(self.id), true).await? {
            println!("  ⚠️  {}", issue.summary);
        }
        Ok(1)
    }
}
