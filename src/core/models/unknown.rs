use super::DocumentModel;
use crate::core::documents::DocumentContext;
use crate::domain::{EdiError, Result};
use async_trait::async_trait;

/// Holds inputs no other document type recognized
pub struct UnknownModel;

#[async_trait]
impl DocumentModel for UnknownModel {
    async fn prepare(&self, _cx: &mut DocumentContext<'_>) -> Result<()> {
        Err(EdiError::user("Unknown document type"))
    }
}
