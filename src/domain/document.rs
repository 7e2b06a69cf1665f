//! Documents and the records derived from them

use super::ids::{DocumentId, EntityId, RecordId, TransferId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Document lifecycle state
///
/// `Draft -> Prep -> Done`, with `Cancel` reachable from `Draft` or `Prep`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentState {
    Draft,
    Prep,
    Done,
    Cancel,
}

impl DocumentState {
    /// Stable storage name
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentState::Draft => "draft",
            DocumentState::Prep => "prep",
            DocumentState::Done => "done",
            DocumentState::Cancel => "cancel",
        }
    }

    /// Human-readable name used in error messages
    ///
    /// # Examples
    ///
    /// ```
    /// use edi::domain::DocumentState;
    ///
    /// assert_eq!(DocumentState::Done.display_name(), "Completed");
    /// ```
    pub fn display_name(&self) -> &'static str {
        match self {
            DocumentState::Draft => "New",
            DocumentState::Prep => "Prepared",
            DocumentState::Done => "Completed",
            DocumentState::Cancel => "Cancelled",
        }
    }
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(DocumentState::Draft),
            "prep" => Ok(DocumentState::Prep),
            "done" => Ok(DocumentState::Done),
            "cancel" => Ok(DocumentState::Cancel),
            other => Err(format!("Invalid document state: {other}")),
        }
    }
}

/// One unit of work: inputs, derived records, outputs and a lifecycle state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub name: String,
    /// Name of the configured document type
    pub doc_type: String,
    pub state: DocumentState,
    pub prepare_date: Option<DateTime<Utc>>,
    pub execute_date: Option<DateTime<Utc>>,
    /// Transfer that created this document, if any
    pub transfer: Option<TransferId>,
    pub gateway: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Values for a new document
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub name: String,
    pub doc_type: String,
    pub transfer: Option<TransferId>,
    pub gateway: Option<String>,
}

/// A parsed line item belonging to a document
///
/// Synchronizer records carry a target entity (once resolved), use `name` as
/// the natural key, and may be flagged as deactivation records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub document: DocumentId,
    pub record_type: String,
    pub name: String,
    pub target: Option<EntityId>,
    pub values: Map<String, Value>,
    pub deactivate: bool,
    /// Validation failure recorded when the document does not fail fast
    pub error: Option<String>,
}

/// Values for a new record
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub record_type: String,
    pub name: String,
    pub target: Option<EntityId>,
    pub values: Map<String, Value>,
    pub deactivate: bool,
    /// Whether `name` is a natural key, unique within the document and record type
    pub keyed: bool,
}

impl NewRecord {
    /// A record carrying parsed values
    pub fn new(record_type: impl Into<String>, name: impl Into<String>, values: Map<String, Value>) -> Self {
        Self {
            record_type: record_type.into(),
            name: name.into(),
            target: None,
            values,
            deactivate: false,
            keyed: false,
        }
    }

    /// Marks `name` as the natural key of a synchronizer record
    pub fn keyed(mut self) -> Self {
        self.keyed = true;
        self
    }

    /// Links the record to an existing target entity
    pub fn with_target(mut self, target: Option<EntityId>) -> Self {
        self.target = target;
        self
    }

    /// Marks the record as a deactivation of its target
    pub fn deactivating(mut self) -> Self {
        self.deactivate = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trip() {
        for state in [
            DocumentState::Draft,
            DocumentState::Prep,
            DocumentState::Done,
            DocumentState::Cancel,
        ] {
            assert_eq!(DocumentState::from_str(state.as_str()).unwrap(), state);
        }
        assert!(DocumentState::from_str("archived").is_err());
    }

    #[test]
    fn test_display_names() {
        assert_eq!(DocumentState::Draft.display_name(), "New");
        assert_eq!(DocumentState::Prep.display_name(), "Prepared");
        assert_eq!(DocumentState::Cancel.display_name(), "Cancelled");
    }

    #[test]
    fn test_new_record_builders() {
        let record = NewRecord::new("partner", "E", Map::new())
            .with_target(Some(EntityId::new(9)))
            .deactivating();
        assert_eq!(record.target, Some(EntityId::new(9)));
        assert!(record.deactivate);
    }
}
