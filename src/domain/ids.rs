//! Domain identifier types
//!
//! Every stored row is addressed by a numeric identifier allocated by the
//! backing store. Each row kind gets its own newtype so that, for example, a
//! document id can never be passed where a transfer id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw store identifier
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Returns the raw store identifier
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<i64>()
                    .map(Self)
                    .map_err(|_| format!("Invalid {} id: {}", $label, s))
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> i64 {
                id.0
            }
        }
    };
}

row_id!(
    /// Identifier of a stored binary attachment
    ///
    /// # Examples
    ///
    /// ```
    /// use edi::domain::ids::AttachmentId;
    /// use std::str::FromStr;
    ///
    /// let id = AttachmentId::from_str("42").unwrap();
    /// assert_eq!(id.get(), 42);
    /// assert!(AttachmentId::from_str("abc").is_err());
    /// ```
    AttachmentId,
    "attachment"
);

row_id!(
    /// Identifier of an EDI document
    DocumentId,
    "document"
);

row_id!(
    /// Identifier of a parsed record belonging to a document
    RecordId,
    "record"
);

row_id!(
    /// Identifier of a single gateway transfer
    TransferId,
    "transfer"
);

row_id!(
    /// Identifier of an issue ticket
    IssueId,
    "issue"
);

row_id!(
    /// Identifier of an internal target entity
    EntityId,
    "entity"
);

row_id!(
    /// Identifier of a sent-mail record
    MailId,
    "mail"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display_and_parse() {
        let id = DocumentId::new(7);
        assert_eq!(id.to_string(), "7");
        assert_eq!(DocumentId::from_str(" 7 ").unwrap(), id);
    }

    #[test]
    fn test_id_parse_error_names_kind() {
        let err = TransferId::from_str("x").unwrap_err();
        assert!(err.contains("transfer"));
    }

    #[test]
    fn test_id_serde_transparent() {
        let json = serde_json::to_string(&EntityId::new(3)).unwrap();
        assert_eq!(json, "3");
        let back: EntityId = serde_json::from_str("3").unwrap();
        assert_eq!(back, EntityId::new(3));
    }

    #[test]
    fn test_ids_are_ordered() {
        let mut ids = vec![AttachmentId::new(3), AttachmentId::new(1)];
        ids.sort();
        assert_eq!(ids, vec![AttachmentId::new(1), AttachmentId::new(3)]);
    }
}
