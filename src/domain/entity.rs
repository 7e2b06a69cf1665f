//! Internal target entities mirrored by synchronizers
//!
//! Entities are schemaless field maps grouped by kind. A field named
//! `active` controls visibility to deactivation sweeps; an entity without the
//! field counts as active.

use super::ids::EntityId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the activity flag field
pub const ACTIVE_FIELD: &str = "active";

/// A stored internal entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub kind: String,
    pub fields: Map<String, Value>,
}

impl Entity {
    /// Field value, `Null` when absent
    pub fn get(&self, field: &str) -> &Value {
        self.fields.get(field).unwrap_or(&Value::Null)
    }

    /// Field value rendered as a lookup key
    pub fn key(&self, field: &str) -> Option<String> {
        key_string(self.get(field))
    }

    /// Whether the entity is active
    pub fn is_active(&self) -> bool {
        !matches!(self.fields.get(ACTIVE_FIELD), Some(Value::Bool(false)))
    }

    /// Whether every filter field matches this entity exactly
    ///
    /// `active = true` also matches entities without an `active` field.
    pub fn matches(&self, filter: &Map<String, Value>) -> bool {
        filter.iter().all(|(field, expected)| {
            if field == ACTIVE_FIELD {
                if let Value::Bool(flag) = expected {
                    return self.is_active() == *flag;
                }
            }
            self.get(field) == expected
        })
    }
}

/// Renders a scalar JSON value as a natural key
///
/// Strings are used as-is, numbers and booleans are formatted. Null, empty
/// strings and compound values are not keys.
///
/// # Examples
///
/// ```
/// use edi::domain::entity::key_string;
/// use serde_json::json;
///
/// assert_eq!(key_string(&json!("E")), Some("E".to_string()));
/// assert_eq!(key_string(&json!(42)), Some("42".to_string()));
/// assert_eq!(key_string(&json!(null)), None);
/// ```
pub fn key_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Loose truthiness of a JSON value
///
/// Null, `false`, zero, empty strings and empty collections are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity(fields: Value) -> Entity {
        Entity {
            id: EntityId::new(1),
            kind: "partner".to_string(),
            fields: fields.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_missing_active_counts_as_active() {
        assert!(entity(json!({"name": "A"})).is_active());
        assert!(!entity(json!({"name": "A", "active": false})).is_active());
    }

    #[test]
    fn test_filter_matching() {
        let e = entity(json!({"name": "A", "customer": true}));
        let mut filter = Map::new();
        filter.insert("customer".into(), json!(true));
        assert!(e.matches(&filter));
        filter.insert("active".into(), json!(true));
        assert!(e.matches(&filter));
        filter.insert("active".into(), json!(false));
        assert!(!e.matches(&filter));
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!(0.0)));
        assert!(!is_truthy(&json!([])));
        assert!(is_truthy(&json!("x")));
        assert!(is_truthy(&json!(2)));
    }

    #[test]
    fn test_key_of_entity() {
        let e = entity(json!({"ref": 12}));
        assert_eq!(e.key("ref"), Some("12".to_string()));
        assert_eq!(e.key("missing"), None);
    }
}
