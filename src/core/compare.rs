//! Per-field equality used to elide no-op updates
//!
//! A synchronizer compares the values it would write against the values a
//! target entity already holds. Each field gets a predicate derived from its
//! declared type.

use crate::config::schema::{EntitySchema, FieldType};
use crate::domain::entity::is_truthy;
use serde_json::Value;
use std::collections::HashMap;

/// Equality predicate for one field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    /// Entity ids compare by identity; two empty relations are equal
    Relation,
    /// Numbers compare after rounding to `digits` decimals
    Float { digits: u32 },
    /// Plain equality, optionally treating empty and absent as equal
    Default { empty_equals_absent: bool },
}

impl Comparator {
    /// Comparator for a field of the given declared type
    pub fn for_field(field_type: Option<&FieldType>, empty_equals_absent: bool) -> Self {
        match field_type {
            Some(FieldType::Relation { .. }) => Comparator::Relation,
            Some(FieldType::Float { digits }) => Comparator::Float { digits: *digits },
            _ => Comparator::Default {
                empty_equals_absent,
            },
        }
    }

    /// Whether `current` and `new` count as the same value
    ///
    /// # Examples
    ///
    /// ```
    /// use edi::core::compare::Comparator;
    /// use serde_json::json;
    ///
    /// let float = Comparator::Float { digits: 2 };
    /// assert!(float.equal(&json!(1.004), &json!(1.0)));
    /// assert!(!float.equal(&json!(1.01), &json!(1.0)));
    ///
    /// let text = Comparator::Default { empty_equals_absent: true };
    /// assert!(text.equal(&json!(null), &json!("")));
    /// ```
    pub fn equal(&self, current: &Value, new: &Value) -> bool {
        match self {
            Comparator::Relation => (!is_truthy(current) && !is_truthy(new)) || current == new,
            Comparator::Float { digits } => {
                let scale = 10f64.powi(*digits as i32);
                let round = |v: &Value| (as_float(v) * scale).round();
                round(current) == round(new)
            }
            Comparator::Default {
                empty_equals_absent,
            } => (*empty_equals_absent && !is_truthy(current) && !is_truthy(new)) || current == new,
        }
    }
}

/// Numeric value of a field; empty counts as zero
fn as_float(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        Value::Bool(true) => 1.0,
        _ => 0.0,
    }
}

/// Comparators for every field of one entity kind, built on demand
pub struct FieldComparators<'a> {
    schema: &'a EntitySchema,
    empty_equals_absent: bool,
    cache: HashMap<String, Comparator>,
}

impl<'a> FieldComparators<'a> {
    pub fn new(schema: &'a EntitySchema, empty_equals_absent: bool) -> Self {
        Self {
            schema,
            empty_equals_absent,
            cache: HashMap::new(),
        }
    }

    pub fn get(&mut self, field: &str) -> Comparator {
        if let Some(comparator) = self.cache.get(field) {
            return *comparator;
        }
        let comparator =
            Comparator::for_field(self.schema.field_type(field), self.empty_equals_absent);
        self.cache.insert(field.to_string(), comparator);
        comparator
    }

    /// Whether writing `values` over `current` would change nothing
    pub fn unchanged(
        &mut self,
        current: &serde_json::Map<String, Value>,
        values: &serde_json::Map<String, Value>,
    ) -> bool {
        values.iter().all(|(field, new)| {
            let old = current.get(field).unwrap_or(&Value::Null);
            self.get(field).equal(old, new)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test_case(json!(null), json!(null), true ; "both empty")]
    #[test_case(json!(3), json!(3), true ; "same id")]
    #[test_case(json!(3), json!(4), false ; "different id")]
    #[test_case(json!(null), json!(4), false ; "newly set")]
    fn test_relation(current: Value, new: Value, expected: bool) {
        assert_eq!(Comparator::Relation.equal(&current, &new), expected);
    }

    #[test_case(true, json!(false), json!(""), true ; "empty equals absent")]
    #[test_case(false, json!(false), json!(""), false ; "strict empty")]
    #[test_case(false, json!(null), json!(null), true ; "strict both null")]
    #[test_case(true, json!("Ms"), json!("Dr"), false ; "changed text")]
    #[test_case(true, json!(0), json!(null), true ; "zero and null")]
    fn test_default(eea: bool, current: Value, new: Value, expected: bool) {
        let comparator = Comparator::Default {
            empty_equals_absent: eea,
        };
        assert_eq!(comparator.equal(&current, &new), expected);
    }

    #[test]
    fn test_float_rounding() {
        let comparator = Comparator::Float { digits: 3 };
        assert!(comparator.equal(&json!(0.1234), &json!(0.1231)));
        assert!(!comparator.equal(&json!(0.124), &json!(0.123)));
        assert!(comparator.equal(&json!(null), &json!(0.0)));
    }

    #[test]
    fn test_field_comparators_follow_schema() {
        let schema: EntitySchema = toml::from_str(
            r#"
            key = "ref"
            [fields]
            weight = { type = "float", digits = 1 }
            parent = { type = "relation", target = "partner" }
            "#,
        )
        .unwrap();
        let mut comparators = FieldComparators::new(&schema, true);
        assert_eq!(comparators.get("weight"), Comparator::Float { digits: 1 });
        assert_eq!(comparators.get("parent"), Comparator::Relation);
        assert_eq!(
            comparators.get("title"),
            Comparator::Default {
                empty_equals_absent: true
            }
        );

        let current = json!({"ref": "E", "weight": 1.02}).as_object().cloned().unwrap();
        let same = json!({"ref": "E", "weight": 1.0}).as_object().cloned().unwrap();
        let changed = json!({"ref": "E", "title": "Dr"}).as_object().cloned().unwrap();
        assert!(comparators.unchanged(&current, &same));
        assert!(!comparators.unchanged(&current, &changed));
    }
}
