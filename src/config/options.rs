//! Local configuration options
//!
//! `[options.<section>]` tables hold operator-controlled switches and secrets
//! referenced by key from elsewhere in the configuration, for example a
//! gateway safety catch `safety = "edi.production"` or
//! `config_password = "partner.sftp_password"`. A key without a section
//! refers to the `edi` section.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Section used for keys written without one
pub const DEFAULT_SECTION: &str = "edi";

/// `[options.<section>] key = value` tables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigOptions(BTreeMap<String, BTreeMap<String, toml::Value>>);

impl ConfigOptions {
    fn split(key: &str) -> (&str, &str) {
        match key.split_once('.') {
            Some((section, name)) => (section, name),
            None => (DEFAULT_SECTION, key),
        }
    }

    /// Raw option value
    pub fn get(&self, key: &str) -> Option<&toml::Value> {
        let (section, name) = Self::split(key);
        self.0.get(section).and_then(|s| s.get(name))
    }

    /// Option value rendered as a string
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key).map(|value| match value {
            toml::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Whether the option is present and truthy
    ///
    /// Returns `None` when the option is absent.
    ///
    /// # Examples
    ///
    /// ```
    /// use edi::config::ConfigOptions;
    ///
    /// let mut options = ConfigOptions::default();
    /// options.set("edi.production", "yes");
    /// options.set("partner.enabled", false);
    ///
    /// assert_eq!(options.is_enabled("production"), Some(true));
    /// assert_eq!(options.is_enabled("partner.enabled"), Some(false));
    /// assert_eq!(options.is_enabled("partner.missing"), None);
    /// ```
    pub fn is_enabled(&self, key: &str) -> Option<bool> {
        self.get(key).map(is_truthy)
    }

    /// Sets an option, creating its section if needed
    pub fn set(&mut self, key: &str, value: impl Into<toml::Value>) {
        let (section, name) = Self::split(key);
        self.0
            .entry(section.to_string())
            .or_default()
            .insert(name.to_string(), value.into());
    }
}

/// Truthiness of a configuration value
///
/// Strings are false when empty or one of `0`, `false`, `no`, `off`
/// (case-insensitive).
pub fn is_truthy(value: &toml::Value) -> bool {
    match value {
        toml::Value::Boolean(b) => *b,
        toml::Value::Integer(i) => *i != 0,
        toml::Value::Float(f) => *f != 0.0,
        toml::Value::String(s) => {
            let s = s.trim().to_ascii_lowercase();
            !(s.is_empty() || s == "0" || s == "false" || s == "no" || s == "off")
        }
        toml::Value::Array(a) => !a.is_empty(),
        toml::Value::Table(t) => !t.is_empty(),
        toml::Value::Datetime(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(toml::Value::Boolean(true), true ; "bool true")]
    #[test_case(toml::Value::Boolean(false), false ; "bool false")]
    #[test_case(toml::Value::Integer(1), true ; "one")]
    #[test_case(toml::Value::Integer(0), false ; "zero")]
    #[test_case(toml::Value::String("True".into()), true ; "string true")]
    #[test_case(toml::Value::String("off".into()), false ; "string off")]
    #[test_case(toml::Value::String("".into()), false ; "empty string")]
    #[test_case(toml::Value::String("No".into()), false ; "string no")]
    fn test_truthiness(value: toml::Value, expected: bool) {
        assert_eq!(is_truthy(&value), expected);
    }

    #[test]
    fn test_parse_sections() {
        let options: ConfigOptions = toml::from_str(
            r#"
[edi]
jail_path = "/srv/edi"
production = true

[partner]
sftp_password = "secret"
"#,
        )
        .unwrap();
        assert_eq!(options.get_str("jail_path").as_deref(), Some("/srv/edi"));
        assert_eq!(options.get_str("edi.production").as_deref(), Some("true"));
        assert_eq!(options.get_str("partner.sftp_password").as_deref(), Some("secret"));
        assert!(options.get("partner.other").is_none());
    }
}
