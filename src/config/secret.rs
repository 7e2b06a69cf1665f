//! Credentials held in configuration
//!
//! Gateway passwords, the SMTP password and the store connection string are
//! [`SecretString`]s: zeroed on drop, redacted in `Debug`, and only readable
//! through `expose_secret()`. Serializing a configuration writes a mask in
//! their place.

use secrecy::{CloneableSecret, DebugSecret, Secret, SerializableSecret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroize;

/// Credential text
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SecretValue(String);

impl CloneableSecret for SecretValue {}
impl DebugSecret for SecretValue {}
impl SerializableSecret for SecretValue {}

/// Written in place of a credential
pub const MASK: &str = "********";

impl SecretValue {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Serialize for SecretValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(MASK)
    }
}

impl<'de> Deserialize<'de> for SecretValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(SecretValue)
    }
}

pub type SecretString = Secret<SecretValue>;

/// Wraps a credential read from configuration or the environment
pub fn secret_string(value: String) -> SecretString {
    Secret::new(SecretValue(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[derive(Deserialize)]
    struct Gateway {
        password: SecretString,
    }

    #[test]
    fn test_expose() {
        let secret = secret_string("sftp-password".to_string());
        assert_eq!(secret.expose_secret().as_str(), "sftp-password");
    }

    #[test]
    fn test_debug_is_redacted() {
        let gateway: Gateway = toml::from_str(r#"password = "hunter2""#).unwrap();
        let debug = format!("{:?}", gateway.password);
        assert!(!debug.contains("hunter2"));
        assert_eq!(gateway.password.expose_secret().as_str(), "hunter2");
    }

    #[test]
    fn test_serialize_masks() {
        let json = serde_json::to_string(&secret_string("hunter2".to_string())).unwrap();
        assert_eq!(json, format!("\"{MASK}\""));
    }
}
