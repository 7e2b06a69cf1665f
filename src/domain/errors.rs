//! Domain error types
//!
//! All fallible operations in the crate return [`EdiError`]. Third-party error
//! types are converted at the boundary so they never leak into the public API.
//!
//! Errors fall into two tiers. User-facing errors ([`EdiError::User`],
//! [`EdiError::Validation`], [`EdiError::Configuration`]) carry a short message
//! and are reported without a stack trace. Everything else is unexpected and is
//! reported with the full error chain.

use thiserror::Error;

/// Main EDI error type
#[derive(Debug, Error)]
pub enum EdiError {
    /// Business-rule or data-integrity failure (illegal transition, size mismatch, bad input)
    #[error("{0}")]
    User(String),

    /// A target entity failed schema validation
    #[error("{0}")]
    Validation(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Transport errors (SFTP, SMTP, filesystem endpoints)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Backing store errors
    #[error("Store error: {0}")]
    Store(String),

    /// A referenced row does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

impl EdiError {
    /// Shorthand for a user-facing error
    pub fn user(message: impl Into<String>) -> Self {
        EdiError::User(message.into())
    }

    /// Whether this error belongs to the user-facing tier
    ///
    /// User-facing errors are attached to issues without a trace.
    ///
    /// # Examples
    ///
    /// ```
    /// use edi::domain::EdiError;
    ///
    /// assert!(EdiError::user("Cannot execute a Completed document").is_user_error());
    /// assert!(!EdiError::Store("connection reset".into()).is_user_error());
    /// ```
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            EdiError::User(_) | EdiError::Validation(_) | EdiError::Configuration(_)
        )
    }
}

impl From<std::io::Error> for EdiError {
    fn from(err: std::io::Error) -> Self {
        EdiError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for EdiError {
    fn from(err: serde_json::Error) -> Self {
        EdiError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for EdiError {
    fn from(err: toml::de::Error) -> Self {
        EdiError::Configuration(format!("TOML parse error: {err}"))
    }
}

// Malformed CSV input is a data problem, not a crash
impl From<csv::Error> for EdiError {
    fn from(err: csv::Error) -> Self {
        EdiError::User(format!("Malformed CSV input: {err}"))
    }
}

impl From<base64::DecodeError> for EdiError {
    fn from(err: base64::DecodeError) -> Self {
        EdiError::User(format!("Invalid base64 payload: {err}"))
    }
}

impl From<tokio_postgres::Error> for EdiError {
    fn from(err: tokio_postgres::Error) -> Self {
        EdiError::Store(err.to_string())
    }
}

impl From<ssh2::Error> for EdiError {
    fn from(err: ssh2::Error) -> Self {
        EdiError::Connection(format!("SSH error: {err}"))
    }
}

impl From<lettre::transport::smtp::Error> for EdiError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        EdiError::Connection(format!("SMTP error: {err}"))
    }
}

impl From<lettre::error::Error> for EdiError {
    fn from(err: lettre::error::Error) -> Self {
        EdiError::Other(format!("Failed to build mail: {err}"))
    }
}

impl From<lettre::address::AddressError> for EdiError {
    fn from(err: lettre::address::AddressError) -> Self {
        EdiError::User(format!("Invalid mail address: {err}"))
    }
}

impl From<tokio::task::JoinError> for EdiError {
    fn from(err: tokio::task::JoinError) -> Self {
        EdiError::Other(format!("Background task failed: {err}"))
    }
}
