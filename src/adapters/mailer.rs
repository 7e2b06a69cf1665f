//! Outbound mail delivery
//!
//! The mail connection hands finished documents to a [`Mailer`]. Production
//! uses [`SmtpMailer`]; tests use [`RecordingMailer`].

use crate::config::schema::MailConfig;
use crate::domain::{EdiError, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment as MailPart, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Mutex;

/// One message with file attachments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<(String, Vec<u8>)>,
}

/// Sends mail
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutboundMail) -> Result<()>;
}

/// SMTP delivery through `lettre`
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Builds the transport; no connection is opened until the first send
    pub fn new(config: &MailConfig) -> Result<Self> {
        use secrecy::ExposeSecret;

        let mut builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };
        builder = builder.port(config.port);
        if let Some(username) = &config.username {
            let password = config
                .password
                .as_ref()
                .map(|p| p.expose_secret().as_str().to_string())
                .unwrap_or_default();
            builder = builder.credentials(Credentials::new(username.clone(), password));
        }

        Ok(Self {
            transport: builder.build(),
            from: config.from.parse()?,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: &OutboundMail) -> Result<()> {
        let octet_stream = ContentType::parse("application/octet-stream")
            .map_err(|e| EdiError::Other(format!("Invalid content type: {e}")))?;

        let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(mail.body.clone()));
        for (name, data) in &mail.attachments {
            parts = parts.singlepart(MailPart::new(name.clone()).body(data.clone(), octet_stream.clone()));
        }

        let message = Message::builder()
            .from(self.from.clone())
            .to(mail.to.parse()?)
            .subject(mail.subject.clone())
            .multipart(parts)?;

        self.transport.send(message).await?;
        tracing::info!(to = %mail.to, subject = %mail.subject, "Mail sent");
        Ok(())
    }
}

/// Keeps sent mail in memory
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutboundMail>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far
    pub fn sent(&self) -> Vec<OutboundMail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: &OutboundMail) -> Result<()> {
        self.sent
            .lock()
            .map_err(|_| EdiError::Other("Recording mailer poisoned".to_string()))?
            .push(mail.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::secret_string;

    fn config(starttls: bool) -> MailConfig {
        MailConfig {
            host: "smtp.example.com".to_string(),
            port: 2525,
            username: Some("edi".to_string()),
            password: Some(secret_string("secret".to_string())),
            from: "EDI <edi@example.com>".to_string(),
            starttls,
        }
    }

    #[tokio::test]
    async fn test_smtp_mailer_builds_without_connecting() {
        assert!(SmtpMailer::new(&config(true)).is_ok());
        assert!(SmtpMailer::new(&config(false)).is_ok());
    }

    #[test]
    fn test_invalid_sender_is_user_error() {
        let mut config = config(false);
        config.from = "not an address".to_string();
        assert!(matches!(SmtpMailer::new(&config), Err(EdiError::User(_))));
    }

    #[tokio::test]
    async fn test_recording_mailer_keeps_messages() {
        let mailer = RecordingMailer::new();
        let mail = OutboundMail {
            to: "partner@example.com".to_string(),
            subject: "ORDERS/00001".to_string(),
            body: "See attached".to_string(),
            attachments: vec![("orders.csv".to_string(), b"a,b".to_vec())],
        };
        mailer.send(&mail).await.unwrap();
        assert_eq!(mailer.sent(), vec![mail]);
    }
}
