//! Connection factory
//!
//! Opens the backend matching a gateway's `connection` kind.

use super::local::LocalConnection;
use super::mail::MailConnection;
use super::sftp::{SftpConnection, SftpConnector, SshConnector};
use super::traits::Connection;
use crate::adapters::mailer::{Mailer, SmtpMailer};
use crate::config::schema::{ConnectionKind, EdiConfig, GatewayConfig};
use crate::config::ConfigOptions;
use crate::domain::{EdiError, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// Option key restricting local filesystem access
pub const JAIL_OPTION: &str = "edi.jail_path";

/// Creates connections for gateways
#[derive(Clone)]
pub struct ConnectionFactory {
    options: ConfigOptions,
    jail: Option<PathBuf>,
    mailer: Option<Arc<dyn Mailer>>,
    sftp: Arc<dyn SftpConnector>,
}

impl ConnectionFactory {
    /// Factory with the production transports
    ///
    /// # Errors
    ///
    /// Returns an error if the `[mail]` section cannot be turned into a
    /// mailer
    pub fn from_config(config: &EdiConfig) -> Result<Self> {
        let mailer = match &config.mail {
            Some(mail) => Some(Arc::new(SmtpMailer::new(mail)?) as Arc<dyn Mailer>),
            None => None,
        };
        Ok(Self {
            options: config.options.clone(),
            jail: config.options.get_str(JAIL_OPTION).map(PathBuf::from),
            mailer,
            sftp: Arc::new(SshConnector),
        })
    }

    /// Replaces the mail transport
    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    /// Replaces the SFTP transport
    pub fn with_sftp_connector(mut self, connector: Arc<dyn SftpConnector>) -> Self {
        self.sftp = connector;
        self
    }

    /// Effective password of `gateway`
    ///
    /// A `config_password` naming a missing option is an error rather than
    /// an attempt without credentials.
    fn password(&self, gateway: &GatewayConfig) -> Result<Option<String>> {
        if let Some(key) = &gateway.config_password {
            if self.options.get(key).is_none() {
                return Err(EdiError::user(format!(
                    "Missing configuration option '{key}'"
                )));
            }
        }
        Ok(gateway.resolve_password(&self.options))
    }

    /// Opens a connection for `gateway`
    ///
    /// # Errors
    ///
    /// Returns a connection error if the transport cannot be reached, and a
    /// user error for RPC gateways, whose connection is supplied by the caller
    pub async fn connect(&self, gateway: &GatewayConfig) -> Result<Box<dyn Connection>> {
        match gateway.connection {
            ConnectionKind::Local => Ok(Box::new(LocalConnection::new(self.jail.clone()))),
            ConnectionKind::Sftp => {
                let connector = Arc::clone(&self.sftp);
                let password = self.password(gateway)?;
                let gateway = gateway.clone();
                let fs = tokio::task::spawn_blocking(move || connector.connect(&gateway, password))
                    .await??;
                Ok(Box::new(SftpConnection::new(fs)))
            }
            ConnectionKind::Mail => {
                let mailer = self.mailer.clone().ok_or_else(|| {
                    EdiError::Configuration(format!(
                        "Gateway '{}' needs a [mail] section",
                        gateway.name
                    ))
                })?;
                Ok(Box::new(MailConnection::new(mailer)))
            }
            ConnectionKind::Rpc => Err(EdiError::user(format!(
                "Gateway '{}' only accepts files through the RPC entry point",
                gateway.name
            ))),
        }
    }
}
