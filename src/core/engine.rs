//! The EDI engine
//!
//! [`Edi`] ties configuration, the store, the document model registry and
//! the connection factory together. Document actions, autodetection,
//! transfers and the RPC entry point are methods on it.

use crate::adapters::connection::ConnectionFactory;
use crate::adapters::store::{create_store, Session, Store};
use crate::config::schema::{DocumentTypeConfig, EdiConfig, GatewayConfig};
use crate::core::models::ModelRegistry;
use crate::domain::{EdiError, Result};
use std::sync::Arc;

#[derive(Clone)]
pub struct Edi {
    config: Arc<EdiConfig>,
    store: Arc<dyn Store>,
    models: ModelRegistry,
    connections: ConnectionFactory,
}

impl Edi {
    /// Engine over an existing store, with the built-in models
    ///
    /// # Errors
    ///
    /// Returns an error if the configured transports cannot be set up
    pub fn new(config: EdiConfig, store: Arc<dyn Store>) -> Result<Self> {
        let connections = ConnectionFactory::from_config(&config)?;
        Ok(Self {
            config: Arc::new(config),
            store,
            models: ModelRegistry::new(),
            connections,
        })
    }

    /// Engine over the configured store
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be created
    pub async fn from_config(config: EdiConfig) -> Result<Self> {
        let store = create_store(&config.store).await?;
        Self::new(config, store)
    }

    /// Replaces the connection factory
    pub fn with_connections(mut self, connections: ConnectionFactory) -> Self {
        self.connections = connections;
        self
    }

    /// Replaces the document model registry
    pub fn with_models(mut self, models: ModelRegistry) -> Self {
        self.models = models;
        self
    }

    pub fn config(&self) -> &EdiConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    pub fn connections(&self) -> &ConnectionFactory {
        &self.connections
    }

    /// Opens a session on the store
    pub async fn begin(&self) -> Result<Box<dyn Session>> {
        self.store.begin().await
    }

    /// # Errors
    ///
    /// Returns a configuration error for an unknown gateway
    pub fn gateway(&self, name: &str) -> Result<&GatewayConfig> {
        self.config
            .gateway(name)
            .ok_or_else(|| EdiError::Configuration(format!("Unknown gateway '{name}'")))
    }

    /// # Errors
    ///
    /// Returns a configuration error for an unknown document type
    pub fn document_type(&self, name: &str) -> Result<&DocumentTypeConfig> {
        self.config
            .document_type(name)
            .ok_or_else(|| EdiError::Configuration(format!("Unknown document type '{name}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::store::MemoryStore;
    use crate::config::parse_config;

    #[tokio::test]
    async fn test_lookups() {
        let config = parse_config(
            r#"
            [gateways.local]
            connection = "local"
            "#,
        )
        .unwrap();
        let edi = Edi::new(config, Arc::new(MemoryStore::new())).unwrap();
        assert!(edi.gateway("local").is_ok());
        assert!(matches!(edi.gateway("remote"), Err(EdiError::Configuration(_))));
        assert!(edi.document_type("unknown").is_ok());
        assert!(edi.document_type("orders").is_err());
    }
}
