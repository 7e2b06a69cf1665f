//! Store factory
//!
//! Creates the configured store backend.

use super::memory::MemoryStore;
use super::traits::Store;
use crate::adapters::postgresql::PostgresStore;
use crate::config::schema::{StoreBackend, StoreConfig};
use crate::domain::{EdiError, Result};
use std::sync::Arc;

/// Create a store based on the configuration
///
/// The PostgreSQL schema is created on first use.
///
/// # Errors
///
/// Returns an error if the store cannot be created or its schema cannot be
/// initialized
pub async fn create_store(config: &StoreConfig) -> Result<Arc<dyn Store>> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::info!("Creating in-memory store");
            Ok(Arc::new(MemoryStore::new()) as Arc<dyn Store>)
        }
        StoreBackend::PostgreSQL => {
            let pg_config = config.postgresql.as_ref().ok_or_else(|| {
                EdiError::Configuration(
                    "store.postgresql section is required for the postgresql backend".to_string(),
                )
            })?;

            tracing::info!("Creating PostgreSQL store");
            let store = PostgresStore::new(pg_config.clone())?;
            store.ensure_schema().await?;
            tracing::info!(store = %store.describe(), "PostgreSQL store ready");

            Ok(Arc::new(store) as Arc<dyn Store>)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_is_default() {
        let store = create_store(&StoreConfig::default()).await.unwrap();
        assert_eq!(store.describe(), "memory");
        store.test_connection().await.unwrap();
    }

    #[tokio::test]
    async fn test_postgresql_without_section_fails() {
        let config = StoreConfig {
            backend: StoreBackend::PostgreSQL,
            postgresql: None,
        };
        assert!(matches!(
            create_store(&config).await,
            Err(EdiError::Configuration(_))
        ));
    }
}
