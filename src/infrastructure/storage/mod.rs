//! Storage backends for the `DataStore` contract

pub mod hub;
pub mod json;
pub mod memory;
pub mod sqlite;

use std::sync::Arc;

pub use hub::SubscriptionHub;
pub use json::JsonStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::application::errors::ConfigError;
use crate::domain::traits::DataStore;
use crate::infrastructure::config::{StorageBackend, StorageConfig};

/// Build the backend named by the config. SQLite requires a running tokio runtime.
pub fn connect(config: &StorageConfig) -> Result<Arc<dyn DataStore>, ConfigError> {
    let store: Arc<dyn DataStore> = match config.backend {
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
        StorageBackend::Sqlite => {
            let path = config
                .path
                .clone()
                .ok_or_else(|| ConfigError::MissingField("storage.path".to_string()))?;
            Arc::new(SqliteStore::open(path))
        }
        StorageBackend::Json => {
            let path = config
                .path
                .clone()
                .ok_or_else(|| ConfigError::MissingField("storage.path".to_string()))?;
            Arc::new(JsonStore::new(path))
        }
    };

    tracing::info!("Using {} data store", store.backend());
    Ok(store)
}
