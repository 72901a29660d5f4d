//! File-based storage implementation

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::{OnceCell, RwLock};

use super::hub::SubscriptionHub;
use crate::application::errors::StorageError;
use crate::domain::traits::{ChangeHandler, DataStore, Subscription};

/// JSON document store. The whole key space lives in one file, loaded on first
/// use and rewritten after every change.
pub struct JsonStore {
    path: PathBuf,
    kv: OnceCell<RwLock<HashMap<String, Value>>>,
    hub: SubscriptionHub,
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kv: OnceCell::new(),
            hub: SubscriptionHub::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the document once; concurrent callers wait on the same load
    async fn ready(&self) -> Result<&RwLock<HashMap<String, Value>>, StorageError> {
        self.kv
            .get_or_try_init(|| async {
                let data = match tokio::fs::read_to_string(&self.path).await {
                    Ok(content) if content.trim().is_empty() => HashMap::new(),
                    Ok(content) => serde_json::from_str(&content)?,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                            tokio::fs::create_dir_all(parent).await?;
                        }
                        HashMap::new()
                    }
                    Err(e) => return Err(StorageError::BackendUnavailable(e.to_string())),
                };
                tracing::debug!("Loaded {} keys from {}", data.len(), self.path.display());
                Ok(RwLock::new(data))
            })
            .await
    }

    async fn persist(&self, kv: &HashMap<String, Value>) -> Result<(), StorageError> {
        let content = serde_json::to_string_pretty(kv)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl DataStore for JsonStore {
    fn backend(&self) -> &str {
        "json"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let kv = self.ready().await?.read().await;
        Ok(kv.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let mut kv = self.ready().await?.write().await;
        let previous = kv.insert(key.to_string(), value.clone());

        if let Err(e) = self.persist(&kv).await {
            match previous {
                Some(old) => kv.insert(key.to_string(), old),
                None => kv.remove(key),
            };
            return Err(e);
        }

        self.hub.publish(key, Some(value));
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StorageError> {
        let mut kv = self.ready().await?.write().await;
        let Some(previous) = kv.remove(key) else {
            return Ok(());
        };

        if let Err(e) = self.persist(&kv).await {
            kv.insert(key.to_string(), previous);
            return Err(e);
        }

        self.hub.publish(key, None);
        Ok(())
    }

    async fn subscribe(&self, channel: &str, handler: ChangeHandler) -> Result<Subscription, StorageError> {
        Ok(self.hub.subscribe(channel, handler))
    }

    fn subscriber_count(&self, channel: &str) -> usize {
        self.hub.subscriber_count(channel)
    }
}
