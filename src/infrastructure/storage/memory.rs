//! In-process storage implementation

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::hub::SubscriptionHub;
use crate::application::errors::StorageError;
use crate::domain::traits::{ChangeHandler, DataStore, Subscription};

/// Memory-backed store. Change feeds only cover this process.
pub struct MemoryStore {
    kv: RwLock<HashMap<String, Value>>,
    hub: SubscriptionHub,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            kv: RwLock::new(HashMap::new()),
            hub: SubscriptionHub::new(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    fn backend(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let kv = self.kv.read().await;
        Ok(kv.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let mut kv = self.kv.write().await;
        kv.insert(key.to_string(), value.clone());
        // published under the lock so subscribers see writes in store order
        self.hub.publish(key, Some(value));
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StorageError> {
        let mut kv = self.kv.write().await;
        if kv.remove(key).is_some() {
            self.hub.publish(key, None);
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str, handler: ChangeHandler) -> Result<Subscription, StorageError> {
        Ok(self.hub.subscribe(channel, handler))
    }

    fn subscriber_count(&self, channel: &str) -> usize {
        self.hub.subscriber_count(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handler::listener;
    use crate::domain::entities::DataChange;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", json!({"a": 1})).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!({"a": 1})));

        store.del("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        // deleting a missing key is fine
        store.del("k").await.unwrap();
    }

    #[tokio::test]
    async fn test_subscription_delivers_in_order_until_cancelled() {
        let store = MemoryStore::new();
        let (tx, mut rx) = mpsc::unbounded_channel::<DataChange>();

        let sub = store
            .subscribe(
                "k",
                listener(move |change: DataChange| {
                    let tx = tx.clone();
                    async move {
                        let _ = tx.send(change);
                        Ok(())
                    }
                }),
            )
            .await
            .unwrap();
        assert_eq!(store.subscriber_count("k"), 1);

        store.set("other", json!(0)).await.unwrap();
        store.set("k", json!(1)).await.unwrap();
        store.set("k", json!(2)).await.unwrap();

        for expected in [1, 2] {
            let change = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(change.key, "k");
            assert_eq!(change.value, Some(json!(expected)));
        }

        sub.cancel();
        sub.cancel();
        assert!(sub.is_cancelled());
        assert_eq!(store.subscriber_count("k"), 0);

        store.set("k", json!(3)).await.unwrap();
        let late = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(!matches!(late, Ok(Some(_))), "handler fired after cancel");
    }

    #[tokio::test]
    async fn test_delete_notifies_with_none() {
        let store = MemoryStore::new();
        store.set("k", json!("v")).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel::<DataChange>();
        let _sub = store
            .subscribe(
                "k",
                listener(move |change: DataChange| {
                    let tx = tx.clone();
                    async move {
                        let _ = tx.send(change);
                        Ok(())
                    }
                }),
            )
            .await
            .unwrap();

        store.del("k").await.unwrap();
        let change = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(change.value, None);
    }
}
