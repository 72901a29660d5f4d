//! Subscription fan-out shared by every store backend

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::application::handler::run_isolated;
use crate::domain::entities::DataChange;
use crate::domain::traits::{ChangeHandler, Subscription};

struct Subscriber {
    id: Uuid,
    sender: mpsc::UnboundedSender<DataChange>,
}

type Channels = RwLock<HashMap<String, Vec<Subscriber>>>;

/// Fans key changes out to subscribers.
///
/// Each subscriber drains its own queue on a dedicated task, so changes to one key
/// reach a given handler in the order they were published.
pub struct SubscriptionHub {
    channels: Arc<Channels>,
}

impl SubscriptionHub {
    pub fn new() -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Must be called from within a tokio runtime.
    pub fn subscribe(&self, channel: &str, handler: ChangeHandler) -> Subscription {
        let (sender, mut receiver) = mpsc::unbounded_channel::<DataChange>();
        let id = Uuid::new_v4();
        let cancelled = Arc::new(AtomicBool::new(false));

        self.channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(channel.to_string())
            .or_default()
            .push(Subscriber { id, sender });

        let flag = cancelled.clone();
        let label = format!("subscription on '{}'", channel);
        tokio::spawn(async move {
            while let Some(change) = receiver.recv().await {
                if flag.load(Ordering::Acquire) {
                    break;
                }
                if let Err(e) = run_isolated(&label, handler(change)).await {
                    tracing::warn!("Error in {}: {}", label, e);
                }
            }
        });

        let channels = Arc::downgrade(&self.channels);
        let key = channel.to_string();
        Subscription::new(channel, cancelled, move || {
            let Some(channels) = channels.upgrade() else {
                return;
            };
            let mut channels = channels.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(subscribers) = channels.get_mut(&key) {
                // dropping the sender ends the delivery task
                subscribers.retain(|s| s.id != id);
                if subscribers.is_empty() {
                    channels.remove(&key);
                }
            }
        })
    }

    /// Queue a change for every subscriber of `key`
    pub fn publish(&self, key: &str, value: Option<Value>) {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        let Some(subscribers) = channels.get(key) else {
            return;
        };

        for subscriber in subscribers {
            let change = DataChange {
                key: key.to_string(),
                value: value.clone(),
            };
            if subscriber.sender.send(change).is_err() {
                tracing::debug!("Subscriber on '{}' already gone", key);
            }
        }
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel)
            .map_or(0, Vec::len)
    }
}

impl Default for SubscriptionHub {
    fn default() -> Self {
        Self::new()
    }
}
