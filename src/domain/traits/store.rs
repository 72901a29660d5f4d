use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::application::errors::StorageError;
use crate::application::handler::Listener;
use crate::domain::entities::DataChange;

/// Callback invoked when a subscribed key changes
pub type ChangeHandler = Listener<DataChange>;

/// DataStore trait - key/value persistence with change subscriptions.
///
/// Backends that connect asynchronously must hold operations until they are
/// ready instead of failing them.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Short backend name for logs
    fn backend(&self) -> &str;

    /// Stored value, or `None` when the key is unset
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Replace the value at `key`
    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;

    async fn del(&self, key: &str) -> Result<(), StorageError>;

    /// Invoke `handler` for every later change to `channel`, in change order
    async fn subscribe(&self, channel: &str, handler: ChangeHandler) -> Result<Subscription, StorageError>;

    /// Number of live subscriptions on `channel`
    fn subscriber_count(&self, channel: &str) -> usize;
}

/// A live change subscription. Clones share the same cancellation state.
#[derive(Clone)]
pub struct Subscription {
    channel: String,
    cancelled: Arc<AtomicBool>,
    on_cancel: Arc<dyn Fn() + Send + Sync>,
}

impl Subscription {
    /// `cancelled` must be the flag the backend checks before every delivery
    pub fn new(
        channel: impl Into<String>,
        cancelled: Arc<AtomicBool>,
        on_cancel: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            channel: channel.into(),
            cancelled,
            on_cancel: Arc::new(on_cancel),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Stop deliveries. Safe to call any number of times.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            (self.on_cancel)();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
