//! Event emitter - keyed publish/subscribe used by the framework bus and gateways

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::{PoisonError, RwLock};

use crate::application::handler::{run_isolated, Listener, ListenerId};
use crate::domain::entities::InternalEvent;

/// Listeners keyed by event, called in registration order
pub struct EventEmitter<K, E> {
    listeners: RwLock<HashMap<K, Vec<(ListenerId, Listener<E>)>>>,
}

/// The framework-wide bus for internal events
pub type EventBus = EventEmitter<String, InternalEvent>;

impl<K, E> EventEmitter<K, E>
where
    K: Eq + Hash + Clone + Display,
    E: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
        }
    }

    pub fn on(&self, key: K, listener: Listener<E>) -> ListenerId {
        let id = ListenerId::new();
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default()
            .push((id, listener));
        id
    }

    pub fn remove_listener(&self, key: &K, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let Some(entries) = listeners.get_mut(key) else {
            return false;
        };

        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        let removed = entries.len() != before;

        if entries.is_empty() {
            listeners.remove(key);
        }
        removed
    }

    pub fn listener_count(&self, key: &K) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map_or(0, Vec::len)
    }

    pub fn total_listeners(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }

    fn is_registered(&self, key: &K, id: ListenerId) -> bool {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .is_some_and(|entries| entries.iter().any(|(existing, _)| *existing == id))
    }

    /// Deliver `event` to every listener on `key`, one after another.
    /// Failures are logged and do not stop delivery. Returns how many ran.
    pub async fn emit(&self, key: &K, event: E) -> usize {
        let snapshot: Vec<(ListenerId, Listener<E>)> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .unwrap_or_default();

        let mut delivered = 0;
        for (id, listener) in snapshot {
            // an earlier listener may have removed this one
            if !self.is_registered(key, id) {
                continue;
            }
            delivered += 1;
            let label = format!("listener for '{}'", key);
            if let Err(e) = run_isolated(&label, listener(event.clone())).await {
                tracing::warn!("Error in {}: {}", label, e);
            }
        }
        delivered
    }
}

impl EventEmitter<String, InternalEvent> {
    /// Emit an internal event under its own name
    pub async fn publish(&self, event: InternalEvent) -> usize {
        let name = event.name.clone();
        self.emit(&name, event).await
    }
}

impl<K, E> Default for EventEmitter<K, E>
where
    K: Eq + Hash + Clone + Display,
    E: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::errors::BotError;
    use crate::application::handler::listener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_emit_reaches_listeners_in_order() {
        let bus = EventBus::new();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let seen = seen.clone();
            bus.on(
                "tick".to_string(),
                listener(move |_event: InternalEvent| {
                    let seen = seen.clone();
                    async move {
                        seen.lock().unwrap().push(tag);
                        Ok(())
                    }
                }),
            );
        }

        let delivered = bus.publish(InternalEvent::new("tick", serde_json::Value::Null)).await;
        assert_eq!(delivered, 2);
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_failing_listener_does_not_block_others() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        bus.on(
            "tick".to_string(),
            listener(|_event: InternalEvent| async { Err(BotError::Internal("bad".to_string())) }),
        );
        let counter = hits.clone();
        bus.on(
            "tick".to_string(),
            listener(move |_event: InternalEvent| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        );

        bus.publish(InternalEvent::new("tick", serde_json::Value::Null)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remove_listener_is_idempotent() {
        let bus = EventBus::new();
        let id = bus.on("tick".to_string(), listener(|_e: InternalEvent| async { Ok(()) }));
        assert_eq!(bus.listener_count(&"tick".to_string()), 1);

        assert!(bus.remove_listener(&"tick".to_string(), id));
        assert!(!bus.remove_listener(&"tick".to_string(), id));
        assert_eq!(bus.total_listeners(), 0);
        assert_eq!(bus.publish(InternalEvent::new("tick", serde_json::Value::Null)).await, 0);
    }
}
