//! Event router - a module's registrations across the platform, data store and
//! internal event namespaces

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use crate::application::errors::BotError;
use crate::application::handler::{BoxFuture, HandlerResult, Listener, ListenerId};
use crate::application::messaging::emitter::EventBus;
use crate::application::modules::GuildModuleState;
use crate::application::Services;
use crate::domain::entities::{
    DataChange, EventKey, EventPayload, GatewayEvent, GatewayEventKind, InternalEvent, Namespace,
};
use crate::domain::traits::{DataStore, Gateway, Subscription};

/// A module's event callback. Clones compare equal with [`EventHandler::same_as`].
#[derive(Clone)]
pub struct EventHandler(Arc<dyn Fn(EventPayload) -> BoxFuture<'static, HandlerResult> + Send + Sync>);

impl EventHandler {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(EventPayload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self(Arc::new(move |payload| Box::pin(f(payload))))
    }

    pub fn same_as(&self, other: &EventHandler) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn call(&self, payload: EventPayload) -> BoxFuture<'static, HandlerResult> {
        (self.0)(payload)
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventHandler")
    }
}

/// Handle for a single registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId(uuid::Uuid);

/// Where a binding is attached, with the handle needed to detach it
enum Attachment {
    Platform {
        kind: GatewayEventKind,
        listener: ListenerId,
    },
    DataStore {
        subscription: Subscription,
    },
    Internal {
        event: String,
        listener: ListenerId,
    },
}

/// One registration owned by a module
pub struct EventBinding {
    pub id: BindingId,
    pub name: String,
    handler: EventHandler,
    attachment: Attachment,
}

impl EventBinding {
    pub fn namespace(&self) -> Namespace {
        match self.attachment {
            Attachment::Platform { .. } => Namespace::Platform,
            Attachment::DataStore { .. } => Namespace::DataStore,
            Attachment::Internal { .. } => Namespace::Internal,
        }
    }
}

/// Per-module event registrations.
///
/// Every handler is wrapped so it is skipped for events scoped to a guild where
/// the owning module is disabled.
pub struct EventRouter {
    module: String,
    gateway: Arc<dyn Gateway>,
    store: Arc<dyn DataStore>,
    bus: Arc<EventBus>,
    guild_state: Arc<GuildModuleState>,
    bindings: Mutex<Vec<EventBinding>>,
}

impl EventRouter {
    pub fn new(module: impl Into<String>, services: &Services) -> Self {
        Self {
            module: module.into(),
            gateway: services.gateway.clone(),
            store: services.store.clone(),
            bus: services.bus.clone(),
            guild_state: services.guild_state.clone(),
            bindings: Mutex::new(Vec::new()),
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    fn guard(&self, handler: EventHandler) -> Listener<EventPayload> {
        let module = self.module.clone();
        let guild_state = self.guild_state.clone();

        Arc::new(move |payload: EventPayload| {
            let handler = handler.clone();
            let module = module.clone();
            let guild_state = guild_state.clone();
            Box::pin(async move {
                if let Some(guild) = payload.guild_id() {
                    if guild_state.should_skip(&module, guild).await {
                        tracing::trace!("Module {} disabled in guild {}, skipping event", module, guild);
                        return Ok(());
                    }
                }
                handler.call(payload).await
            })
        })
    }

    /// Register `handler` for `name`: `platform.<event>`, `datastore.<key>`, or
    /// any other name for the internal bus.
    pub async fn register_event(&self, name: &str, handler: EventHandler) -> Result<BindingId, BotError> {
        let key = EventKey::parse(name).ok_or_else(|| BotError::UnknownEvent(name.to_string()))?;
        let guarded = self.guard(handler.clone());

        let attachment = match key {
            EventKey::Platform(kind) => {
                let listener = self.gateway.on(
                    kind,
                    Arc::new(move |event: GatewayEvent| guarded(EventPayload::Platform(event))),
                );
                Attachment::Platform { kind, listener }
            }
            EventKey::DataStore(channel) => {
                let subscription = self
                    .store
                    .subscribe(
                        &channel,
                        Arc::new(move |change: DataChange| guarded(EventPayload::DataStore(change))),
                    )
                    .await?;
                Attachment::DataStore { subscription }
            }
            EventKey::Internal(event) => {
                let listener = self.bus.on(
                    event.clone(),
                    Arc::new(move |event: InternalEvent| guarded(EventPayload::Internal(event))),
                );
                Attachment::Internal { event, listener }
            }
        };

        let id = BindingId(uuid::Uuid::new_v4());
        self.bindings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(EventBinding {
                id,
                name: name.to_string(),
                handler,
                attachment,
            });

        tracing::debug!("Module {} listening on {}", self.module, name);
        Ok(id)
    }

    /// Remove bindings for `name`: all of them, or only the one registered with
    /// this exact handler. Returns how many were removed; removing twice is a no-op.
    pub fn unregister_event(&self, name: &str, handler: Option<&EventHandler>) -> usize {
        self.take_where(|b| b.name == name && handler.map_or(true, |h| b.handler.same_as(h)))
    }

    pub fn unregister_binding(&self, id: BindingId) -> bool {
        self.take_where(|b| b.id == id) > 0
    }

    /// Detach everything this module registered
    pub fn unregister_all(&self) -> usize {
        self.take_where(|_| true)
    }

    pub fn binding_count(&self) -> usize {
        self.bindings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Names and namespaces of live bindings, in registration order
    pub fn bindings(&self) -> Vec<(String, Namespace)> {
        self.bindings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|b| (b.name.clone(), b.namespace()))
            .collect()
    }

    fn take_where(&self, predicate: impl Fn(&EventBinding) -> bool) -> usize {
        let removed: Vec<EventBinding> = {
            let mut bindings = self.bindings.lock().unwrap_or_else(PoisonError::into_inner);
            let (removed, kept) = std::mem::take(&mut *bindings)
                .into_iter()
                .partition(|b| predicate(b));
            *bindings = kept;
            removed
        };

        for binding in &removed {
            self.detach(binding);
        }
        removed.len()
    }

    fn detach(&self, binding: &EventBinding) {
        match &binding.attachment {
            Attachment::Platform { kind, listener } => {
                self.gateway.remove_listener(*kind, *listener);
            }
            Attachment::DataStore { subscription } => subscription.cancel(),
            Attachment::Internal { event, listener } => {
                self.bus.remove_listener(event, *listener);
            }
        }
        tracing::debug!("Module {} stopped listening on {}", self.module, binding.name);
    }
}
