//! Module trait and the per-activation context a module registers through

use std::sync::{Arc, Mutex, PoisonError, Weak};

use async_trait::async_trait;

use crate::application::errors::BotError;
use crate::application::messaging::emitter::EventBus;
use crate::application::messaging::router::{BindingId, EventHandler, EventRouter};
use crate::application::modules::loader::ModuleLoader;
use crate::application::Services;
use crate::domain::entities::{Command, InternalEvent};
use crate::domain::traits::DataStore;

/// A loadable unit of bot functionality
#[async_trait]
pub trait Module: Send + Sync {
    fn description(&self) -> &str {
        ""
    }

    /// Whether guild admins may turn this module off
    fn allow_disabling(&self) -> bool {
        true
    }

    /// Register commands and events. An error leaves the module Errored with
    /// everything it registered so far removed again.
    async fn init(&self, ctx: &ModuleContext) -> Result<(), BotError>;

    async fn shutdown(&self, _ctx: &ModuleContext) -> Result<(), BotError> {
        Ok(())
    }
}

/// Handle a module uses to register things. Everything registered here is
/// tracked so the loader can remove it on unload.
pub struct ModuleContext {
    id: String,
    services: Services,
    router: EventRouter,
    commands: Mutex<Vec<Arc<Command>>>,
    loader: Weak<ModuleLoader>,
}

impl ModuleContext {
    pub(crate) fn new(id: impl Into<String>, services: Services, loader: Weak<ModuleLoader>) -> Self {
        let id = id.into();
        Self {
            router: EventRouter::new(id.clone(), &services),
            id,
            services,
            commands: Mutex::new(Vec::new()),
            loader,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn store(&self) -> Arc<dyn DataStore> {
        self.services.store.clone()
    }

    pub fn bus(&self) -> Arc<EventBus> {
        self.services.bus.clone()
    }

    /// The loader that owns this module. `None` once the loader is dropped.
    pub fn loader(&self) -> Option<Arc<ModuleLoader>> {
        self.loader.upgrade()
    }

    pub fn register_command(&self, command: Command) -> Result<Arc<Command>, BotError> {
        let command = self.services.commands.register(command.owned_by(self.id.clone()))?;
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command.clone());
        Ok(command)
    }

    pub fn unregister_command(&self, command: &Arc<Command>) -> bool {
        let mut owned = self.commands.lock().unwrap_or_else(PoisonError::into_inner);
        let before = owned.len();
        owned.retain(|c| !Arc::ptr_eq(c, command));
        if owned.len() == before {
            return false;
        }
        self.services.commands.unregister(command)
    }

    /// Remove one of this module's commands by literal name or pattern text
    pub fn unregister_command_trigger(&self, trigger: &str) -> bool {
        let target = self
            .commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|c| c.trigger.is(trigger))
            .cloned();
        match target {
            Some(command) => self.unregister_command(&command),
            None => false,
        }
    }

    pub async fn register_event(&self, name: &str, handler: EventHandler) -> Result<BindingId, BotError> {
        self.router.register_event(name, handler).await
    }

    pub fn unregister_event(&self, name: &str, handler: Option<&EventHandler>) -> usize {
        self.router.unregister_event(name, handler)
    }

    /// Declare that this module needs `dependency` loaded. Blocks unloading
    /// `dependency` while this module is active.
    pub fn require_module(&self, dependency: &str) -> Result<(), BotError> {
        let loader = self
            .loader()
            .ok_or_else(|| BotError::Internal("module loader is gone".to_string()))?;
        loader.register_dependency(&self.id, dependency)
    }

    /// Publish on the internal bus
    pub async fn emit(&self, event: InternalEvent) -> usize {
        self.services.bus.publish(event).await
    }

    pub fn command_count(&self) -> usize {
        self.commands.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn binding_count(&self) -> usize {
        self.router.binding_count()
    }

    pub fn commands(&self) -> Vec<Arc<Command>> {
        self.commands.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Drop every command and event binding this module holds
    pub(crate) fn teardown(&self) -> (usize, usize) {
        let commands = std::mem::take(&mut *self.commands.lock().unwrap_or_else(PoisonError::into_inner));
        for command in &commands {
            self.services.commands.unregister(command);
        }
        let events = self.router.unregister_all();
        (commands.len(), events)
    }
}
