//! Framework - wires the gateway, store, command registry and module loader together

use std::sync::{Arc, Mutex, PoisonError};

use crate::application::errors::BotError;
use crate::application::handler::{listener, ListenerId};
use crate::application::messaging::emitter::EventBus;
use crate::application::messaging::prefix::PrefixResolver;
use crate::application::modules::{GuildModuleState, ModuleLoader};
use crate::application::services::{CommandRegistry, PermissionEvaluator};
use crate::domain::entities::{GatewayEvent, GatewayEventKind};
use crate::domain::traits::{DataStore, Gateway};
use crate::infrastructure::config::Config;

/// Shared handles passed to every module and command handler
#[derive(Clone)]
pub struct Services {
    pub gateway: Arc<dyn Gateway>,
    pub store: Arc<dyn DataStore>,
    pub bus: Arc<EventBus>,
    pub commands: Arc<CommandRegistry>,
    pub guild_state: Arc<GuildModuleState>,
}

pub struct Framework {
    config: Config,
    services: Services,
    loader: Arc<ModuleLoader>,
    message_listener: Mutex<Option<ListenerId>>,
}

impl Framework {
    pub fn new(config: Config, gateway: Arc<dyn Gateway>, store: Arc<dyn DataStore>) -> Result<Self, BotError> {
        config.validate()?;

        let guild_state = Arc::new(GuildModuleState::new(store.clone()));
        let prefixes = PrefixResolver::new(config.bot.prefix.clone(), store.clone());
        let commands = Arc::new(CommandRegistry::new(
            PermissionEvaluator::new(&config.permissions),
            guild_state.clone(),
            prefixes,
        ));

        let services = Services {
            gateway,
            store,
            bus: Arc::new(EventBus::new()),
            commands,
            guild_state,
        };
        let loader = ModuleLoader::new(services.clone());

        Ok(Self {
            config,
            services,
            loader,
            message_listener: Mutex::new(None),
        })
    }

    /// Make the bundled modules available to the loader
    pub fn with_builtin_modules(self) -> Self {
        crate::modules::register_builtin(&self.loader);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn loader(&self) -> &Arc<ModuleLoader> {
        &self.loader
    }

    /// Route messages to commands, load the autoload modules and log in.
    /// A module that fails to load is logged and skipped.
    pub async fn start(&self) -> Result<(), BotError> {
        self.attach_message_listener();

        for id in &self.config.modules.autoload {
            if let Err(e) = self.loader.load(id).await {
                tracing::error!("Failed to load module {}: {}", id, e);
            }
        }

        tracing::info!(
            "{} ready with {} commands from {} modules",
            self.config.bot.name,
            self.services.commands.len(),
            self.loader.list().len()
        );
        self.services.gateway.login().await
    }

    fn attach_message_listener(&self) {
        let mut slot = self
            .message_listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return;
        }

        let services = self.services.clone();
        let id = self.services.gateway.on(
            GatewayEventKind::MessageCreate,
            listener(move |event: GatewayEvent| {
                let services = services.clone();
                async move {
                    if let GatewayEvent::MessageCreate(message) = event {
                        let outcome = services.commands.process_message(message, &services).await;
                        tracing::trace!("Dispatch outcome: {:?}", outcome);
                    }
                    Ok(())
                }
            }),
        );
        *slot = Some(id);
    }

    /// Unload every module and stop routing messages
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down {}", self.config.bot.name);
        self.loader.unload_all().await;

        let listener = self
            .message_listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(id) = listener {
            self.services
                .gateway
                .remove_listener(GatewayEventKind::MessageCreate, id);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::infrastructure::adapters::ConsoleGateway;
    use crate::infrastructure::config::ConsoleConfig;
    use crate::infrastructure::storage::MemoryStore;

    /// Services over a quiet console gateway and an in-memory store
    pub(crate) fn services(config: &Config) -> (Services, Arc<ConsoleGateway>) {
        let gateway = Arc::new(ConsoleGateway::new("test", &ConsoleConfig::default()).quiet());
        let store: Arc<dyn DataStore> = Arc::new(MemoryStore::new());
        let guild_state = Arc::new(GuildModuleState::new(store.clone()));
        let commands = Arc::new(CommandRegistry::new(
            PermissionEvaluator::new(&config.permissions),
            guild_state.clone(),
            PrefixResolver::new(config.bot.prefix.clone(), store.clone()),
        ));
        let services = Services {
            gateway: gateway.clone(),
            store,
            bus: Arc::new(EventBus::new()),
            commands,
            guild_state,
        };
        (services, gateway)
    }
}
