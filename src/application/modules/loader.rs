//! Module loader - drives module lifecycle and tracks the dependency graph

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use serde::Serialize;
use tracing::{error, info, warn};

use crate::application::errors::BotError;
use crate::application::handler::{run_isolated, BoxFuture, HandlerResult};
use crate::application::modules::module::{Module, ModuleContext};
use crate::application::Services;
use crate::domain::entities::{GuildId, InternalEvent};

/// Builds a fresh module instance for each activation
pub type ModuleFactory = Arc<dyn Fn() -> Arc<dyn Module> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleState {
    Loading,
    Loaded,
    Unloading,
    Reloading,
    /// Init failed. Kept resident with nothing registered.
    Errored,
}

impl ModuleState {
    fn is_transitioning(self) -> bool {
        matches!(self, ModuleState::Loading | ModuleState::Unloading | ModuleState::Reloading)
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModuleState::Loading => "loading",
            ModuleState::Loaded => "loaded",
            ModuleState::Unloading => "unloading",
            ModuleState::Reloading => "reloading",
            ModuleState::Errored => "errored",
        };
        f.write_str(s)
    }
}

/// Snapshot of a resident module
#[derive(Debug, Clone, Serialize)]
pub struct ModuleInfo {
    pub id: String,
    pub description: String,
    pub state: ModuleState,
    pub allow_disabling: bool,
    pub dependencies: Vec<String>,
    pub dependents: Vec<String>,
    pub commands: usize,
    pub events: usize,
    pub error: Option<String>,
}

struct ModuleEntry {
    module: Arc<dyn Module>,
    ctx: Arc<ModuleContext>,
    state: ModuleState,
    /// Modules this one required
    dependencies: BTreeSet<String>,
    /// Modules that required this one
    dependents: BTreeSet<String>,
    error: Option<String>,
}

/// Owns every resident module.
///
/// The registry lock is never held across an await; each entry's state marks
/// it busy while a transition is suspended in init or shutdown.
pub struct ModuleLoader {
    services: Services,
    factories: RwLock<BTreeMap<String, ModuleFactory>>,
    modules: Mutex<HashMap<String, ModuleEntry>>,
    this: Weak<ModuleLoader>,
}

impl ModuleLoader {
    pub fn new(services: Services) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            services,
            factories: RwLock::new(BTreeMap::new()),
            modules: Mutex::new(HashMap::new()),
            this: this.clone(),
        })
    }

    fn modules(&self) -> MutexGuard<'_, HashMap<String, ModuleEntry>> {
        self.modules.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make a module available for loading under `id`
    pub fn register_factory<F>(&self, id: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn Module> + Send + Sync + 'static,
    {
        let id = id.into();
        tracing::debug!("Module {} available", id);
        self.factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(factory));
    }

    /// Ids of every module that can be loaded
    pub fn available(&self) -> Vec<String> {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    fn factory(&self, id: &str) -> Result<ModuleFactory, BotError> {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| BotError::UnknownModule(id.to_string()))
    }

    fn instantiate(&self, id: &str, factory: &ModuleFactory) -> (Arc<dyn Module>, Arc<ModuleContext>) {
        let module = factory();
        self.services
            .guild_state
            .set_allow_disabling(id, module.allow_disabling());
        let ctx = Arc::new(ModuleContext::new(id, self.services.clone(), self.this.clone()));
        (module, ctx)
    }

    pub fn state(&self, id: &str) -> Option<ModuleState> {
        self.modules().get(id).map(|e| e.state)
    }

    pub fn is_loaded(&self, id: &str) -> bool {
        self.state(id) == Some(ModuleState::Loaded)
    }

    pub fn context(&self, id: &str) -> Option<Arc<ModuleContext>> {
        self.modules().get(id).map(|e| e.ctx.clone())
    }

    /// Resident modules, sorted by id
    pub fn list(&self) -> Vec<ModuleInfo> {
        let modules = self.modules();
        let mut infos: Vec<ModuleInfo> = modules
            .iter()
            .map(|(id, entry)| ModuleInfo {
                id: id.clone(),
                description: entry.module.description().to_string(),
                state: entry.state,
                allow_disabling: entry.module.allow_disabling(),
                dependencies: entry.dependencies.iter().cloned().collect(),
                dependents: entry.dependents.iter().cloned().collect(),
                commands: entry.ctx.command_count(),
                events: entry.ctx.binding_count(),
                error: entry.error.clone(),
            })
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    /// Instantiate and initialize a module. An Errored module with the same id
    /// is replaced.
    pub async fn load(&self, id: &str) -> Result<(), BotError> {
        let factory = self.factory(id)?;

        let (module, ctx) = {
            let mut modules = self.modules();
            match modules.get(id).map(|e| e.state) {
                Some(ModuleState::Loaded) => return Err(BotError::AlreadyLoaded(id.to_string())),
                Some(state) if state.is_transitioning() => {
                    return Err(BotError::ModuleBusy(id.to_string()))
                }
                _ => {}
            }

            let (module, ctx) = self.instantiate(id, &factory);
            let dependents = modules
                .remove(id)
                .map(|old| old.dependents)
                .unwrap_or_default();
            modules.insert(
                id.to_string(),
                ModuleEntry {
                    module: module.clone(),
                    ctx: ctx.clone(),
                    state: ModuleState::Loading,
                    dependencies: BTreeSet::new(),
                    dependents,
                    error: None,
                },
            );
            (module, ctx)
        };

        info!("Loading module {}", id);
        self.activate(id, module, ctx).await
    }

    /// Run init and settle the entry as Loaded or Errored
    async fn activate(
        &self,
        id: &str,
        module: Arc<dyn Module>,
        ctx: Arc<ModuleContext>,
    ) -> Result<(), BotError> {
        let init: BoxFuture<'static, HandlerResult> = {
            let ctx = ctx.clone();
            Box::pin(async move { module.init(&ctx).await })
        };

        match run_isolated(&format!("module {} init", id), init).await {
            Ok(()) => {
                if let Some(entry) = self.modules().get_mut(id) {
                    entry.state = ModuleState::Loaded;
                }
                info!(
                    "Module {} loaded ({} commands, {} events)",
                    id,
                    ctx.command_count(),
                    ctx.binding_count()
                );
                self.announce("module:loaded", id).await;
                Ok(())
            }
            Err(e) => {
                let (commands, events) = ctx.teardown();
                {
                    let mut modules = self.modules();
                    Self::clear_dependencies(&mut modules, id);
                    if let Some(entry) = modules.get_mut(id) {
                        entry.state = ModuleState::Errored;
                        entry.error = Some(e.to_string());
                    }
                }
                error!(
                    "Module {} failed to initialize: {} (removed {} commands, {} events)",
                    id, e, commands, events
                );
                Err(BotError::ModuleInit {
                    module: id.to_string(),
                    source: Box::new(e),
                })
            }
        }
    }

    /// Unload a module. With `force`, every module depending on it is unloaded
    /// first, deepest dependents first. Unloading an absent module is a no-op.
    pub async fn unload(&self, id: &str, force: bool) -> Result<(), BotError> {
        let order = {
            let mut modules = self.modules();
            let Some(entry) = modules.get(id) else {
                return Ok(());
            };
            if entry.state.is_transitioning() {
                return Err(BotError::ModuleBusy(id.to_string()));
            }
            if !force && !entry.dependents.is_empty() {
                return Err(BotError::DependentsActive {
                    module: id.to_string(),
                    dependents: entry.dependents.iter().cloned().collect(),
                });
            }

            let mut order = Vec::new();
            Self::unload_order(&modules, id, &mut HashSet::new(), &mut order);

            if let Some(busy) = order
                .iter()
                .find(|m| modules.get(m.as_str()).is_some_and(|e| e.state.is_transitioning()))
            {
                return Err(BotError::ModuleBusy(busy.clone()));
            }

            order
                .into_iter()
                .filter_map(|m| {
                    let entry = modules.get_mut(&m)?;
                    let was_loaded = entry.state == ModuleState::Loaded;
                    entry.state = ModuleState::Unloading;
                    Some((m, was_loaded))
                })
                .collect::<Vec<_>>()
        };

        for (module, was_loaded) in order {
            if module != id {
                warn!("Force-unloading {} because it depends on {}", module, id);
            }
            self.deactivate(&module, was_loaded).await;
        }
        Ok(())
    }

    /// Post-order walk over dependents so the deepest come first
    fn unload_order(
        modules: &HashMap<String, ModuleEntry>,
        id: &str,
        seen: &mut HashSet<String>,
        order: &mut Vec<String>,
    ) {
        if !seen.insert(id.to_string()) {
            return;
        }
        if let Some(entry) = modules.get(id) {
            for dependent in &entry.dependents {
                Self::unload_order(modules, dependent, seen, order);
            }
        }
        order.push(id.to_string());
    }

    async fn deactivate(&self, id: &str, was_loaded: bool) {
        let Some((module, ctx)) = self
            .modules()
            .get(id)
            .map(|e| (e.module.clone(), e.ctx.clone()))
        else {
            return;
        };

        if was_loaded {
            self.run_shutdown(id, module, ctx.clone()).await;
        }
        let (commands, events) = ctx.teardown();

        {
            let mut modules = self.modules();
            Self::clear_dependencies(&mut modules, id);
            modules.remove(id);
            for entry in modules.values_mut() {
                entry.dependents.remove(id);
            }
        }
        self.services.guild_state.forget(id);

        info!("Module {} unloaded ({} commands, {} events removed)", id, commands, events);
        self.announce("module:unloaded", id).await;
    }

    async fn run_shutdown(&self, id: &str, module: Arc<dyn Module>, ctx: Arc<ModuleContext>) {
        let shutdown: BoxFuture<'static, HandlerResult> =
            Box::pin(async move { module.shutdown(&ctx).await });
        if let Err(e) = run_isolated(&format!("module {} shutdown", id), shutdown).await {
            warn!("Module {} shutdown failed: {}", id, e);
        }
    }

    /// Tear a module down and initialize a fresh instance under the same id.
    /// A module that is not loaded is simply loaded. Without `force` a module
    /// with dependents is refused; with it, the dependents stay loaded and keep
    /// their edges to the new instance. If init fails the module is left Errored.
    pub async fn reload(&self, id: &str, force: bool) -> Result<(), BotError> {
        let factory = self.factory(id)?;

        let resident = {
            let mut modules = self.modules();
            match modules.get_mut(id) {
                Some(entry) => {
                    if entry.state.is_transitioning() {
                        return Err(BotError::ModuleBusy(id.to_string()));
                    }
                    if !force && !entry.dependents.is_empty() {
                        return Err(BotError::DependentsActive {
                            module: id.to_string(),
                            dependents: entry.dependents.iter().cloned().collect(),
                        });
                    }
                    let was_loaded = entry.state == ModuleState::Loaded;
                    entry.state = ModuleState::Reloading;
                    Some((entry.module.clone(), entry.ctx.clone(), was_loaded))
                }
                None => None,
            }
        };
        let Some((old_module, old_ctx, was_loaded)) = resident else {
            return self.load(id).await;
        };

        info!("Reloading module {}", id);
        if was_loaded {
            self.run_shutdown(id, old_module, old_ctx.clone()).await;
        }
        old_ctx.teardown();

        let (module, ctx) = {
            let mut modules = self.modules();
            Self::clear_dependencies(&mut modules, id);
            let (module, ctx) = self.instantiate(id, &factory);
            if let Some(entry) = modules.get_mut(id) {
                entry.module = module.clone();
                entry.ctx = ctx.clone();
                entry.error = None;
            }
            (module, ctx)
        };

        self.activate(id, module, ctx).await
    }

    /// Record that `dependent` requires `dependency`. The dependency must be
    /// loaded; nothing is loaded automatically.
    pub fn register_dependency(&self, dependent: &str, dependency: &str) -> Result<(), BotError> {
        let mut modules = self.modules();

        match modules.get(dependency).map(|e| e.state) {
            Some(ModuleState::Loaded) => {}
            Some(state) if state.is_transitioning() => {
                return Err(BotError::ModuleBusy(dependency.to_string()))
            }
            _ => return Err(BotError::UnknownModule(dependency.to_string())),
        }
        if !modules.contains_key(dependent) {
            return Err(BotError::UnknownModule(dependent.to_string()));
        }
        if Self::depends_on(&modules, dependency, dependent) {
            return Err(BotError::DependencyCycle {
                dependent: dependent.to_string(),
                dependency: dependency.to_string(),
            });
        }

        if let Some(entry) = modules.get_mut(dependent) {
            entry.dependencies.insert(dependency.to_string());
        }
        if let Some(entry) = modules.get_mut(dependency) {
            entry.dependents.insert(dependent.to_string());
        }
        tracing::debug!("Module {} depends on {}", dependent, dependency);
        Ok(())
    }

    /// Whether `from` reaches `to` through dependency edges (or is `to`)
    fn depends_on(modules: &HashMap<String, ModuleEntry>, from: &str, to: &str) -> bool {
        let mut stack = vec![from.to_string()];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(entry) = modules.get(&current) {
                stack.extend(entry.dependencies.iter().cloned());
            }
        }
        false
    }

    /// Drop the edges from `id` to the modules it required
    fn clear_dependencies(modules: &mut HashMap<String, ModuleEntry>, id: &str) {
        let dependencies = match modules.get_mut(id) {
            Some(entry) => std::mem::take(&mut entry.dependencies),
            None => return,
        };
        for dependency in dependencies {
            if let Some(entry) = modules.get_mut(&dependency) {
                entry.dependents.remove(id);
            }
        }
    }

    /// Force-unload everything
    pub async fn unload_all(&self) {
        let ids: Vec<String> = self.modules().keys().cloned().collect();
        for id in ids {
            if let Err(e) = self.unload(&id, true).await {
                warn!("Failed to unload module {}: {}", id, e);
            }
        }
    }

    fn check_known(&self, id: &str) -> Result<(), BotError> {
        if self.modules().contains_key(id) {
            return Ok(());
        }
        self.factory(id).map(|_| ())
    }

    /// Whether the module may be disabled. Asks the resident instance, or a
    /// throwaway one when the module is not loaded.
    fn allows_disabling(&self, id: &str) -> Result<bool, BotError> {
        if let Some(entry) = self.modules().get(id) {
            return Ok(entry.module.allow_disabling());
        }
        let factory = self.factory(id)?;
        Ok(factory().allow_disabling())
    }

    pub async fn is_module_disabled_for_guild(&self, id: &str, guild: &GuildId) -> Result<bool, BotError> {
        if !self.allows_disabling(id)? {
            return Ok(false);
        }
        Ok(self.services.guild_state.is_disabled(id, guild).await?)
    }

    pub async fn disable_module_for_guild(&self, id: &str, guild: &GuildId) -> Result<(), BotError> {
        if !self.allows_disabling(id)? {
            return Err(BotError::NotDisableable(id.to_string()));
        }
        self.services.guild_state.disable(id, guild).await?;
        info!("Module {} disabled in guild {}", id, guild);
        Ok(())
    }

    pub async fn enable_module_for_guild(&self, id: &str, guild: &GuildId) -> Result<(), BotError> {
        self.check_known(id)?;
        self.services.guild_state.enable(id, guild).await?;
        info!("Module {} enabled in guild {}", id, guild);
        Ok(())
    }

    async fn announce(&self, name: &str, id: &str) {
        let event = InternalEvent::new(name, serde_json::json!({ "module": id }));
        self.services.bus.publish(event).await;
    }
}

impl fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("available", &self.available())
            .field("resident", &self.modules().len())
            .finish()
    }
}
