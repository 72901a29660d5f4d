//! Per-guild module enable/disable flags, persisted in the data store

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;

use crate::application::errors::StorageError;
use crate::domain::entities::GuildId;
use crate::domain::traits::DataStore;

/// Shared view of which modules are disabled in which guilds.
///
/// Modules that do not allow disabling always read as enabled, whatever is stored.
pub struct GuildModuleState {
    store: Arc<dyn DataStore>,
    protected: RwLock<HashSet<String>>,
}

impl GuildModuleState {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self {
            store,
            protected: RwLock::new(HashSet::new()),
        }
    }

    pub fn key(guild: &GuildId, module: &str) -> String {
        format!("guild:{}:module:{}:disabled", guild, module)
    }

    /// Record whether `module` may be disabled
    pub fn set_allow_disabling(&self, module: &str, allowed: bool) {
        let mut protected = self.protected.write().unwrap_or_else(PoisonError::into_inner);
        if allowed {
            protected.remove(module);
        } else {
            protected.insert(module.to_string());
        }
    }

    pub fn allows_disabling(&self, module: &str) -> bool {
        !self
            .protected
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(module)
    }

    pub fn forget(&self, module: &str) {
        self.set_allow_disabling(module, true);
    }

    pub async fn is_disabled(&self, module: &str, guild: &GuildId) -> Result<bool, StorageError> {
        if !self.allows_disabling(module) {
            return Ok(false);
        }
        let flag = self.store.get(&Self::key(guild, module)).await?;
        Ok(matches!(flag, Some(Value::Bool(true))))
    }

    /// Like [`Self::is_disabled`], but treats a store failure as enabled.
    /// Used on the dispatch paths, where a store outage must not silence every module.
    pub async fn should_skip(&self, module: &str, guild: &GuildId) -> bool {
        match self.is_disabled(module, guild).await {
            Ok(disabled) => disabled,
            Err(e) => {
                tracing::warn!(
                    "Could not read disable flag for module {} in guild {}: {}",
                    module,
                    guild,
                    e
                );
                false
            }
        }
    }

    pub async fn disable(&self, module: &str, guild: &GuildId) -> Result<(), StorageError> {
        self.store.set(&Self::key(guild, module), Value::Bool(true)).await
    }

    pub async fn enable(&self, module: &str, guild: &GuildId) -> Result<(), StorageError> {
        self.store.del(&Self::key(guild, module)).await
    }
}
