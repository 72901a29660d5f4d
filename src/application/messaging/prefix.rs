//! Prefix policy - which prefix a message must start with to be a command

use std::sync::Arc;

use serde_json::Value;

use crate::application::errors::StorageError;
use crate::domain::entities::GuildId;
use crate::domain::traits::DataStore;

/// Resolves the active prefix: a per-guild override from the store, else the default
#[derive(Clone)]
pub struct PrefixResolver {
    default: String,
    store: Arc<dyn DataStore>,
}

impl PrefixResolver {
    pub fn new(default: impl Into<String>, store: Arc<dyn DataStore>) -> Self {
        Self {
            default: default.into(),
            store,
        }
    }

    pub fn key(guild: &GuildId) -> String {
        format!("guild:{}:prefix", guild)
    }

    pub fn default_prefix(&self) -> &str {
        &self.default
    }

    pub async fn resolve(&self, guild: Option<&GuildId>) -> String {
        let Some(guild) = guild else {
            return self.default.clone();
        };

        match self.store.get(&Self::key(guild)).await {
            Ok(Some(Value::String(prefix))) if !prefix.is_empty() => prefix,
            Ok(_) => self.default.clone(),
            Err(e) => {
                tracing::warn!("Failed to read prefix for guild {}: {}", guild, e);
                self.default.clone()
            }
        }
    }

    pub async fn set_guild_prefix(&self, guild: &GuildId, prefix: &str) -> Result<(), StorageError> {
        self.store
            .set(&Self::key(guild), Value::String(prefix.to_string()))
            .await
    }

    pub async fn clear_guild_prefix(&self, guild: &GuildId) -> Result<(), StorageError> {
        self.store.del(&Self::key(guild)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::MemoryStore;

    #[tokio::test]
    async fn test_guild_override_and_reset() {
        let resolver = PrefixResolver::new("--", Arc::new(MemoryStore::new()));
        let guild = GuildId::new("g1");

        assert_eq!(resolver.resolve(None).await, "--");
        assert_eq!(resolver.resolve(Some(&guild)).await, "--");

        resolver.set_guild_prefix(&guild, "!").await.unwrap();
        assert_eq!(resolver.resolve(Some(&guild)).await, "!");
        assert_eq!(resolver.resolve(Some(&GuildId::new("g2"))).await, "--");

        resolver.clear_guild_prefix(&guild).await.unwrap();
        assert_eq!(resolver.resolve(Some(&guild)).await, "--");
    }
}
