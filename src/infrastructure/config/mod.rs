//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use crate::application::errors::ConfigError;

/// Bot configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub bot: BotConfig,
    pub permissions: PermissionConfig,
    pub storage: StorageConfig,
    pub modules: ModulesConfig,
    pub console: ConsoleConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BotConfig {
    pub name: String,
    pub prefix: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: "botcore".to_string(),
            prefix: "--".to_string(),
        }
    }
}

/// Static permission lists. Entries are user ids or role ids.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PermissionConfig {
    pub owners: Vec<String>,
    pub admins: Vec<String>,
    pub djs: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sqlite,
    Json,
}

impl std::str::FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "sqlite" => Ok(StorageBackend::Sqlite),
            "json" => Ok(StorageBackend::Json),
            other => Err(ConfigError::InvalidValue(format!("unknown storage backend '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ModulesConfig {
    /// Modules loaded at startup, in order
    pub autoload: Vec<String>,
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            autoload: vec!["core".to_string(), "stats".to_string()],
        }
    }
}

/// Identity used by the console gateway in dev mode
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ConsoleConfig {
    pub user: String,
    pub roles: Vec<String>,
    pub guild: Option<String>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            user: "console".to_string(),
            roles: Vec::new(),
            guild: Some("console-guild".to_string()),
        }
    }
}

impl Config {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Parse(format!("Failed to read config: {}", e)))?;

        serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))
    }

    pub fn load_env() -> Result<Self, ConfigError> {
        // Load from environment variables
        let mut config = Config::default();

        if let Ok(prefix) = std::env::var("BOT_PREFIX") {
            config.bot.prefix = prefix;
        }

        if let Ok(owners) = std::env::var("BOT_OWNERS") {
            config.permissions.owners = split_list(&owners);
        }

        if let Ok(admins) = std::env::var("BOT_ADMINS") {
            config.permissions.admins = split_list(&admins);
        }

        if let Ok(backend) = std::env::var("BOT_STORAGE") {
            config.storage.backend = backend.parse()?;
        }

        if let Ok(path) = std::env::var("BOT_STORAGE_PATH") {
            config.storage.path = Some(PathBuf::from(path));
        }

        Ok(config)
    }

    /// Reject configurations the bot cannot start with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot.name.trim().is_empty() {
            return Err(ConfigError::MissingField("bot.name".to_string()));
        }
        if self.bot.prefix.is_empty() {
            return Err(ConfigError::MissingField("bot.prefix".to_string()));
        }
        if self.bot.prefix.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidValue("bot.prefix must not contain whitespace".to_string()));
        }
        if self.storage.backend != StorageBackend::Memory && self.storage.path.is_none() {
            return Err(ConfigError::MissingField("storage.path".to_string()));
        }
        Ok(())
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yaml_with_defaults() {
        let yaml = r#"
bot:
  prefix: "!"
permissions:
  owners: ["100"]
  admins: ["role-mod"]
storage:
  backend: sqlite
  path: data/bot.db
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.bot.prefix, "!");
        assert_eq!(config.bot.name, "botcore");
        assert_eq!(config.permissions.owners, vec!["100"]);
        assert!(config.permissions.djs.is_empty());
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.modules.autoload, vec!["core", "stats"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_values() {
        let mut config = Config::default();
        config.bot.prefix = String::new();
        assert!(matches!(config.validate(), Err(ConfigError::MissingField(f)) if f == "bot.prefix"));

        let mut config = Config::default();
        config.storage.backend = StorageBackend::Json;
        assert!(matches!(config.validate(), Err(ConfigError::MissingField(f)) if f == "storage.path"));
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("1, 2,,3 "), vec!["1", "2", "3"]);
    }
}
