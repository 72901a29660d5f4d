//! Application layer errors

use thiserror::Error;

/// General bot errors
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Duplicate registration: {0}")]
    DuplicateRegistration(String),

    #[error("Module already loaded: {0}")]
    AlreadyLoaded(String),

    #[error("Unknown module: {0}")]
    UnknownModule(String),

    #[error("Module {module} is still required by: {}", dependents.join(", "))]
    DependentsActive {
        module: String,
        dependents: Vec<String>,
    },

    #[error("Dependency cycle: {dependent} -> {dependency}")]
    DependencyCycle {
        dependent: String,
        dependency: String,
    },

    #[error("Module {0} is busy with another lifecycle transition")]
    ModuleBusy(String),

    #[error("Module {module} failed to initialize: {source}")]
    ModuleInit {
        module: String,
        #[source]
        source: Box<BotError>,
    },

    #[error("Module {0} cannot be disabled")]
    NotDisableable(String),

    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("Handler failed: {0}")]
    HandlerFailure(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Command execution errors
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Permission denied")]
    PermissionDenied,
}

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
