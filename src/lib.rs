//! botcore - runtime core for a modular chat bot
//!
//! Modules register commands and event handlers through a [`ModuleContext`];
//! the [`ModuleLoader`] loads, unloads and reloads them without leaking
//! registrations, and the [`Framework`] wires everything to a gateway and a
//! data store.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod modules;

pub use application::errors::{BotError, CommandError, ConfigError, StorageError};
pub use application::modules::{Module, ModuleContext, ModuleLoader, ModuleState};
pub use application::{Framework, Services};
