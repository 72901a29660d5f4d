//! Module system - lifecycle, per-module registrations and guild enable state

pub mod guild_state;
pub mod loader;
pub mod module;

pub use guild_state::GuildModuleState;
pub use loader::{ModuleFactory, ModuleInfo, ModuleLoader, ModuleState};
pub use module::{Module, ModuleContext};
