//! Built-in modules

pub mod core_module;
pub mod stats;

use std::sync::Arc;

use crate::application::modules::{Module, ModuleLoader};

pub use core_module::CoreModule;
pub use stats::StatsModule;

/// Make the built-in modules available to `loader`
pub fn register_builtin(loader: &ModuleLoader) {
    loader.register_factory(core_module::ID, || Arc::new(CoreModule) as Arc<dyn Module>);
    loader.register_factory(stats::ID, || Arc::new(StatsModule) as Arc<dyn Module>);
}
