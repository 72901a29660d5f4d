//! Application services - Business logic orchestration

pub mod command_registry;
pub mod permissions;

pub use command_registry::{CommandRegistry, DenialHook, DispatchOutcome};
pub use permissions::PermissionEvaluator;
