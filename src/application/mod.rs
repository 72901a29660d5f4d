//! Application layer - Use cases and business logic
//!
//! This layer contains:
//! - Framework: Wiring and startup
//! - Modules: Module lifecycle and dependency tracking
//! - Services: Command dispatch and permissions
//! - Messaging: Parsing, prefixes, the event bus and per-module event routing
//! - Errors: Domain-specific errors

pub mod errors;
pub mod framework;
pub mod handler;
pub mod messaging;
pub mod modules;
pub mod services;

pub use framework::{Framework, Services};
