//! Domain layer - Core business objects and infrastructure abstractions
//!
//! This layer contains:
//! - Entities: Users, messages, guilds, commands, events, permission levels
//! - Traits: Abstractions for infrastructure (Gateway, DataStore)

pub mod entities;
pub mod traits;
