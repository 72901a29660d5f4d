//! Infrastructure layer - External concerns
//!
//! This layer contains:
//! - Config: Configuration loading
//! - Storage: Data store backends
//! - Adapters: Platform gateways

pub mod adapters;
pub mod config;
pub mod storage;
