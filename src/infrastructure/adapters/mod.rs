//! Platform gateways

pub mod console;

pub use console::ConsoleGateway;
