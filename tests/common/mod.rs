#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use botcore::application::messaging::EventHandler;
use botcore::domain::entities::GatewayEventKind;
use botcore::domain::traits::{DataStore, Gateway};
use botcore::infrastructure::adapters::ConsoleGateway;
use botcore::infrastructure::config::Config;
use botcore::infrastructure::storage::MemoryStore;
use botcore::Framework;

/// Config with no autoloaded modules
pub fn config() -> Config {
    let mut config = Config::default();
    config.modules.autoload.clear();
    config
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

pub fn framework(config: Config) -> (Framework, Arc<ConsoleGateway>) {
    init_tracing();
    let gateway = Arc::new(ConsoleGateway::new("test-bot", &config.console).quiet());
    let store: Arc<dyn DataStore> = Arc::new(MemoryStore::new());
    let framework = Framework::new(config, gateway.clone(), store).unwrap();
    (framework, gateway)
}

pub fn counting_handler(counter: &Arc<AtomicUsize>) -> EventHandler {
    let counter = counter.clone();
    EventHandler::new(move |_| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    })
}

/// Everything a module could leave behind, for before/after comparisons
#[derive(Debug, PartialEq, Eq)]
pub struct Footprint {
    pub commands: usize,
    pub message_listeners: usize,
    pub subscribers: usize,
    pub bus_listeners: usize,
}

pub fn footprint(framework: &Framework, channel: &str) -> Footprint {
    let services = framework.services();
    Footprint {
        commands: services.commands.len(),
        message_listeners: services.gateway.listener_count(GatewayEventKind::MessageCreate),
        subscribers: services.store.subscriber_count(channel),
        bus_listeners: services.bus.total_listeners(),
    }
}
