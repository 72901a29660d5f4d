mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use botcore::application::handler::listener;
use botcore::domain::entities::{Command, GatewayEvent, Guild, GuildId, InternalEvent, Message, User};
use botcore::{BotError, Module, ModuleContext, ModuleState};

use common::{config, counting_handler, footprint, framework};

/// Registers one command and one binding in each event namespace
struct Greeter {
    hits: Arc<AtomicUsize>,
}

#[async_trait]
impl Module for Greeter {
    fn description(&self) -> &str {
        "says hello"
    }

    async fn init(&self, ctx: &ModuleContext) -> Result<(), BotError> {
        let hits = self.hits.clone();
        ctx.register_command(Command::literal("hello").with_handler(move |_| {
            let hits = hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }))?;
        ctx.register_event("platform.message", counting_handler(&self.hits)).await?;
        ctx.register_event("datastore.greeting", counting_handler(&self.hits)).await?;
        ctx.register_event("greeter.ping", counting_handler(&self.hits)).await?;
        Ok(())
    }
}

/// Requires another module, then registers a command
struct Needs {
    dependency: &'static str,
    command: &'static str,
}

#[async_trait]
impl Module for Needs {
    async fn init(&self, ctx: &ModuleContext) -> Result<(), BotError> {
        ctx.require_module(self.dependency)?;
        ctx.register_command(Command::literal(self.command))?;
        Ok(())
    }
}

/// Registers some things, then fails (or panics) when `fail` is set
struct Flaky {
    fail: Arc<AtomicBool>,
    panic: bool,
}

#[async_trait]
impl Module for Flaky {
    async fn init(&self, ctx: &ModuleContext) -> Result<(), BotError> {
        ctx.register_command(Command::literal("half"))?;
        ctx.register_event("flaky.tick", counting_handler(&Arc::new(AtomicUsize::new(0))))
            .await?;
        if self.fail.load(Ordering::SeqCst) {
            if self.panic {
                panic!("init blew up");
            }
            return Err(BotError::Internal("init failed".to_string()));
        }
        Ok(())
    }
}

struct Protected;

#[async_trait]
impl Module for Protected {
    fn allow_disabling(&self) -> bool {
        false
    }

    async fn init(&self, _ctx: &ModuleContext) -> Result<(), BotError> {
        Ok(())
    }
}

fn register_greeter(fw: &botcore::Framework) -> Arc<AtomicUsize> {
    let hits = Arc::new(AtomicUsize::new(0));
    let shared = hits.clone();
    fw.loader().register_factory("greeter", move || {
        Arc::new(Greeter { hits: shared.clone() }) as Arc<dyn Module>
    });
    hits
}

fn register_needs(fw: &botcore::Framework, id: &str, dependency: &'static str, command: &'static str) {
    fw.loader().register_factory(id, move || {
        Arc::new(Needs { dependency, command }) as Arc<dyn Module>
    });
}

#[tokio::test]
async fn test_load_then_unload_leaves_no_trace() {
    let (fw, gateway) = framework(config());
    let hits = register_greeter(&fw);
    let before = footprint(&fw, "greeting");

    fw.loader().load("greeter").await.unwrap();
    assert_eq!(fw.loader().state("greeter"), Some(ModuleState::Loaded));
    let loaded = footprint(&fw, "greeting");
    assert_eq!(loaded.commands, before.commands + 1);
    assert_eq!(loaded.message_listeners, before.message_listeners + 1);
    assert_eq!(loaded.subscribers, before.subscribers + 1);
    assert_eq!(loaded.bus_listeners, before.bus_listeners + 1);

    fw.loader().unload("greeter", false).await.unwrap();
    assert_eq!(fw.loader().state("greeter"), None);
    assert_eq!(footprint(&fw, "greeting"), before);

    // nothing fires for the unloaded module
    gateway.dispatch(GatewayEvent::MessageCreate(gateway.message("hi"))).await;
    fw.services().store.set("greeting", json!("hi")).await.unwrap();
    fw.services().bus.publish(InternalEvent::new("greeter.ping", json!({}))).await;
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    // double unload is a no-op
    fw.loader().unload("greeter", false).await.unwrap();
}

#[tokio::test]
async fn test_lifecycle_preconditions() {
    let (fw, _) = framework(config());
    register_greeter(&fw);

    fw.loader().load("greeter").await.unwrap();
    assert!(matches!(fw.loader().load("greeter").await, Err(BotError::AlreadyLoaded(_))));
    assert!(matches!(fw.loader().load("nope").await, Err(BotError::UnknownModule(_))));
    assert!(matches!(fw.loader().reload("nope", false).await, Err(BotError::UnknownModule(_))));
    assert_eq!(fw.loader().available(), vec!["greeter"]);
}

#[tokio::test]
async fn test_dependents_block_unload_until_forced() {
    let (fw, _) = framework(config());
    register_greeter(&fw);
    register_needs(&fw, "middle", "greeter", "mid");
    register_needs(&fw, "top", "middle", "top");

    let unloaded = Arc::new(Mutex::new(Vec::new()));
    let sink = unloaded.clone();
    fw.services().bus.on(
        "module:unloaded".to_string(),
        listener(move |event: InternalEvent| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(event.data["module"].as_str().unwrap_or_default().to_string());
                Ok(())
            }
        }),
    );

    for id in ["greeter", "middle", "top"] {
        fw.loader().load(id).await.unwrap();
    }
    let info = fw.loader().list();
    let greeter = info.iter().find(|m| m.id == "greeter").unwrap();
    assert_eq!(greeter.dependents, vec!["middle"]);

    match fw.loader().unload("greeter", false).await {
        Err(BotError::DependentsActive { module, dependents }) => {
            assert_eq!(module, "greeter");
            assert_eq!(dependents, vec!["middle"]);
        }
        other => panic!("expected DependentsActive, got {:?}", other),
    }
    assert!(fw.loader().is_loaded("greeter"));

    fw.loader().unload("greeter", true).await.unwrap();
    assert_eq!(*unloaded.lock().unwrap(), vec!["top", "middle", "greeter"]);
    assert!(fw.loader().list().is_empty());
    assert!(fw.services().commands.is_empty());
}

#[tokio::test]
async fn test_require_unloaded_module_fails_init() {
    let (fw, _) = framework(config());
    register_greeter(&fw);
    register_needs(&fw, "needy", "greeter", "needy");

    match fw.loader().load("needy").await {
        Err(BotError::ModuleInit { module, source }) => {
            assert_eq!(module, "needy");
            assert!(matches!(*source, BotError::UnknownModule(ref m) if m == "greeter"));
        }
        other => panic!("expected ModuleInit, got {:?}", other),
    }
    assert_eq!(fw.loader().state("needy"), Some(ModuleState::Errored));
    assert!(fw.services().commands.is_empty());
}

#[tokio::test]
async fn test_failed_init_cleans_up_partial_registrations() {
    for panic in [false, true] {
        let (fw, _) = framework(config());
        let before = footprint(&fw, "unused");
        let fail = Arc::new(AtomicBool::new(true));
        let flag = fail.clone();
        fw.loader().register_factory("flaky", move || {
            Arc::new(Flaky { fail: flag.clone(), panic }) as Arc<dyn Module>
        });

        let result = fw.loader().load("flaky").await;
        assert!(matches!(result, Err(BotError::ModuleInit { .. })));
        assert_eq!(fw.loader().state("flaky"), Some(ModuleState::Errored));
        assert_eq!(footprint(&fw, "unused"), before);
        assert!(fw.loader().list()[0].error.is_some());

        // an errored entry is replaced by the next load
        fail.store(false, Ordering::SeqCst);
        fw.loader().load("flaky").await.unwrap();
        assert_eq!(fw.loader().state("flaky"), Some(ModuleState::Loaded));
        assert_eq!(fw.services().commands.len(), 1);
    }
}

#[tokio::test]
async fn test_reload_matches_fresh_load() {
    let (fw, _) = framework(config());
    register_greeter(&fw);
    register_needs(&fw, "needy", "greeter", "needy");

    fw.loader().load("greeter").await.unwrap();
    fw.loader().load("needy").await.unwrap();
    let loaded = footprint(&fw, "greeting");

    match fw.loader().reload("greeter", false).await {
        Err(BotError::DependentsActive { module, dependents }) => {
            assert_eq!(module, "greeter");
            assert_eq!(dependents, vec!["needy"]);
        }
        other => panic!("expected DependentsActive, got {:?}", other),
    }
    assert_eq!(footprint(&fw, "greeting"), loaded);

    fw.loader().reload("greeter", true).await.unwrap();
    assert_eq!(fw.loader().state("greeter"), Some(ModuleState::Loaded));
    assert_eq!(footprint(&fw, "greeting"), loaded);

    let info = fw.loader().list();
    let greeter = info.iter().find(|m| m.id == "greeter").unwrap();
    assert_eq!(greeter.dependents, vec!["needy"]);
    assert_eq!(greeter.commands, 1);
    assert_eq!(greeter.events, 3);
}

#[tokio::test]
async fn test_reload_of_unloaded_module_loads_it() {
    let (fw, _) = framework(config());
    let hits = register_greeter(&fw);

    fw.loader().load("greeter").await.unwrap();
    let loaded = footprint(&fw, "greeting");
    fw.loader().unload("greeter", false).await.unwrap();
    assert_eq!(fw.loader().state("greeter"), None);

    fw.loader().reload("greeter", false).await.unwrap();
    assert_eq!(fw.loader().state("greeter"), Some(ModuleState::Loaded));
    assert_eq!(footprint(&fw, "greeting"), loaded);

    fw.services().bus.publish(InternalEvent::new("greeter.ping", json!({}))).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_reload_leaves_module_errored() {
    let (fw, _) = framework(config());
    let fail = Arc::new(AtomicBool::new(false));
    let flag = fail.clone();
    fw.loader().register_factory("flaky", move || {
        Arc::new(Flaky { fail: flag.clone(), panic: false }) as Arc<dyn Module>
    });

    fw.loader().load("flaky").await.unwrap();
    fail.store(true, Ordering::SeqCst);

    assert!(fw.loader().reload("flaky", false).await.is_err());
    assert_eq!(fw.loader().state("flaky"), Some(ModuleState::Errored));
    assert!(fw.services().commands.is_empty());
    assert_eq!(fw.services().bus.total_listeners(), 0);

    fw.loader().unload("flaky", false).await.unwrap();
    assert_eq!(fw.loader().state("flaky"), None);
}

#[tokio::test]
async fn test_dependency_cycle_rejected() {
    let (fw, _) = framework(config());
    let cyclic = Arc::new(AtomicBool::new(false));

    register_needs(&fw, "a", "b", "a");
    let flag = cyclic.clone();
    fw.loader().register_factory("b", move || {
        if flag.load(Ordering::SeqCst) {
            Arc::new(Needs { dependency: "a", command: "b" }) as Arc<dyn Module>
        } else {
            Arc::new(Protected) as Arc<dyn Module>
        }
    });

    fw.loader().load("b").await.unwrap();
    fw.loader().load("a").await.unwrap();
    cyclic.store(true, Ordering::SeqCst);

    match fw.loader().reload("b", true).await {
        Err(BotError::ModuleInit { source, .. }) => {
            assert!(matches!(*source, BotError::DependencyCycle { .. }));
        }
        other => panic!("expected a dependency cycle, got {:?}", other),
    }
    assert_eq!(fw.loader().state("b"), Some(ModuleState::Errored));
}

#[tokio::test]
async fn test_guild_disable_skips_commands_and_events() {
    let (fw, _) = framework(config());
    let hits = register_greeter(&fw);
    fw.loader().register_factory("protected", || Arc::new(Protected) as Arc<dyn Module>);
    fw.loader().load("greeter").await.unwrap();
    fw.loader().load("protected").await.unwrap();

    let g1 = GuildId::new("g1");
    fw.loader().disable_module_for_guild("greeter", &g1).await.unwrap();
    assert!(fw.loader().is_module_disabled_for_guild("greeter", &g1).await.unwrap());
    assert!(!fw.loader().is_module_disabled_for_guild("greeter", &GuildId::new("g2")).await.unwrap());

    let services = fw.services();
    let hello = |guild: &str| Message::new("c", User::new("u"), "--hello").in_guild(Guild::new(guild));

    let outcome = services.commands.process_message(hello("g1"), services).await;
    assert_eq!(outcome, botcore::application::services::DispatchOutcome::Disabled);
    services
        .bus
        .publish(InternalEvent::new("greeter.ping", json!({})).in_guild(g1.clone()))
        .await;
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    services.commands.process_message(hello("g2"), services).await;
    services
        .bus
        .publish(InternalEvent::new("greeter.ping", json!({})).in_guild(GuildId::new("g2")))
        .await;
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    fw.loader().enable_module_for_guild("greeter", &g1).await.unwrap();
    services.commands.process_message(hello("g1"), services).await;
    assert_eq!(hits.load(Ordering::SeqCst), 3);

    assert!(matches!(
        fw.loader().disable_module_for_guild("protected", &g1).await,
        Err(BotError::NotDisableable(_))
    ));
    assert!(!fw.loader().is_module_disabled_for_guild("protected", &g1).await.unwrap());
    assert!(matches!(
        fw.loader().disable_module_for_guild("ghost", &g1).await,
        Err(BotError::UnknownModule(_))
    ));
}
