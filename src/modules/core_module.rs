//! Core module - help, module management and per-guild settings

use std::sync::{Arc, Weak};

use async_trait::async_trait;

use crate::application::errors::BotError;
use crate::application::modules::{Module, ModuleContext, ModuleLoader};
use crate::domain::entities::{Command, CommandContext, PermissionLevel};

pub const ID: &str = "core";

pub struct CoreModule;

#[async_trait]
impl Module for CoreModule {
    fn description(&self) -> &str {
        "Help, module management and guild settings"
    }

    fn allow_disabling(&self) -> bool {
        false
    }

    async fn init(&self, ctx: &ModuleContext) -> Result<(), BotError> {
        let loader = ctx
            .loader()
            .map(|l| Arc::downgrade(&l))
            .ok_or_else(|| BotError::Internal("module loader is gone".to_string()))?;

        ctx.register_command(
            Command::literal("help")
                .with_description("List commands, or describe one")
                .with_usage("help [command]")
                .with_handler(help),
        )?;

        ctx.register_command(
            Command::literal("ping")
                .with_description("Check that the bot is alive")
                .with_handler(|cmd: CommandContext| async move { cmd.reply("Pong!").await }),
        )?;

        let l = loader.clone();
        ctx.register_command(
            Command::literal("modules")
                .with_description("List modules and their state")
                .with_permission(PermissionLevel::Admin)
                .with_handler(move |cmd| modules(cmd, l.clone())),
        )?;

        let l = loader.clone();
        ctx.register_command(
            Command::literal("load")
                .with_description("Load a module")
                .with_usage("load <module>")
                .with_permission(PermissionLevel::Owner)
                .with_handler(move |cmd| lifecycle(cmd, l.clone(), Lifecycle::Load)),
        )?;

        let l = loader.clone();
        ctx.register_command(
            Command::literal("unload")
                .with_description("Unload a module; --force also unloads its dependents")
                .with_usage("unload <module> [--force]")
                .with_permission(PermissionLevel::Owner)
                .with_handler(move |cmd| lifecycle(cmd, l.clone(), Lifecycle::Unload)),
        )?;

        let l = loader.clone();
        ctx.register_command(
            Command::literal("reload")
                .with_description("Reload a module; --force keeps its dependents loaded")
                .with_usage("reload <module> [--force]")
                .with_permission(PermissionLevel::Owner)
                .with_handler(move |cmd| lifecycle(cmd, l.clone(), Lifecycle::Reload)),
        )?;

        let l = loader.clone();
        ctx.register_command(
            Command::literal("enable")
                .with_description("Enable a module in this guild")
                .with_usage("enable <module>")
                .with_permission(PermissionLevel::Admin)
                .with_handler(move |cmd| toggle(cmd, l.clone(), true)),
        )?;

        let l = loader;
        ctx.register_command(
            Command::literal("disable")
                .with_description("Disable a module in this guild")
                .with_usage("disable <module>")
                .with_permission(PermissionLevel::Admin)
                .with_handler(move |cmd| toggle(cmd, l.clone(), false)),
        )?;

        ctx.register_command(
            Command::literal("prefix")
                .with_description("Show or change the command prefix in this guild")
                .with_usage("prefix [new-prefix|reset]")
                .with_permission(PermissionLevel::Admin)
                .with_handler(prefix),
        )?;

        Ok(())
    }
}

fn upgrade(loader: &Weak<ModuleLoader>) -> Result<Arc<ModuleLoader>, BotError> {
    loader
        .upgrade()
        .ok_or_else(|| BotError::Internal("module loader is gone".to_string()))
}

async fn help(cmd: CommandContext) -> Result<(), BotError> {
    let registry = &cmd.services.commands;
    let prefix = registry.prefixes().resolve(cmd.guild_id()).await;

    if let Some(name) = cmd.arg(0) {
        let Some(command) = registry.find(name) else {
            return cmd.reply(format!("Command {}{} not found", prefix, name)).await;
        };
        let mut help = format!(
            "{}{} - {}",
            prefix,
            command.name,
            command.description.as_deref().unwrap_or("No description")
        );
        if let Some(usage) = &command.usage {
            help.push_str(&format!("\nUsage: {}{}", prefix, usage));
        }
        if !command.aliases.is_empty() {
            help.push_str(&format!("\nAliases: {}", command.aliases.join(", ")));
        }
        return cmd.reply(help).await;
    }

    let permissions = registry.permissions();
    let level = permissions.level_of(&cmd.message.author, cmd.message.guild.as_ref());

    let mut help = "Available commands:\n".to_string();
    for command in registry.commands() {
        if command.trigger.is_pattern() || command.permission > level {
            continue;
        }
        help.push_str(&format!(
            "  {}{} - {}\n",
            prefix,
            command.name,
            command.description.as_deref().unwrap_or("")
        ));
    }
    cmd.reply(help.trim_end()).await
}

async fn modules(cmd: CommandContext, loader: Weak<ModuleLoader>) -> Result<(), BotError> {
    let loader = upgrade(&loader)?;
    let resident = loader.list();

    let mut out = "Modules:\n".to_string();
    for info in &resident {
        let mut line = format!("  {} [{}]", info.id, info.state);
        if !info.dependencies.is_empty() {
            line.push_str(&format!(" needs {}", info.dependencies.join(", ")));
        }
        if let Some(guild) = cmd.guild_id() {
            if loader.is_module_disabled_for_guild(&info.id, guild).await.unwrap_or(false) {
                line.push_str(" (disabled here)");
            }
        }
        out.push_str(&line);
        out.push('\n');
    }

    let idle: Vec<String> = loader
        .available()
        .into_iter()
        .filter(|id| !resident.iter().any(|m| &m.id == id))
        .collect();
    if !idle.is_empty() {
        out.push_str(&format!("Not loaded: {}", idle.join(", ")));
    }
    cmd.reply(out.trim_end()).await
}

#[derive(Debug, Clone, Copy)]
enum Lifecycle {
    Load,
    Unload,
    Reload,
}

async fn lifecycle(cmd: CommandContext, loader: Weak<ModuleLoader>, op: Lifecycle) -> Result<(), BotError> {
    let Some(id) = cmd.arg(0).map(str::to_string) else {
        let usage = match op {
            Lifecycle::Load => "load <module>",
            Lifecycle::Unload => "unload <module> [--force]",
            Lifecycle::Reload => "reload <module> [--force]",
        };
        return cmd.reply(format!("Usage: {}", usage)).await;
    };
    let loader = upgrade(&loader)?;

    let force = cmd.args.iter().skip(1).any(|a| a == "--force");
    let (result, done) = match op {
        Lifecycle::Load => (loader.load(&id).await, "Loaded"),
        Lifecycle::Unload => (loader.unload(&id, force).await, "Unloaded"),
        Lifecycle::Reload => (loader.reload(&id, force).await, "Reloaded"),
    };

    match result {
        Ok(()) => cmd.reply(format!("{} {}", done, id)).await,
        Err(e) => cmd.reply(format!("Failed: {}", e)).await,
    }
}

async fn toggle(cmd: CommandContext, loader: Weak<ModuleLoader>, enable: bool) -> Result<(), BotError> {
    let Some(guild) = cmd.guild_id().cloned() else {
        return cmd.reply("This command only works in a guild").await;
    };
    let Some(id) = cmd.arg(0).map(str::to_string) else {
        let verb = if enable { "enable" } else { "disable" };
        return cmd.reply(format!("Usage: {} <module>", verb)).await;
    };
    let loader = upgrade(&loader)?;

    let result = if enable {
        loader.enable_module_for_guild(&id, &guild).await
    } else {
        loader.disable_module_for_guild(&id, &guild).await
    };

    match result {
        Ok(()) if enable => cmd.reply(format!("Enabled {} in this guild", id)).await,
        Ok(()) => cmd.reply(format!("Disabled {} in this guild", id)).await,
        Err(e) => cmd.reply(format!("Failed: {}", e)).await,
    }
}

async fn prefix(cmd: CommandContext) -> Result<(), BotError> {
    let prefixes = cmd.services.commands.prefixes().clone();

    let Some(arg) = cmd.arg(0).map(str::to_string) else {
        let current = prefixes.resolve(cmd.guild_id()).await;
        return cmd.reply(format!("Current prefix: {}", current)).await;
    };
    let Some(guild) = cmd.guild_id().cloned() else {
        return cmd.reply("The prefix can only be changed in a guild").await;
    };

    if arg == "reset" {
        prefixes.clear_guild_prefix(&guild).await?;
        cmd.reply(format!("Prefix reset to {}", prefixes.default_prefix())).await
    } else {
        prefixes.set_guild_prefix(&guild, &arg).await?;
        cmd.reply(format!("Prefix set to {}", arg)).await
    }
}
