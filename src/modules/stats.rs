//! Stats module - per-guild message counter

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::application::errors::BotError;
use crate::application::messaging::EventHandler;
use crate::application::modules::{Module, ModuleContext};
use crate::domain::entities::{
    Command, CommandContext, EventPayload, GatewayEvent, GuildId, InternalEvent, PermissionLevel,
};

pub const ID: &str = "stats";

/// Internal event that clears a guild's counter
pub const RESET_EVENT: &str = "stats.reset";

pub struct StatsModule;

pub fn counter_key(guild: &GuildId) -> String {
    format!("stats:{}:messages", guild)
}

#[async_trait]
impl Module for StatsModule {
    fn description(&self) -> &str {
        "Counts messages per guild"
    }

    async fn init(&self, ctx: &ModuleContext) -> Result<(), BotError> {
        ctx.require_module(super::core_module::ID)?;

        let store = ctx.store();
        ctx.register_event(
            "platform.message",
            EventHandler::new(move |payload| {
                let store = store.clone();
                async move {
                    let EventPayload::Platform(GatewayEvent::MessageCreate(message)) = payload else {
                        return Ok(());
                    };
                    let Some(guild) = message.guild_id() else {
                        return Ok(());
                    };
                    if message.author.is_bot {
                        return Ok(());
                    }

                    let key = counter_key(guild);
                    let count = store.get(&key).await?.and_then(|v| v.as_u64()).unwrap_or(0);
                    store.set(&key, json!(count + 1)).await?;
                    Ok(())
                }
            }),
        )
        .await?;

        let store = ctx.store();
        ctx.register_event(
            RESET_EVENT,
            EventHandler::new(move |payload| {
                let store = store.clone();
                async move {
                    if let Some(guild) = payload.guild_id() {
                        store.del(&counter_key(guild)).await?;
                        tracing::info!("Message counter reset for guild {}", guild);
                    }
                    Ok(())
                }
            }),
        )
        .await?;

        ctx.register_command(
            Command::literal("stats")
                .with_description("Show how many messages this guild has sent")
                .with_usage("stats [reset]")
                .with_handler(stats),
        )?;

        Ok(())
    }
}

async fn stats(cmd: CommandContext) -> Result<(), BotError> {
    let Some(guild) = cmd.guild_id().cloned() else {
        return cmd.reply("Stats are only kept for guilds").await;
    };

    if cmd.arg(0) == Some("reset") {
        let permissions = cmd.services.commands.permissions();
        if !permissions.check(&cmd.message.author, cmd.message.guild.as_ref(), PermissionLevel::Admin) {
            return cmd.reply("Only admins can reset stats").await;
        }
        let event = InternalEvent::new(RESET_EVENT, Value::Null).in_guild(guild);
        cmd.services.bus.publish(event).await;
        return cmd.reply("Stats reset").await;
    }

    let count = cmd
        .services
        .store
        .get(&counter_key(&guild))
        .await?
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    cmd.reply(format!("Messages seen in this guild: {}", count)).await
}
