//! Console gateway for development/testing

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::application::errors::BotError;
use crate::application::handler::{Listener, ListenerId};
use crate::application::messaging::EventEmitter;
use crate::domain::entities::{GatewayEvent, GatewayEventKind, Guild, Message, User};
use crate::domain::traits::{BotInfo, Gateway};
use crate::infrastructure::config::ConsoleConfig;

const CHANNEL: &str = "console";

/// Gateway that reads messages from stdin and prints replies.
///
/// Every line is delivered as a message from the configured user, inside the
/// configured guild when one is set. Replies are also kept in a transcript.
pub struct ConsoleGateway {
    info: BotInfo,
    user: User,
    guild: Option<Guild>,
    events: EventEmitter<GatewayEventKind, GatewayEvent>,
    transcript: Mutex<Vec<(String, String)>>,
    echo: bool,
    next_id: AtomicU64,
}

impl ConsoleGateway {
    pub fn new(bot_name: impl Into<String>, config: &ConsoleConfig) -> Self {
        Self {
            info: BotInfo {
                id: "console-bot".to_string(),
                name: bot_name.into(),
            },
            user: User::new(config.user.clone())
                .with_username(config.user.clone())
                .with_roles(config.roles.clone()),
            guild: config.guild.as_ref().map(|g| Guild::new(g.clone()).with_name(g.clone())),
            events: EventEmitter::new(),
            transcript: Mutex::new(Vec::new()),
            echo: true,
            next_id: AtomicU64::new(1),
        }
    }

    /// Keep replies in the transcript without printing them
    pub fn quiet(mut self) -> Self {
        self.echo = false;
        self
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn guild(&self) -> Option<&Guild> {
        self.guild.as_ref()
    }

    /// Deliver an event to every listener of its kind
    pub async fn dispatch(&self, event: GatewayEvent) -> usize {
        self.events.emit(&event.kind(), event).await
    }

    /// Build a message from the console user, as a line typed on stdin would be
    pub fn message(&self, content: impl Into<String>) -> Message {
        let mut message = Message::new(CHANNEL, self.user.clone(), content);
        message.id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        match &self.guild {
            Some(guild) => message.in_guild(guild.clone()),
            None => message,
        }
    }

    /// Replies sent so far, as (channel, text)
    pub fn transcript(&self) -> Vec<(String, String)> {
        self.transcript
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn take_transcript(&self) -> Vec<(String, String)> {
        std::mem::take(&mut *self.transcript.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Read stdin until EOF or `/quit`, delivering each line as a message
    pub async fn run(&self) -> Result<(), BotError> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        println!("{} console ready, type /quit to exit", self.info.name);

        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| BotError::Gateway(format!("Failed to read stdin: {}", e)))?
        {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line == "/quit" {
                break;
            }
            self.dispatch(GatewayEvent::MessageCreate(self.message(line))).await;
        }

        tracing::info!("Console input closed");
        Ok(())
    }
}

#[async_trait]
impl Gateway for ConsoleGateway {
    async fn login(&self) -> Result<(), BotError> {
        tracing::info!("Starting console gateway (dev mode)");
        self.dispatch(GatewayEvent::Ready).await;
        if let Some(guild) = &self.guild {
            self.dispatch(GatewayEvent::GuildCreate(guild.clone())).await;
        }
        Ok(())
    }

    fn on(&self, kind: GatewayEventKind, listener: Listener<GatewayEvent>) -> ListenerId {
        self.events.on(kind, listener)
    }

    fn remove_listener(&self, kind: GatewayEventKind, id: ListenerId) -> bool {
        self.events.remove_listener(&kind, id)
    }

    fn listener_count(&self, kind: GatewayEventKind) -> usize {
        self.events.listener_count(&kind)
    }

    async fn send_message(&self, channel_id: &str, text: &str) -> Result<(), BotError> {
        if self.echo {
            println!("[BOT] {}", text);
        }
        self.transcript
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((channel_id.to_string(), text.to_string()));
        Ok(())
    }

    fn bot_info(&self) -> BotInfo {
        self.info.clone()
    }
}
