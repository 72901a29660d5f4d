use std::fmt;
use std::future::Future;
use std::sync::Arc;

use regex_lite::Regex;

use super::{GuildId, Message, PermissionLevel};
use crate::application::errors::{BotError, CommandError};
use crate::application::handler::{BoxFuture, HandlerResult};
use crate::application::Services;

/// Command handler function type
pub type CommandHandler = Arc<dyn Fn(CommandContext) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// What identifies a command in a message
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Matched case-insensitively against the first token
    Literal(String),
    /// Matched against the whole text after the prefix
    Pattern(Regex),
}

impl Trigger {
    pub fn as_str(&self) -> &str {
        match self {
            Trigger::Literal(name) => name,
            Trigger::Pattern(regex) => regex.as_str(),
        }
    }

    pub fn is_pattern(&self) -> bool {
        matches!(self, Trigger::Pattern(_))
    }

    /// Whether `text` names this trigger for registry lookups
    pub fn is(&self, text: &str) -> bool {
        match self {
            Trigger::Literal(name) => name.to_lowercase() == text.to_lowercase(),
            Trigger::Pattern(regex) => regex.as_str() == text,
        }
    }
}

/// Represents a bot command. Immutable once registered.
pub struct Command {
    pub name: String,
    pub trigger: Trigger,
    pub description: Option<String>,
    pub aliases: Vec<String>,
    pub usage: Option<String>,
    pub permission: PermissionLevel,
    /// Id of the module that registered this command
    pub module: Option<String>,
    pub handler: Option<CommandHandler>,
}

impl Command {
    /// A command triggered by its (case-insensitive) name
    pub fn literal(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            trigger: Trigger::Literal(name.clone()),
            name,
            description: None,
            aliases: Vec::new(),
            usage: None,
            permission: PermissionLevel::Everyone,
            module: None,
            handler: None,
        }
    }

    /// A command triggered by a regex tested against the text after the prefix
    pub fn pattern(name: impl Into<String>, pattern: &str) -> Result<Self, BotError> {
        let regex = Regex::new(pattern)
            .map_err(|e| CommandError::InvalidArgs(format!("invalid pattern '{}': {}", pattern, e)))?;
        Ok(Self {
            trigger: Trigger::Pattern(regex),
            ..Self::literal(name)
        })
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_aliases(mut self, aliases: Vec<String>) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn with_usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = Some(usage.into());
        self
    }

    pub fn with_permission(mut self, level: PermissionLevel) -> Self {
        self.permission = level;
        self
    }

    pub fn with_handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(CommandContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.handler = Some(Arc::new(move |ctx| Box::pin(handler(ctx))));
        self
    }

    pub(crate) fn owned_by(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// Registry keys this command occupies: its trigger text plus any aliases
    pub fn keys(&self) -> Vec<String> {
        match &self.trigger {
            Trigger::Literal(name) => std::iter::once(name)
                .chain(self.aliases.iter())
                .map(|k| k.to_lowercase())
                .collect(),
            Trigger::Pattern(regex) => vec![regex.as_str().to_string()],
        }
    }

    pub fn matches(&self, input: &str) -> bool {
        match &self.trigger {
            Trigger::Literal(_) => {
                let input = input.to_lowercase();
                self.keys().contains(&input)
            }
            Trigger::Pattern(regex) => regex.is_match(input),
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("trigger", &self.trigger)
            .field("permission", &self.permission)
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}

/// Context handed to a command handler
#[derive(Clone)]
pub struct CommandContext {
    pub message: Message,
    /// Name of the command being run
    pub command: String,
    /// Whitespace-separated tokens after the command name
    pub args: Vec<String>,
    /// Capture groups when the command was matched by a pattern
    pub captures: Vec<String>,
    pub services: Services,
}

impl CommandContext {
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    pub fn guild_id(&self) -> Option<&GuildId> {
        self.message.guild_id()
    }

    /// Reply in the channel the command came from
    pub async fn reply(&self, text: impl Into<String>) -> HandlerResult {
        self.services
            .gateway
            .send_message(&self.message.channel_id, &text.into())
            .await
    }
}
