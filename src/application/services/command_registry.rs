//! Command registry - holds every registered command and dispatches messages to them

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::application::errors::BotError;
use crate::application::handler::run_isolated;
use crate::application::messaging::parser::{MessageParser, ParsedInput};
use crate::application::messaging::prefix::PrefixResolver;
use crate::application::modules::GuildModuleState;
use crate::application::services::permissions::PermissionEvaluator;
use crate::application::Services;
use crate::domain::entities::{Command, CommandContext, Message, Trigger};

/// Called when a user lacks the permission level a command requires
pub type DenialHook = Arc<dyn Fn(&Message, &Command) + Send + Sync>;

/// What happened to a message handed to [`CommandRegistry::process_message`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No prefix, or a bot author
    Ignored,
    /// Prefixed, but no command matched
    NotFound,
    Denied,
    /// The command's module is disabled in this guild
    Disabled,
    Completed,
    /// The handler returned an error or panicked; already logged
    Failed,
}

#[derive(Default)]
struct CommandTable {
    /// Registration order, used for pattern matching and listings
    commands: Vec<Arc<Command>>,
    /// Lowercased literal names and aliases
    literals: HashMap<String, Arc<Command>>,
}

impl CommandTable {
    fn remove(&mut self, command: &Arc<Command>) -> bool {
        let before = self.commands.len();
        self.commands.retain(|c| !Arc::ptr_eq(c, command));
        self.literals.retain(|_, c| !Arc::ptr_eq(c, command));
        before != self.commands.len()
    }
}

pub struct CommandRegistry {
    table: RwLock<CommandTable>,
    permissions: PermissionEvaluator,
    guild_state: Arc<GuildModuleState>,
    prefixes: PrefixResolver,
    on_denied: Option<DenialHook>,
}

impl CommandRegistry {
    pub fn new(
        permissions: PermissionEvaluator,
        guild_state: Arc<GuildModuleState>,
        prefixes: PrefixResolver,
    ) -> Self {
        Self {
            table: RwLock::new(CommandTable::default()),
            permissions,
            guild_state,
            prefixes,
            on_denied: None,
        }
    }

    pub fn with_denial_hook(mut self, hook: DenialHook) -> Self {
        self.on_denied = Some(hook);
        self
    }

    pub fn prefixes(&self) -> &PrefixResolver {
        &self.prefixes
    }

    pub fn permissions(&self) -> &PermissionEvaluator {
        &self.permissions
    }

    /// Add a command. Fails if its name, an alias or its pattern text is taken.
    pub fn register(&self, command: Command) -> Result<Arc<Command>, BotError> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        let keys = command.keys();

        match &command.trigger {
            Trigger::Pattern(regex) => {
                if table
                    .commands
                    .iter()
                    .any(|c| c.trigger.is_pattern() && c.trigger.as_str() == regex.as_str())
                {
                    return Err(BotError::DuplicateRegistration(format!(
                        "command pattern '{}'",
                        regex.as_str()
                    )));
                }
            }
            Trigger::Literal(_) => {
                if let Some(taken) = keys.iter().find(|k| table.literals.contains_key(*k)) {
                    return Err(BotError::DuplicateRegistration(format!("command '{}'", taken)));
                }
            }
        }

        let command = Arc::new(command);
        if !command.trigger.is_pattern() {
            for key in keys {
                table.literals.insert(key, command.clone());
            }
        }
        table.commands.push(command.clone());

        tracing::debug!("Registered command {} ({})", command.name, command.trigger.as_str());
        Ok(command)
    }

    /// Remove this exact command. No-op if it is not registered.
    pub fn unregister(&self, command: &Arc<Command>) -> bool {
        self.table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(command)
    }

    /// Remove the command with this literal name (any case) or this pattern text
    pub fn unregister_trigger(&self, trigger: &str) -> bool {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        let target = table.commands.iter().find(|c| c.trigger.is(trigger)).cloned();
        match target {
            Some(command) => table.remove(&command),
            None => false,
        }
    }

    /// Look up a literal command by name or alias
    pub fn find(&self, name: &str) -> Option<Arc<Command>> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .literals
            .get(&name.to_lowercase())
            .cloned()
    }

    /// Match parsed input: literal name first, then patterns in registration order.
    /// Returns the command and, for patterns, its capture groups.
    pub fn resolve(&self, input: &ParsedInput) -> Option<(Arc<Command>, Vec<String>)> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);

        if let Some(command) = table.literals.get(&input.name.to_lowercase()) {
            return Some((command.clone(), Vec::new()));
        }

        table.commands.iter().find_map(|command| {
            let Trigger::Pattern(regex) = &command.trigger else {
                return None;
            };
            let captures = regex.captures(&input.body)?;
            let groups = captures
                .iter()
                .skip(1)
                .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
                .collect();
            Some((command.clone(), groups))
        })
    }

    pub fn commands(&self) -> Vec<Arc<Command>> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .commands
            .clone()
    }

    pub fn module_commands(&self, module: &str) -> Vec<Arc<Command>> {
        self.commands()
            .into_iter()
            .filter(|c| c.module.as_deref() == Some(module))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .commands
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run the command a message invokes, if any.
    ///
    /// Unknown commands, denials and disabled modules are not errors. Handler
    /// failures are logged here and never propagate to the caller.
    pub async fn process_message(&self, message: Message, services: &Services) -> DispatchOutcome {
        if message.author.is_bot {
            return DispatchOutcome::Ignored;
        }

        let prefix = self.prefixes.resolve(message.guild_id()).await;
        let Some(input) = MessageParser::parse(&prefix, &message.content) else {
            return DispatchOutcome::Ignored;
        };

        let Some((command, captures)) = self.resolve(&input) else {
            tracing::debug!("No command matches '{}'", input.name);
            return DispatchOutcome::NotFound;
        };

        if !self
            .permissions
            .check(&message.author, message.guild.as_ref(), command.permission)
        {
            tracing::debug!(
                "{} lacks {} permission for {}",
                message.author.id,
                command.permission,
                command.name
            );
            if let Some(hook) = &self.on_denied {
                hook(&message, &command);
            }
            return DispatchOutcome::Denied;
        }

        if let (Some(module), Some(guild)) = (&command.module, message.guild_id()) {
            if self.guild_state.should_skip(module, guild).await {
                tracing::debug!("Module {} is disabled in guild {}, skipping {}", module, guild, command.name);
                return DispatchOutcome::Disabled;
            }
        }

        let Some(handler) = command.handler.clone() else {
            tracing::warn!("Command {} has no handler", command.name);
            return DispatchOutcome::Completed;
        };

        // args drop the command name for literal triggers; patterns see every token
        let args = match &command.trigger {
            Trigger::Literal(_) => input.args,
            Trigger::Pattern(_) => input.body.split_whitespace().map(str::to_string).collect(),
        };

        let ctx = CommandContext {
            message,
            command: command.name.clone(),
            args,
            captures,
            services: services.clone(),
        };

        let label = format!("command {}", command.name);
        match run_isolated(&label, handler(ctx)).await {
            Ok(()) => DispatchOutcome::Completed,
            Err(e) => {
                tracing::error!(
                    "Error running {} (module {}): {}",
                    label,
                    command.module.as_deref().unwrap_or("-"),
                    e
                );
                DispatchOutcome::Failed
            }
        }
    }
}
