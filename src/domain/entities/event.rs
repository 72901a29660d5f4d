//! Event payloads for the three event namespaces a module can listen on

use super::{Guild, GuildId, Message};
use serde_json::Value;
use std::fmt;

/// Platform events the gateway can deliver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayEventKind {
    Ready,
    MessageCreate,
    GuildCreate,
    GuildDelete,
    Debug,
    Error,
}

impl GatewayEventKind {
    pub fn as_str(&self) -> &str {
        match self {
            GatewayEventKind::Ready => "ready",
            GatewayEventKind::MessageCreate => "message",
            GatewayEventKind::GuildCreate => "guild_create",
            GatewayEventKind::GuildDelete => "guild_delete",
            GatewayEventKind::Debug => "debug",
            GatewayEventKind::Error => "error",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "ready" => Some(GatewayEventKind::Ready),
            "message" => Some(GatewayEventKind::MessageCreate),
            "guild_create" => Some(GatewayEventKind::GuildCreate),
            "guild_delete" => Some(GatewayEventKind::GuildDelete),
            "debug" => Some(GatewayEventKind::Debug),
            "error" => Some(GatewayEventKind::Error),
            _ => None,
        }
    }
}

impl fmt::Display for GatewayEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw platform event
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    Ready,
    MessageCreate(Message),
    GuildCreate(Guild),
    GuildDelete(Guild),
    Debug(String),
    Error(String),
}

impl GatewayEvent {
    pub fn kind(&self) -> GatewayEventKind {
        match self {
            GatewayEvent::Ready => GatewayEventKind::Ready,
            GatewayEvent::MessageCreate(_) => GatewayEventKind::MessageCreate,
            GatewayEvent::GuildCreate(_) => GatewayEventKind::GuildCreate,
            GatewayEvent::GuildDelete(_) => GatewayEventKind::GuildDelete,
            GatewayEvent::Debug(_) => GatewayEventKind::Debug,
            GatewayEvent::Error(_) => GatewayEventKind::Error,
        }
    }
}

/// An event published on the framework-wide bus
#[derive(Debug, Clone)]
pub struct InternalEvent {
    pub name: String,
    pub guild: Option<GuildId>,
    pub data: Value,
}

impl InternalEvent {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            guild: None,
            data,
        }
    }

    pub fn in_guild(mut self, guild: GuildId) -> Self {
        self.guild = Some(guild);
        self
    }
}

/// A change notification from the data store. `value` is `None` after a delete.
#[derive(Debug, Clone, PartialEq)]
pub struct DataChange {
    pub key: String,
    pub value: Option<Value>,
}

/// What a module's event handler receives, whatever namespace it came from
#[derive(Debug, Clone)]
pub enum EventPayload {
    Platform(GatewayEvent),
    DataStore(DataChange),
    Internal(InternalEvent),
}

impl EventPayload {
    /// The guild this event is scoped to, if any.
    ///
    /// Platform events carry it on the message or are the guild itself. Internal
    /// events carry it only when the emitter set one explicitly. Data store changes
    /// are never guild-scoped; key layouts are up to the modules writing them.
    pub fn guild_id(&self) -> Option<&GuildId> {
        match self {
            EventPayload::Platform(GatewayEvent::MessageCreate(message)) => message.guild_id(),
            EventPayload::Platform(GatewayEvent::GuildCreate(guild))
            | EventPayload::Platform(GatewayEvent::GuildDelete(guild)) => Some(&guild.id),
            EventPayload::Platform(_) => None,
            EventPayload::DataStore(_) => None,
            EventPayload::Internal(event) => event.guild.as_ref(),
        }
    }
}

/// Event namespaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Platform,
    DataStore,
    Internal,
}

/// An event name resolved to its namespace once, at registration time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKey {
    Platform(GatewayEventKind),
    DataStore(String),
    Internal(String),
}

impl EventKey {
    /// Resolves `platform.<event>`, `datastore.<channel>` or any other name
    /// (internal bus). Returns `None` for unknown platform events or an empty channel.
    pub fn parse(name: &str) -> Option<Self> {
        match name.split_once('.') {
            Some(("platform", event)) => GatewayEventKind::parse(event).map(EventKey::Platform),
            Some(("datastore", channel)) if !channel.is_empty() => {
                Some(EventKey::DataStore(channel.to_string()))
            }
            Some(("datastore", _)) => None,
            _ if name.is_empty() => None,
            _ => Some(EventKey::Internal(name.to_string())),
        }
    }

    pub fn namespace(&self) -> Namespace {
        match self {
            EventKey::Platform(_) => Namespace::Platform,
            EventKey::DataStore(_) => Namespace::DataStore,
            EventKey::Internal(_) => Namespace::Internal,
        }
    }
}
