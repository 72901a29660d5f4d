//! Domain entities - Core business objects

pub mod command;
pub mod event;
pub mod message;
pub mod permission;
pub mod user;

pub use command::{Command, CommandContext, CommandHandler, Trigger};
pub use event::{
    DataChange, EventKey, EventPayload, GatewayEvent, GatewayEventKind, InternalEvent, Namespace,
};
pub use message::{Guild, GuildId, Message};
pub use permission::PermissionLevel;
pub use user::User;
