use async_trait::async_trait;

use crate::application::errors::BotError;
use crate::application::handler::{Listener, ListenerId};
use crate::domain::entities::{GatewayEvent, GatewayEventKind};

/// Gateway trait - the chat platform transport
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Connect to the platform and start delivering events
    async fn login(&self) -> Result<(), BotError>;

    /// Listen for a platform event
    fn on(&self, kind: GatewayEventKind, listener: Listener<GatewayEvent>) -> ListenerId;

    /// Stop a listener. Returns false when it was not registered.
    fn remove_listener(&self, kind: GatewayEventKind, id: ListenerId) -> bool;

    fn listener_count(&self, kind: GatewayEventKind) -> usize;

    /// Send a message to a channel
    async fn send_message(&self, channel_id: &str, text: &str) -> Result<(), BotError>;

    /// Get bot info
    fn bot_info(&self) -> BotInfo;
}

/// Bot information
#[derive(Debug, Clone)]
pub struct BotInfo {
    pub id: String,
    pub name: String,
}
