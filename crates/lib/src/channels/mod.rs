//! Communication channels (currently Telegram).
//!
//! The `ChannelHandle` trait is the seam between the relay and a concrete
//! chat service: the server replies and stops connectors through it, and
//! tests substitute a recording fake.

mod inbound;
mod telegram;

pub use inbound::InboundMessage;
pub use telegram::{inbound_from_update, TelegramChannel, TelegramUpdate, TokenCheck};

use async_trait::async_trait;

/// Handle to a running channel (stop, send message).
#[async_trait]
pub trait ChannelHandle: Send + Sync {
    /// Channel id (e.g. "telegram").
    fn id(&self) -> &str;
    /// Stop the channel connector.
    fn stop(&self);
    /// Send a text message to a conversation (e.g. Telegram chat_id).
    async fn send_message(&self, conversation_id: &str, text: &str) -> Result<(), String>;
}

/// Send a message and log delivery failures. Replies are best-effort: a
/// failed send must never abort the handling of the inbound message.
pub async fn send_or_log(channel: &dyn ChannelHandle, conversation_id: &str, text: &str) {
    if let Err(e) = channel.send_message(conversation_id, text).await {
        log::warn!("sendMessage to {} failed: {}", conversation_id, e);
    }
}
