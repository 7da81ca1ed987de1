//! Inbound message from a channel: delivered to the relay for handling.

use chrono::{DateTime, Utc};

/// A message from a channel to be answered by the relay. Ephemeral; dropped
/// once the reply has been sent.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub channel_id: String,
    pub conversation_id: String,
    pub text: String,
    /// When the sender wrote the message (Telegram `date`).
    pub timestamp: DateTime<Utc>,
    /// True when the message came from a one-on-one chat; some commands are
    /// restricted to private chats.
    pub private: bool,
}
