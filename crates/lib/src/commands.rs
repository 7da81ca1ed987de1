//! Chat commands and the /pullmodel conversation flow.
//!
//! /pullmodel lists the models Ollama already has, then waits for the next
//! message from that chat and pulls it as a model name. /cancel aborts the
//! wait. Any other /command is ignored so the model never sees command noise.

use crate::channels::{send_or_log, ChannelHandle};
use crate::llm::OllamaClient;
use std::collections::HashSet;
use tokio::sync::RwLock;

/// Commands the relay understands. Anything else starting with '/' is Other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    PullModel,
    Cancel,
    Other,
}

/// Parse a leading bot command. None when the text is not a command.
/// Handles the `/command@botname` form Telegram uses in group chats.
pub fn parse_command(text: &str) -> Option<Command> {
    let first = text.trim().split_whitespace().next()?;
    if !first.starts_with('/') {
        return None;
    }
    let name = first.split('@').next().unwrap_or(first);
    match name {
        "/pullmodel" => Some(Command::PullModel),
        "/cancel" => Some(Command::Cancel),
        _ => Some(Command::Other),
    }
}

/// Chats waiting for a model name after /pullmodel.
pub struct PendingPulls {
    inner: RwLock<HashSet<String>>,
}

impl Default for PendingPulls {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingPulls {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashSet::new()),
        }
    }

    pub async fn set(&self, conversation_id: &str) {
        self.inner.write().await.insert(conversation_id.to_string());
    }

    pub async fn clear(&self, conversation_id: &str) {
        self.inner.write().await.remove(conversation_id);
    }

    pub async fn is_pending(&self, conversation_id: &str) -> bool {
        self.inner.read().await.contains(conversation_id)
    }
}

/// Handle /pullmodel: list available models and ask for one to pull.
/// Only allowed in private chats; group chats get a refusal.
pub async fn handle_pull_model(
    client: &OllamaClient,
    pending: &PendingPulls,
    channel: &dyn ChannelHandle,
    conversation_id: &str,
    private: bool,
) {
    if !private {
        send_or_log(channel, conversation_id, "this command is only available in private chats.")
            .await;
        return;
    }
    let listing = match client.list_models().await {
        Ok(models) if models.is_empty() => "there are currently no loaded models.".to_string(),
        Ok(models) => {
            let names: Vec<String> = models.iter().map(|m| format!("- {}", m.name)).collect();
            format!("available models:\n{}", names.join("\n"))
        }
        Err(e) => {
            log::error!("pullmodel: listing models failed: {}", e);
            send_or_log(channel, conversation_id, "sorry, I couldn't reach the model server.").await;
            return;
        }
    };
    send_or_log(channel, conversation_id, &listing).await;
    send_or_log(
        channel,
        conversation_id,
        "tell me which model to load into Ollama (send /cancel to quit).",
    )
    .await;
    pending.set(conversation_id).await;
}

/// Handle the model name sent after /pullmodel: pull it and report the result.
/// A failed pull keeps the conversation pending so the user can retry.
pub async fn handle_pending_pull(
    client: &OllamaClient,
    pending: &PendingPulls,
    channel: &dyn ChannelHandle,
    conversation_id: &str,
    model: &str,
) {
    let model = model.trim();
    send_or_log(
        channel,
        conversation_id,
        &format!("⬇️ {} is now being downloaded.", model),
    )
    .await;
    match client.pull_model(model).await {
        Ok(()) => {
            pending.clear(conversation_id).await;
            send_or_log(channel, conversation_id, "✅ the model is now available in Ollama.").await;
        }
        Err(e) => {
            log::error!("pullmodel: pulling {} failed: {}", model, e);
            send_or_log(
                channel,
                conversation_id,
                &format!("❌ failed to pull {}. check the model name and try again.", model),
            )
            .await;
        }
    }
}

/// Handle /cancel: clear any pending pull and confirm.
pub async fn handle_cancel(
    pending: &PendingPulls,
    channel: &dyn ChannelHandle,
    conversation_id: &str,
) {
    pending.clear(conversation_id).await;
    send_or_log(channel, conversation_id, "action canceled.").await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_commands() {
        assert_eq!(parse_command("/pullmodel"), Some(Command::PullModel));
        assert_eq!(parse_command("/cancel"), Some(Command::Cancel));
        assert_eq!(parse_command("  /pullmodel  "), Some(Command::PullModel));
    }

    #[test]
    fn parse_command_with_bot_suffix() {
        assert_eq!(parse_command("/pullmodel@ollagram_bot"), Some(Command::PullModel));
        assert_eq!(parse_command("/cancel@ollagram_bot"), Some(Command::Cancel));
    }

    #[test]
    fn unknown_commands_are_other() {
        assert_eq!(parse_command("/start"), Some(Command::Other));
        assert_eq!(parse_command("/help now"), Some(Command::Other));
    }

    #[test]
    fn plain_text_is_not_a_command() {
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command("what does /cancel do?"), None);
        assert_eq!(parse_command(""), None);
    }

    #[tokio::test]
    async fn pending_pulls_set_and_clear() {
        let pending = PendingPulls::new();
        assert!(!pending.is_pending("42").await);
        pending.set("42").await;
        assert!(pending.is_pending("42").await);
        assert!(!pending.is_pending("43").await);
        pending.clear("42").await;
        assert!(!pending.is_pending("42").await);
    }
}
