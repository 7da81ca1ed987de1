//! Telegram channel: long-poll getUpdates and sendMessage via Bot API.

use crate::channels::inbound::InboundMessage;
use crate::channels::ChannelHandle;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const LONG_POLL_TIMEOUT: u64 = 30;

#[derive(Debug, Deserialize)]
struct GetUpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<TelegramUpdate>,
}

/// Telegram update payload (getUpdates result item or webhook POST body).
#[derive(Debug, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramMessage {
    pub chat: TelegramChat,
    /// Unix timestamp when the message was sent.
    #[serde(default)]
    pub date: i64,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    /// "private", "group", "supergroup", or "channel".
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Build an InboundMessage from an update. None when the update carries no
/// text message (edits, stickers, joins, ...), which the relay ignores.
pub fn inbound_from_update(update: &TelegramUpdate) -> Option<InboundMessage> {
    let msg = update.message.as_ref()?;
    let text = msg.text.as_ref()?;
    let timestamp = DateTime::<Utc>::from_timestamp(msg.date, 0).unwrap_or_else(Utc::now);
    Some(InboundMessage {
        channel_id: "telegram".to_string(),
        conversation_id: msg.chat.id.to_string(),
        text: text.clone(),
        timestamp,
        private: msg.chat.kind == "private",
    })
}

/// Offset for the next getUpdates call: one past the highest update_id seen.
fn next_offset(updates: &[TelegramUpdate]) -> Option<i64> {
    updates.iter().map(|u| u.update_id).max().map(|id| id + 1)
}

/// Result of validating the bot token against getMe.
#[derive(Debug)]
pub enum TokenCheck {
    /// Token accepted; bot username when Telegram returned one.
    Valid(Option<String>),
    /// The Bot API rejected the token; fatal at startup.
    Rejected(String),
}

#[derive(Debug, Deserialize)]
struct GetMeResponse {
    ok: bool,
    #[serde(default)]
    result: Option<BotUser>,
}

#[derive(Debug, Deserialize)]
struct BotUser {
    #[serde(default)]
    username: Option<String>,
}

/// Telegram channel connector: long-polls for updates and sends replies via sendMessage.
pub struct TelegramChannel {
    id: String,
    token: String,
    api_base: String,
    running: AtomicBool,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(token: String, api_base: Option<String>) -> Self {
        let api_base = api_base
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| TELEGRAM_API_BASE.to_string());
        Self {
            id: "telegram".to_string(),
            token,
            api_base,
            running: AtomicBool::new(false),
            client: reqwest::Client::new(),
        }
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the getUpdates long-poll loop and forward messages to the relay. Returns a handle to await on shutdown.
    pub fn start_inbound(
        self: Arc<Self>,
        inbound_tx: mpsc::Sender<InboundMessage>,
    ) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        log::info!("telegram channel: starting getUpdates long-poll loop");
        tokio::spawn(async move {
            run_get_updates_loop(self, inbound_tx).await;
        })
    }

    /// Call Telegram getUpdates (long poll). Returns (updates, next_offset).
    async fn get_updates(
        &self,
        offset: Option<i64>,
    ) -> Result<(Vec<TelegramUpdate>, Option<i64>), String> {
        let url = format!(
            "{}/bot{}/getUpdates?timeout={}",
            self.api_base, self.token, LONG_POLL_TIMEOUT
        );
        let url = if let Some(off) = offset {
            format!("{}&offset={}", url, off)
        } else {
            url
        };
        let res = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("getUpdates failed: {} {}", status, body));
        }
        let data: GetUpdatesResponse = res.json().await.map_err(|e| e.to_string())?;
        if !data.ok {
            return Err("getUpdates returned ok: false".to_string());
        }
        let offset = next_offset(&data.result);
        Ok((data.result, offset))
    }

    /// GET getMe — verify the token authenticates. Rejections (401/403/404 or
    /// ok: false) are distinguished from network failures so the caller can
    /// treat the former as fatal and merely retry the latter.
    pub async fn check_token(&self) -> Result<TokenCheck, String> {
        let url = format!("{}/bot{}/getMe", self.api_base, self.token);
        let res = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = res.status();
        if matches!(status.as_u16(), 401 | 403 | 404) {
            let body = res.text().await.unwrap_or_default();
            return Ok(TokenCheck::Rejected(format!("{} {}", status, body)));
        }
        if !status.is_success() {
            return Err(format!("getMe failed: {}", status));
        }
        let data: GetMeResponse = res.json().await.map_err(|e| e.to_string())?;
        if !data.ok {
            return Ok(TokenCheck::Rejected("getMe returned ok: false".to_string()));
        }
        Ok(TokenCheck::Valid(data.result.and_then(|u| u.username)))
    }

    /// Set webhook URL (and optional secret). When set, Telegram POSTs updates to the URL instead of getUpdates.
    pub async fn set_webhook(&self, url: &str, secret: Option<&str>) -> Result<(), String> {
        let api_url = format!("{}/bot{}/setWebhook", self.api_base, self.token);
        let mut body = serde_json::json!({ "url": url });
        if let Some(s) = secret {
            body["secret_token"] = serde_json::Value::String(s.to_string());
        }
        let res = self
            .client
            .post(&api_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("setWebhook failed: {} {}", status, body));
        }
        Ok(())
    }

    /// Remove webhook so the bot can use getUpdates again.
    pub async fn delete_webhook(&self) -> Result<(), String> {
        let url = format!("{}/bot{}/deleteWebhook", self.api_base, self.token);
        let res = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("deleteWebhook failed: {} {}", status, body));
        }
        Ok(())
    }

    /// Send a text message to a chat via sendMessage API.
    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), String> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.token);
        let body = serde_json::json!({ "chat_id": chat_id, "text": text });
        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("sendMessage failed: {} {}", status, body));
        }
        Ok(())
    }
}

async fn run_get_updates_loop(
    channel: Arc<TelegramChannel>,
    inbound_tx: mpsc::Sender<InboundMessage>,
) {
    let mut offset: Option<i64> = None;
    while channel.running() {
        match channel.get_updates(offset).await {
            Ok((updates, next)) => {
                offset = next;
                for u in updates {
                    if let Some(inbound) = inbound_from_update(&u) {
                        if inbound_tx.send(inbound).await.is_err() {
                            log::debug!("telegram: inbound channel closed, stopping loop");
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                log::debug!("telegram getUpdates error: {}", e);
                tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;
            }
        }
    }
    log::info!("telegram channel: getUpdates loop stopped");
}

#[async_trait]
impl ChannelHandle for TelegramChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    async fn send_message(&self, conversation_id: &str, text: &str) -> Result<(), String> {
        TelegramChannel::send_message(self, conversation_id, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_private_text_update() {
        let json = r#"{
            "update_id": 10,
            "message": {
                "message_id": 1,
                "date": 1700000000,
                "chat": { "id": 42, "type": "private" },
                "text": "hello"
            }
        }"#;
        let update: TelegramUpdate = serde_json::from_str(json).expect("parse update");
        let inbound = inbound_from_update(&update).expect("text message");
        assert_eq!(inbound.channel_id, "telegram");
        assert_eq!(inbound.conversation_id, "42");
        assert_eq!(inbound.text, "hello");
        assert_eq!(inbound.timestamp.timestamp(), 1_700_000_000);
        assert!(inbound.private);
    }

    #[test]
    fn group_chat_is_not_private() {
        let json = r#"{
            "update_id": 11,
            "message": {
                "date": 1700000000,
                "chat": { "id": -100, "type": "supergroup" },
                "text": "hi all"
            }
        }"#;
        let update: TelegramUpdate = serde_json::from_str(json).expect("parse update");
        let inbound = inbound_from_update(&update).expect("text message");
        assert!(!inbound.private);
        assert_eq!(inbound.conversation_id, "-100");
    }

    #[test]
    fn non_text_update_is_dropped() {
        let json = r#"{
            "update_id": 12,
            "message": {
                "date": 1700000000,
                "chat": { "id": 7, "type": "private" }
            }
        }"#;
        let update: TelegramUpdate = serde_json::from_str(json).expect("parse update");
        assert!(inbound_from_update(&update).is_none());

        let no_message = r#"{ "update_id": 13 }"#;
        let update: TelegramUpdate = serde_json::from_str(no_message).expect("parse update");
        assert!(inbound_from_update(&update).is_none());
    }

    #[test]
    fn next_offset_is_one_past_highest_id() {
        assert_eq!(next_offset(&[]), None);
        let updates: Vec<TelegramUpdate> =
            serde_json::from_str(r#"[{"update_id":5},{"update_id":9},{"update_id":7}]"#)
                .expect("parse updates");
        assert_eq!(next_offset(&updates), Some(10));
    }
}
