//! /pullmodel conversation flow tests with a recording fake channel and a
//! mock Ollama serving /api/tags and /api/pull.

use async_trait::async_trait;
use axum::{
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use lib::channels::ChannelHandle;
use lib::commands::{self, PendingPulls};
use lib::llm::OllamaClient;
use serde_json::{json, Value};
use std::sync::Mutex;
use std::time::Duration;

/// Records every message the flow sends instead of talking to Telegram.
#[derive(Default)]
struct FakeChannel {
    sent: Mutex<Vec<(String, String)>>,
}

impl FakeChannel {
    fn texts_for(&self, conversation_id: &str) -> Vec<String> {
        self.sent
            .lock()
            .expect("lock sent")
            .iter()
            .filter(|(conv, _)| conv == conversation_id)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl ChannelHandle for FakeChannel {
    fn id(&self) -> &str {
        "fake"
    }

    fn stop(&self) {}

    async fn send_message(&self, conversation_id: &str, text: &str) -> Result<(), String> {
        self.sent
            .lock()
            .expect("lock sent")
            .push((conversation_id.to_string(), text.to_string()));
        Ok(())
    }
}

/// Mock Ollama: /api/tags lists one model; /api/pull succeeds only for "llama3.2:1b".
async fn start_ollama_mock() -> OllamaClient {
    let router = Router::new()
        .route(
            "/api/tags",
            get(|| async { Json(json!({ "models": [ { "name": "llama3.2:1b" } ] })) }),
        )
        .route(
            "/api/pull",
            post(|Json(body): Json<Value>| async move {
                if body.get("model").and_then(|v| v.as_str()) == Some("llama3.2:1b") {
                    (StatusCode::OK, Json(json!({ "status": "success" })))
                } else {
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({ "error": "pull model manifest: file does not exist" })),
                    )
                }
            }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server");
    let port = listener.local_addr().expect("local_addr").port();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    OllamaClient::new(
        Some(format!("http://127.0.0.1:{}", port)),
        Duration::from_secs(5),
    )
}

#[tokio::test]
async fn pull_model_is_private_chat_only() {
    let client = start_ollama_mock().await;
    let pending = PendingPulls::new();
    let channel = FakeChannel::default();

    commands::handle_pull_model(&client, &pending, &channel, "-100", false).await;

    let texts = channel.texts_for("-100");
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("private chats"));
    assert!(!pending.is_pending("-100").await);
}

#[tokio::test]
async fn pull_model_lists_models_and_waits_for_a_name() {
    let client = start_ollama_mock().await;
    let pending = PendingPulls::new();
    let channel = FakeChannel::default();

    commands::handle_pull_model(&client, &pending, &channel, "42", true).await;

    let texts = channel.texts_for("42");
    assert_eq!(texts.len(), 2);
    assert!(texts[0].contains("llama3.2:1b"));
    assert!(texts[1].contains("/cancel"));
    assert!(pending.is_pending("42").await);
}

#[tokio::test]
async fn successful_pull_clears_the_pending_state() {
    let client = start_ollama_mock().await;
    let pending = PendingPulls::new();
    let channel = FakeChannel::default();
    pending.set("42").await;

    commands::handle_pending_pull(&client, &pending, &channel, "42", "llama3.2:1b").await;

    let texts = channel.texts_for("42");
    assert_eq!(texts.len(), 2);
    assert!(texts[0].contains("downloaded"));
    assert!(texts[1].contains("✅"));
    assert!(!pending.is_pending("42").await);
}

#[tokio::test]
async fn failed_pull_keeps_the_conversation_pending() {
    let client = start_ollama_mock().await;
    let pending = PendingPulls::new();
    let channel = FakeChannel::default();
    pending.set("42").await;

    commands::handle_pending_pull(&client, &pending, &channel, "42", "no-such-model").await;

    let texts = channel.texts_for("42");
    assert_eq!(texts.len(), 2);
    assert!(texts[1].contains("❌"));
    assert!(texts[1].contains("no-such-model"));
    assert!(pending.is_pending("42").await);
}

/// Channel whose every send fails, as when Telegram is unreachable.
struct FailingChannel;

#[async_trait]
impl ChannelHandle for FailingChannel {
    fn id(&self) -> &str {
        "failing"
    }

    fn stop(&self) {}

    async fn send_message(&self, _conversation_id: &str, _text: &str) -> Result<(), String> {
        Err("connection reset by peer".to_string())
    }
}

#[tokio::test]
async fn send_failures_do_not_break_the_flow() {
    let client = start_ollama_mock().await;
    let pending = PendingPulls::new();
    let channel = FailingChannel;

    // The listing messages are lost but the chat still ends up pending.
    commands::handle_pull_model(&client, &pending, &channel, "42", true).await;
    assert!(pending.is_pending("42").await);

    // The pull itself still runs and clears the pending state.
    commands::handle_pending_pull(&client, &pending, &channel, "42", "llama3.2:1b").await;
    assert!(!pending.is_pending("42").await);
}

#[tokio::test]
async fn cancel_clears_the_pending_state() {
    let pending = PendingPulls::new();
    let channel = FakeChannel::default();
    pending.set("42").await;

    commands::handle_cancel(&pending, &channel, "42").await;

    let texts = channel.texts_for("42");
    assert_eq!(texts, vec!["action canceled.".to_string()]);
    assert!(!pending.is_pending("42").await);
}
