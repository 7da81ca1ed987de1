//! Relay HTTP server: health endpoint, Telegram webhook receiver, and the
//! inbound message processor.
//!
//! One port (default 8000) serves `GET /` (health probe) and
//! `POST /telegram/webhook`. Inbound messages from either the long-poll loop
//! or the webhook land on a single mpsc queue and are handled one at a time;
//! every message is independent, so no further coordination is needed.

use crate::channels::{
    inbound_from_update, send_or_log, ChannelHandle, InboundMessage, TelegramChannel,
    TelegramUpdate, TokenCheck,
};
use crate::commands::{self, Command, PendingPulls};
use crate::config::{self, Config};
use crate::llm::OllamaClient;
use crate::relay;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Shared state for the relay server.
#[derive(Clone)]
pub struct RelayState {
    pub config: Arc<Config>,
    /// Sender for inbound channel messages (long-poll loop and webhook POSTs).
    pub inbound_tx: mpsc::Sender<InboundMessage>,
    /// The Telegram connector; replies go through the ChannelHandle seam.
    pub channel: Arc<TelegramChannel>,
    pub ollama_client: OllamaClient,
    /// Model passed to /api/chat.
    pub model: String,
    /// Chats waiting for a model name after /pullmodel.
    pub pending_pulls: Arc<PendingPulls>,
}

/// Prompt sent when a message carries no usable text.
const EMPTY_INPUT_REPLY: &str = "send me some text and I'll ask the model.";

/// Process one inbound message: command, pending pull answer, or relay turn.
async fn process_inbound_message(state: RelayState, msg: InboundMessage) {
    let channel: &dyn ChannelHandle = state.channel.as_ref();
    let trimmed = msg.text.trim();
    if trimmed.is_empty() {
        send_or_log(channel, &msg.conversation_id, EMPTY_INPUT_REPLY).await;
        return;
    }

    match commands::parse_command(trimmed) {
        Some(Command::PullModel) => {
            commands::handle_pull_model(
                &state.ollama_client,
                &state.pending_pulls,
                channel,
                &msg.conversation_id,
                msg.private,
            )
            .await;
            return;
        }
        Some(Command::Cancel) => {
            commands::handle_cancel(&state.pending_pulls, channel, &msg.conversation_id).await;
            return;
        }
        Some(Command::Other) => {
            log::debug!("ignoring unhandled command from {}", msg.conversation_id);
            return;
        }
        None => {}
    }

    if state.pending_pulls.is_pending(&msg.conversation_id).await {
        commands::handle_pending_pull(
            &state.ollama_client,
            &state.pending_pulls,
            channel,
            &msg.conversation_id,
            trimmed,
        )
        .await;
        return;
    }

    log::info!(
        "relay: message from {}:{} at {} ({} chars)",
        msg.channel_id,
        msg.conversation_id,
        msg.timestamp,
        msg.text.len()
    );
    match relay::run_relay(&state.ollama_client, &state.model, &msg.text).await {
        Ok(reply) if reply.trim().is_empty() => {
            log::debug!("relay: model returned empty content, nothing to send");
        }
        Ok(reply) => {
            send_or_log(channel, &msg.conversation_id, &reply).await;
        }
        Err(e) => {
            log::error!("relay: talking to Ollama failed: {}", e);
            send_or_log(channel, &msg.conversation_id, relay::MODEL_ERROR_REPLY).await;
        }
    }
}

/// Run the relay server; binds to config.relay.bind:config.relay.port.
/// Fails fast when no Telegram bot token is configured.
/// Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_server(config: Config) -> Result<()> {
    let token = config::resolve_telegram_token(&config).context(
        "no Telegram bot token: set TELEGRAM_BOT_TOKEN or channels.telegram.botToken",
    )?;

    let ollama_client = OllamaClient::new(
        config::resolve_ollama_base_url(&config),
        config::resolve_request_timeout(&config),
    );
    let model = relay::resolve_model(config.ollama.default_model.as_deref());
    log::info!("relay: using model {}", model);

    let channel = Arc::new(TelegramChannel::new(
        token,
        config.channels.telegram.api_base.clone(),
    ));

    // A rejected token will never recover on its own; bail before anything
    // starts polling. Network failures are transient and only logged.
    match channel.check_token().await {
        Ok(TokenCheck::Valid(username)) => {
            log::info!(
                "telegram token accepted{}",
                username.map(|u| format!(" (bot @{})", u)).unwrap_or_default()
            );
        }
        Ok(TokenCheck::Rejected(reason)) => {
            anyhow::bail!("telegram rejected the bot token: {}", reason);
        }
        Err(e) => {
            log::warn!("could not verify telegram token ({}), continuing", e);
        }
    }

    let (inbound_tx, mut inbound_rx) = mpsc::channel::<InboundMessage>(64);

    let webhook_url = config.channels.telegram.webhook_url.clone();
    let mut channel_tasks: Vec<JoinHandle<()>> = Vec::new();
    if let Some(ref url) = webhook_url {
        let secret = config.channels.telegram.webhook_secret.as_deref();
        if let Err(e) = channel.set_webhook(url, secret).await {
            log::warn!("telegram set_webhook failed: {}", e);
        } else {
            log::info!("channel {} registered (webhook mode): {}", channel.id(), url);
        }
    } else {
        // A leftover webhook from an earlier run makes getUpdates return 409.
        if let Err(e) = channel.delete_webhook().await {
            log::debug!("telegram delete_webhook before long poll: {}", e);
        }
        let handle = channel.clone().start_inbound(inbound_tx.clone());
        channel_tasks.push(handle);
        log::info!("channel {} registered, getUpdates loop started", channel.id());
    }

    let state = RelayState {
        config: Arc::new(config.clone()),
        inbound_tx,
        channel: channel.clone(),
        ollama_client,
        model,
        pending_pulls: Arc::new(PendingPulls::new()),
    };

    {
        let state_inbound = state.clone();
        tokio::spawn(async move {
            while let Some(msg) = inbound_rx.recv().await {
                process_inbound_message(state_inbound.clone(), msg).await;
            }
        });
    }

    let app = Router::new()
        .route("/", get(health_http))
        .route("/telegram/webhook", post(telegram_webhook))
        .with_state(state);

    let bind_addr = format!("{}:{}", config.relay.bind.trim(), config.relay.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("relay listening on {}", bind_addr);

    let delete_webhook_on_shutdown = webhook_url.is_some();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(
            channel,
            channel_tasks,
            delete_webhook_on_shutdown,
        ))
        .await
        .context("relay server exited")?;
    log::info!("relay stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
/// Stops the channel connector, removes the Telegram webhook if one was set,
/// then awaits the long-poll task.
async fn shutdown_signal(
    channel: Arc<TelegramChannel>,
    channel_tasks: Vec<JoinHandle<()>>,
    delete_webhook: bool,
) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, stopping channel connectors");

    channel.stop();

    if delete_webhook {
        if let Err(e) = channel.delete_webhook().await {
            log::debug!("telegram delete_webhook on shutdown: {}", e);
        }
    }

    for h in channel_tasks {
        let _ = h.await;
    }
    log::info!("channel tasks finished");
}

/// POST /telegram/webhook — receives Telegram update JSON; verifies optional secret, pushes InboundMessage.
async fn telegram_webhook(
    State(state): State<RelayState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(ref expected) = state.config.channels.telegram.webhook_secret {
        let provided = headers
            .get("X-Telegram-Bot-Api-Secret-Token")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if provided != expected.as_str() {
            return StatusCode::FORBIDDEN;
        }
    }
    let update: TelegramUpdate = match serde_json::from_slice(&body) {
        Ok(u) => u,
        Err(_) => return StatusCode::BAD_REQUEST,
    };
    let Some(inbound) = inbound_from_update(&update) else {
        return StatusCode::OK;
    };
    if state.inbound_tx.send(inbound).await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::OK
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<RelayState>) -> Json<serde_json::Value> {
    let mode = if state.config.channels.telegram.webhook_url.is_some() {
        "webhook"
    } else {
        "longpoll"
    };
    Json(json!({
        "runtime": "running",
        "port": state.config.relay.port,
        "mode": mode,
        "model": state.model,
    }))
}
