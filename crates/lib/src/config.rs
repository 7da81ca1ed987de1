//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.ollagram/config.json`) and environment.
//! Environment variables win over file values for secrets and endpoints so the same
//! binary runs inside a compose stack without a mounted config file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Relay HTTP server settings (health endpoint + webhook receiver).
    #[serde(default)]
    pub relay: RelayConfig,

    /// Channel settings (e.g. Telegram).
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Ollama endpoint and model defaults.
    #[serde(default)]
    pub ollama: OllamaConfig,
}

/// Relay HTTP bind and port settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    /// Port for the health endpoint and Telegram webhook receiver (default 8000).
    #[serde(default = "default_relay_port")]
    pub port: u16,

    /// Bind address (default "0.0.0.0" so the container port mapping works).
    #[serde(default = "default_relay_bind")]
    pub bind: String,
}

fn default_relay_port() -> u16 {
    8000
}

fn default_relay_bind() -> String {
    "0.0.0.0".to_string()
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: default_relay_port(),
            bind: default_relay_bind(),
        }
    }
}

/// Per-channel config (e.g. Telegram bot token).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default)]
    pub telegram: TelegramChannelConfig,
}

/// Telegram channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramChannelConfig {
    /// Bot token from BotFather. Overridden by TELEGRAM_BOT_TOKEN env when set.
    pub bot_token: Option<String>,
    /// When set, use webhook mode: Telegram POSTs updates to this URL. If unset, long-poll getUpdates is used.
    pub webhook_url: Option<String>,
    /// Optional secret for webhook verification (X-Telegram-Bot-Api-Secret-Token). Used only when webhook_url is set.
    pub webhook_secret: Option<String>,
    /// Bot API base URL override (e.g. a local test server). Default https://api.telegram.org.
    pub api_base: Option<String>,
}

/// Ollama endpoint and model defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OllamaConfig {
    /// Ollama base URL. Overridden by OLLAMA_BASE_URL env when set.
    /// Default http://127.0.0.1:11434; the compose stack sets http://ollama-service:11434.
    pub base_url: Option<String>,
    /// Model passed to /api/chat: use the exact name from `ollama list` (e.g. "llama3.2:1b").
    pub default_model: Option<String>,
    /// Upper bound for each chat request, in seconds (default 120).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            default_model: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Resolve the Telegram bot token: env TELEGRAM_BOT_TOKEN overrides config.
pub fn resolve_telegram_token(config: &Config) -> Option<String> {
    std::env::var("TELEGRAM_BOT_TOKEN")
        .ok()
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .or_else(|| {
            config
                .channels
                .telegram
                .bot_token
                .as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// Resolve the Ollama base URL: env OLLAMA_BASE_URL overrides config. None means the client default.
pub fn resolve_ollama_base_url(config: &Config) -> Option<String> {
    std::env::var("OLLAMA_BASE_URL")
        .ok()
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .or_else(|| {
            config
                .ollama
                .base_url
                .as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// Chat request timeout from config.
pub fn resolve_request_timeout(config: &Config) -> Duration {
    Duration::from_secs(config.ollama.request_timeout_secs.max(1))
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("OLLAGRAM_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".ollagram").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the default path (or OLLAGRAM_CONFIG_PATH). Missing file => default config.
pub fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(default_config_path);
    if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        return Ok(Config::default());
    }
    let s = std::fs::read_to_string(&path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    let config = serde_json::from_str(&s)
        .with_context(|| format!("parsing config from {}", path.display()))?;
    Ok(config)
}
