//! Relay turn: forward one chat message to Ollama, return the completion.
//!
//! Each inbound message is independent: one /api/chat request per call, no
//! history, nothing persisted.

use crate::llm::{ChatMessage, OllamaClient, OllamaError};

/// Friendly reply sent to the chat whenever the model call fails.
pub const MODEL_ERROR_REPLY: &str = "sorry, I couldn't get a response from the model.";

/// Fallback model when none is configured (the smallest llama3.2 tag).
pub const DEFAULT_MODEL_FALLBACK: &str = "llama3.2:1b";

/// Resolve the model name from config. Empty or missing falls back to the default.
pub fn resolve_model(config_model: Option<&str>) -> String {
    match config_model.map(str::trim).filter(|s| !s.is_empty()) {
        Some(name) => name.to_string(),
        None => DEFAULT_MODEL_FALLBACK.to_string(),
    }
}

/// Forward `text` as a single user message and return the assistant content.
/// Issues exactly one /api/chat request.
pub async fn run_relay(
    client: &OllamaClient,
    model: &str,
    text: &str,
) -> Result<String, OllamaError> {
    let messages = vec![ChatMessage::user(text)];
    let res = client.chat(model, messages).await?;
    Ok(res.content().to_string())
}
