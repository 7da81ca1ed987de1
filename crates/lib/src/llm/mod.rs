//! Ollama HTTP API client.
//!
//! Supports chat completion, model listing, and model pulls against a local Ollama instance.

mod ollama;

pub use ollama::{ChatMessage, ChatResponse, OllamaClient, OllamaError, OllamaModel};
