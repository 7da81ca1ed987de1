//! Ollagram core library — config, Ollama client, Telegram channel, relay,
//! and the HTTP server used by the CLI.

pub mod channels;
pub mod commands;
pub mod config;
pub mod llm;
pub mod relay;
pub mod server;
