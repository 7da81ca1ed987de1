//! Integration test: start the relay on a free port, GET /, assert health JSON.
//! Does not require Ollama or Telegram. The server task is left running when the test ends.

use axum::{http::StatusCode, Json, Router};
use lib::config::Config;
use lib::server;
use serde_json::json;
use std::time::Duration;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

/// Config that starts without real services: webhook mode (no long-poll loop)
/// with the Bot API base pointed at a closed local port.
fn offline_config(port: u16) -> Config {
    let mut config = Config::default();
    config.relay.port = port;
    config.relay.bind = "127.0.0.1".to_string();
    config.channels.telegram.bot_token = Some("test-token".to_string());
    config.channels.telegram.webhook_url = Some("https://example.invalid/telegram/webhook".to_string());
    config.channels.telegram.api_base = Some(format!("http://127.0.0.1:{}", free_port()));
    config
}

#[tokio::test]
async fn relay_health_http_responds_with_running() {
    let port = free_port();
    let config = offline_config(port);

    let server_handle = tokio::spawn(async move {
        let _ = server::run_server(config).await;
    });

    let url = format!("http://127.0.0.1:{}/", port);
    let client = reqwest::Client::new();
    let mut last_err = None;
    for _ in 0..100 {
        match client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                let json: serde_json::Value = resp.json().await.expect("parse JSON");
                assert_eq!(json.get("runtime").and_then(|v| v.as_str()), Some("running"));
                assert_eq!(json.get("port").and_then(|v| v.as_u64()), Some(port as u64));
                assert_eq!(json.get("mode").and_then(|v| v.as_str()), Some("webhook"));
                assert_eq!(json.get("model").and_then(|v| v.as_str()), Some("llama3.2:1b"));
                return;
            }
            Ok(_) => {}
            Err(e) => last_err = Some(e),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let _ = server_handle.abort();
    panic!(
        "GET {} did not return 200 with health JSON within 5s; last error: {:?}",
        url, last_err
    );
}

#[tokio::test]
async fn missing_bot_token_fails_startup() {
    // The token must come from config or TELEGRAM_BOT_TOKEN; make sure neither is present.
    std::env::remove_var("TELEGRAM_BOT_TOKEN");
    let mut config = Config::default();
    config.relay.port = free_port();
    config.relay.bind = "127.0.0.1".to_string();

    let err = server::run_server(config)
        .await
        .expect_err("startup must fail without a bot token");
    assert!(err.to_string().contains("TELEGRAM_BOT_TOKEN"));
}

#[tokio::test]
async fn rejected_bot_token_fails_startup() {
    // Bot API stand-in that answers 401 to everything, like Telegram does
    // for a token it does not recognize.
    let router = Router::new().fallback(|| async {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "ok": false, "error_code": 401, "description": "Unauthorized" })),
        )
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server");
    let api_port = listener.local_addr().expect("local_addr").port();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    let mut config = Config::default();
    config.relay.port = free_port();
    config.relay.bind = "127.0.0.1".to_string();
    config.channels.telegram.bot_token = Some("bad-token".to_string());
    config.channels.telegram.api_base = Some(format!("http://127.0.0.1:{}", api_port));

    let err = server::run_server(config)
        .await
        .expect_err("startup must fail when Telegram rejects the token");
    assert!(err.to_string().contains("rejected the bot token"));
}
