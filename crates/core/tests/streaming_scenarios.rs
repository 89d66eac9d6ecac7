//! End-to-end scenarios driven against a stub `EchoBackend`.

use osaurus_core::backend::EchoBackend;
use osaurus_core::config::GenerationConfig;
use osaurus_core::control::ActivityCounter;
use osaurus_core::gateway::{build_router, GatewayState};
use osaurus_core::lifecycle::Server;
use osaurus_core::router::CorsConfig;
use serde_json::json;
use std::sync::Arc;

fn state_with(backend: EchoBackend) -> GatewayState {
    GatewayState {
        backend: Arc::new(backend),
        installed_models: vec!["m".to_string()],
        system_default_available: false,
        activity: Arc::new(ActivityCounter::new()),
        generation: GenerationConfig::default(),
    }
}

async fn start(state: GatewayState) -> (Server, u16) {
    let server = Server::new();
    let router = build_router(state, CorsConfig::default());
    let port = server.start("127.0.0.1", 0, router).await.expect("start");
    (server, port)
}

#[tokio::test]
async fn non_streaming_echo_returns_openai_envelope() {
    let (server, port) = start(state_with(EchoBackend::new(vec!["hi".to_string()]))).await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://127.0.0.1:{port}/chat/completions"))
        .json(&json!({"model":"m","messages":[{"role":"user","content":"?"}]}))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(
        body["choices"][0]["message"]["content"].as_str(),
        Some("hi")
    );
    assert_eq!(body["choices"][0]["finish_reason"].as_str(), Some("stop"));
    let id = body["id"].as_str().unwrap();
    assert!(id.starts_with("chatcmpl-"));
    assert_eq!(id.len(), "chatcmpl-".len() + 8);
    server.stop().await.unwrap();
}

#[tokio::test]
async fn sse_streaming_stops_before_stop_sequence() {
    let (server, port) = start(state_with(EchoBackend::new(vec![
        "he".to_string(),
        "llo".to_string(),
        "STOP".to_string(),
        "world".to_string(),
    ])))
    .await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://127.0.0.1:{port}/chat/completions"))
        .json(&json!({
            "model":"m",
            "messages":[{"role":"user","content":"?"}],
            "stream": true,
            "stop": ["STOP"],
        }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "text/event-stream; charset=utf-8"
    );
    let body = resp.text().await.unwrap();
    assert!(body.contains("\"role\":\"assistant\""));
    assert!(!body.contains("STOP"));
    assert!(!body.contains("world"));
    assert!(body.trim_end().ends_with("data: [DONE]"));
    server.stop().await.unwrap();
}

#[tokio::test]
async fn sse_tool_call_during_probe_emits_no_content() {
    let (server, port) = start(state_with(EchoBackend::with_tool_call(
        vec!["thin".to_string(), "king".to_string()],
        "lookup",
        "{\"q\":\"x\"}",
    )))
    .await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://127.0.0.1:{port}/chat/completions"))
        .json(&json!({
            "model":"m",
            "messages":[{"role":"user","content":"?"}],
            "stream": true,
            "tools": [{"type":"function","function":{"name":"lookup","parameters":{}}}],
        }))
        .send()
        .await
        .unwrap();
    let body = resp.text().await.unwrap();
    assert!(!body.contains("\"content\""));
    assert!(body.contains("\"lookup\""));
    assert!(body.contains("finish_reason\":\"tool_calls\""));
    assert!(body.trim_end().ends_with("data: [DONE]"));
    server.stop().await.unwrap();
}

#[tokio::test]
async fn ollama_chat_returns_ndjson_lines() {
    let (server, port) = start(state_with(EchoBackend::new(vec![
        "a".to_string(),
        "b".to_string(),
    ])))
    .await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://127.0.0.1:{port}/chat"))
        .json(&json!({"model":"m","messages":[{"role":"user","content":"hi"}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "application/x-ndjson"
    );
    let body = resp.text().await.unwrap();
    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(lines.last(), Some(&"{\"done\":true}"));
    assert!(lines.iter().any(|l| l.contains("\"content\":\"a\"")));
    server.stop().await.unwrap();
}

#[tokio::test]
async fn ollama_generate_returns_response_field_not_message() {
    let (server, port) = start(state_with(EchoBackend::new(vec![
        "a".to_string(),
        "b".to_string(),
    ])))
    .await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://127.0.0.1:{port}/generate"))
        .json(&json!({"model":"m","prompt":"hi"}))
        .send()
        .await
        .unwrap();
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "application/x-ndjson"
    );
    let body = resp.text().await.unwrap();
    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(lines.last(), Some(&"{\"done\":true}"));
    assert!(lines.iter().any(|l| l.contains("\"response\":\"a\"")));
    assert!(!lines.iter().any(|l| l.contains("\"message\"")));
    server.stop().await.unwrap();
}

#[tokio::test]
async fn path_prefix_normalization_reaches_same_route() {
    let (server, port) = start(state_with(EchoBackend::new(vec!["hi".to_string()]))).await;
    let client = reqwest::Client::new();
    let direct = client
        .post(format!("http://127.0.0.1:{port}/chat/completions"))
        .json(&json!({"model":"m","messages":[{"role":"user","content":"?"}]}))
        .send()
        .await
        .unwrap();
    let prefixed = client
        .post(format!("http://127.0.0.1:{port}/v1/api/chat/completions"))
        .json(&json!({"model":"m","messages":[{"role":"user","content":"?"}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(direct.status(), prefixed.status());
    let a: serde_json::Value = direct.json().await.unwrap();
    let b: serde_json::Value = prefixed.json().await.unwrap();
    assert_eq!(a["choices"][0]["message"]["content"], b["choices"][0]["message"]["content"]);
    server.stop().await.unwrap();
}

#[tokio::test]
async fn empty_messages_is_rejected_with_400() {
    let (server, port) = start(state_with(EchoBackend::new(vec!["hi".to_string()]))).await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://127.0.0.1:{port}/chat/completions"))
        .json(&json!({"model":"m","messages":[]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(
        body["error"]["type"].as_str(),
        Some("invalid_request_error")
    );
    server.stop().await.unwrap();
}

#[tokio::test]
async fn unknown_model_is_rejected_with_404() {
    let (server, port) = start(state_with(EchoBackend::new(vec!["hi".to_string()]))).await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://127.0.0.1:{port}/chat/completions"))
        .json(&json!({"model":"does-not-exist","messages":[{"role":"user","content":"?"}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    server.stop().await.unwrap();
}

#[tokio::test]
async fn head_request_returns_no_content() {
    let (server, port) = start(state_with(EchoBackend::new(vec!["hi".to_string()]))).await;
    let client = reqwest::Client::new();
    let resp = client
        .head(format!("http://127.0.0.1:{port}/chat/completions"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NO_CONTENT);
    server.stop().await.unwrap();
}
