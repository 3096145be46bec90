//! Integration test: start the gateway on a free port, hit the peer HTTP
//! endpoints. Does not require Ollama (exercises symbolic routes only). The
//! server task is left running when the test ends.

use lib::config::Config;
use lib::gateway;
use lib::message::{Message, MessageKind};
use std::time::Duration;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.gateway.port = free_port();
    config.gateway.bind = "127.0.0.1".to_string();
    config.socket.enabled = false;
    config
}

async fn wait_for_health(client: &reqwest::Client, port: u16) -> serde_json::Value {
    let url = format!("http://127.0.0.1:{}/health", port);
    let mut last_err = None;
    for _ in 0..100 {
        match client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                return resp.json().await.expect("parse health JSON");
            }
            Ok(_) => {}
            Err(e) => last_err = Some(e),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("gateway never became healthy: {:?}", last_err);
}

#[tokio::test]
async fn health_reports_running_agent() {
    let config = test_config();
    let port = config.gateway.port;
    tokio::spawn(async move {
        let _ = gateway::run_gateway(config).await;
    });

    let client = reqwest::Client::new();
    let health = wait_for_health(&client, port).await;
    assert_eq!(health.get("status").and_then(|v| v.as_str()), Some("running"));
    assert_eq!(health.get("agent").and_then(|v| v.as_str()), Some("ponte"));
    assert_eq!(health.get("protocol").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(health.get("port").and_then(|v| v.as_u64()), Some(port as u64));
}

#[tokio::test]
async fn manifest_lists_endpoints_and_address() {
    let config = test_config();
    let port = config.gateway.port;
    tokio::spawn(async move {
        let _ = gateway::run_gateway(config).await;
    });

    let client = reqwest::Client::new();
    wait_for_health(&client, port).await;

    let manifest: serde_json::Value = client
        .get(format!("http://127.0.0.1:{}/manifest", port))
        .send()
        .await
        .expect("GET /manifest")
        .json()
        .await
        .expect("parse manifest");
    assert_eq!(manifest.get("agent").and_then(|v| v.as_str()), Some("ponte"));
    assert_eq!(
        manifest.get("address").and_then(|v| v.as_str()),
        Some("aip://ponte")
    );
    let endpoints = manifest
        .get("endpoints")
        .and_then(|v| v.as_array())
        .expect("endpoints array");
    assert!(endpoints.iter().any(|e| e == "/messages"));
    assert!(endpoints.iter().any(|e| e == "/ws"));
}

#[tokio::test]
async fn messages_roundtrips_a_version_request() {
    let config = test_config();
    let port = config.gateway.port;
    tokio::spawn(async move {
        let _ = gateway::run_gateway(config).await;
    });

    let client = reqwest::Client::new();
    wait_for_health(&client, port).await;

    let request = Message::text("/version");
    let request_id = request.id.clone();
    let resp = client
        .post(format!("http://127.0.0.1:{}/messages", port))
        .body(request.to_wire().expect("encode request"))
        .send()
        .await
        .expect("POST /messages");
    assert!(resp.status().is_success());

    let body = resp.text().await.expect("response body");
    let response = Message::from_wire(&body).expect("decode response envelope");
    assert_eq!(response.kind, MessageKind::Response);
    assert_eq!(response.reply_to.as_deref(), Some(request_id.as_str()));
    let text = response.extract_text();
    assert!(
        text.starts_with("ponte "),
        "version reply should name the agent, got {:?}",
        text
    );
}

#[tokio::test]
async fn messages_rejects_garbage_with_400() {
    let config = test_config();
    let port = config.gateway.port;
    tokio::spawn(async move {
        let _ = gateway::run_gateway(config).await;
    });

    let client = reqwest::Client::new();
    wait_for_health(&client, port).await;

    let resp = client
        .post(format!("http://127.0.0.1:{}/messages", port))
        .body("not an envelope")
        .send()
        .await
        .expect("POST /messages");
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
}
