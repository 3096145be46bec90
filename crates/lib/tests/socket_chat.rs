//! Integration test: start the gateway with the local socket listener enabled
//! and speak the length-prefixed framing end to end. Routes only symbolic
//! commands so no Ollama is needed. The server task is left running when the
//! test ends.

use lib::channels::{read_frame, write_frame};
use lib::config::Config;
use lib::gateway;
use serde_json::json;
use std::time::Duration;
use tokio::net::TcpStream;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

async fn connect_with_retry(port: u16) -> TcpStream {
    for _ in 0..100 {
        if let Ok(stream) = TcpStream::connect(("127.0.0.1", port)).await {
            return stream;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("socket listener never came up on port {}", port);
}

async fn read_json(stream: &mut TcpStream) -> serde_json::Value {
    let payload = read_frame(stream)
        .await
        .expect("read frame")
        .expect("connection stayed open");
    serde_json::from_slice(&payload).expect("frame is JSON")
}

#[tokio::test]
async fn socket_welcome_then_version_roundtrip() {
    let mut config = Config::default();
    config.gateway.port = free_port();
    config.socket.port = free_port();
    let socket_port = config.socket.port;
    tokio::spawn(async move {
        let _ = gateway::run_gateway(config).await;
    });

    let mut stream = connect_with_retry(socket_port).await;

    let welcome = read_json(&mut stream).await;
    assert_eq!(welcome.get("type").and_then(|v| v.as_str()), Some("welcome"));
    let session_id = welcome
        .get("session_id")
        .and_then(|v| v.as_str())
        .expect("welcome carries session_id")
        .to_string();
    assert!(session_id.starts_with("sess-"));

    let frame = json!({ "text": "/version" });
    write_frame(&mut stream, frame.to_string().as_bytes())
        .await
        .expect("write request frame");

    let reply = read_json(&mut stream).await;
    assert_eq!(reply.get("type").and_then(|v| v.as_str()), Some("response"));
    assert_eq!(
        reply.get("session_id").and_then(|v| v.as_str()),
        Some(session_id.as_str())
    );
    let text = reply.get("text").and_then(|v| v.as_str()).unwrap_or("");
    assert!(
        text.starts_with("ponte "),
        "version reply should name the agent, got {:?}",
        text
    );
}

#[tokio::test]
async fn socket_unknown_command_yields_error_frame() {
    let mut config = Config::default();
    config.gateway.port = free_port();
    config.socket.port = free_port();
    let socket_port = config.socket.port;
    tokio::spawn(async move {
        let _ = gateway::run_gateway(config).await;
    });

    let mut stream = connect_with_retry(socket_port).await;
    let _welcome = read_json(&mut stream).await;

    let frame = json!({ "text": "/no-such-command" });
    write_frame(&mut stream, frame.to_string().as_bytes())
        .await
        .expect("write request frame");

    let reply = read_json(&mut stream).await;
    assert_eq!(reply.get("type").and_then(|v| v.as_str()), Some("error"));
    let text = reply.get("text").and_then(|v| v.as_str()).unwrap_or("");
    assert!(text.contains("no-such-command"), "got {:?}", text);
}
