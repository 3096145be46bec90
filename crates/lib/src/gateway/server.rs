//! Peer HTTP + WebSocket server (single port).

use crate::address::Address;
use crate::channels::{
    adapt_for_channel, BridgeAdapter, ChannelAdapter, ChannelCapabilities, LocalSocketChannel,
};
use crate::config::{self, Config};
use crate::gateway::protocol::{
    ChannelSummary, IdentifiedFrame, IdentifyFrame, Manifest, WsErrorFrame, PROTOCOL_VERSION,
};
use crate::gateway::router::Gateway;
use crate::llm::OllamaClient;
use crate::message::Message;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

const SHUTDOWN_EVENT_JSON: &str = r#"{"action":"shutdown"}"#;

/// Shared state for the peer endpoint.
#[derive(Clone)]
pub struct ServerState {
    pub gateway: Arc<Gateway>,
    pub config: Arc<Config>,
    /// When Some, peer requests must carry this bearer token.
    pub required_token: Option<String>,
    /// Broadcasts events to connected WS peers (e.g. shutdown).
    pub event_tx: broadcast::Sender<String>,
}

/// True when the request either needs no token or carries the right one.
fn authorized(state: &ServerState, headers: &HeaderMap) -> bool {
    let Some(ref required) = state.required_token else {
        return true;
    };
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map_or(false, |t| t.trim() == required)
}

/// Run the gateway: peer HTTP/WS server plus the local socket listener.
/// When bind is not loopback, a gateway token must be configured or startup
/// fails. Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config) -> Result<()> {
    let bind = config.gateway.bind.trim().to_string();
    let required_token = match config.gateway.auth.mode {
        config::GatewayAuthMode::Token => config::resolve_gateway_token(&config),
        config::GatewayAuthMode::None => None,
    };
    if !config::is_loopback_bind(&bind) && required_token.is_none() {
        anyhow::bail!(
            "refusing to bind gateway to {} without auth (set gateway.auth.mode to \"token\" and gateway.auth.token or PONTE_GATEWAY_TOKEN)",
            bind
        );
    }

    let llm = OllamaClient::new(config.llm.base_url.clone(), config.llm.model.clone());
    let gateway = Gateway::new(
        config.agent.name.clone(),
        config::resolve_agent_version(&config),
        Arc::new(llm),
        Duration::from_secs(config.llm.request_timeout_secs),
    );
    gateway
        .register_builtin_commands()
        .await
        .map_err(|e| anyhow::anyhow!("registering builtin commands: {}", e))?;

    let (event_tx, _) = broadcast::channel(64);
    let mut channel_tasks: Vec<JoinHandle<()>> = Vec::new();

    if config.socket.enabled {
        let socket = Arc::new(LocalSocketChannel::new(
            config.socket.bind.clone(),
            config.socket.port,
        ));
        gateway.channels().register(socket.clone()).await;
        channel_tasks.push(socket.start(gateway.clone()));
        log::info!(
            "socket channel registered on {}:{}",
            config.socket.bind,
            config.socket.port
        );
    }

    if let Some(ref bridge_url) = config.channels.bridge.base_url {
        let bridge = Arc::new(BridgeAdapter::new("bridge", bridge_url.clone()));
        gateway.channels().register(bridge.clone()).await;
        channel_tasks.push(bridge.start(gateway.clone()));
        log::info!("bridge channel registered: {}", bridge_url);
    }

    let state = ServerState {
        gateway: gateway.clone(),
        config: Arc::new(config.clone()),
        required_token,
        event_tx: event_tx.clone(),
    };

    let app = Router::new()
        .route("/manifest", get(manifest_http))
        .route("/channels", get(channels_http))
        .route("/messages", post(messages_http))
        .route("/health", get(health_http))
        .route("/ws", get(ws_handler))
        .with_state(state);

    let bind_addr = format!("{}:{}", bind, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(event_tx, gateway, channel_tasks))
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Completes when the process should shut down (SIGINT or SIGTERM), then
/// broadcasts shutdown to WS peers, stops channels, and awaits their tasks.
async fn shutdown_signal(
    event_tx: broadcast::Sender<String>,
    gateway: Arc<Gateway>,
    channel_tasks: Vec<JoinHandle<()>>,
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
    log::info!("shutdown signal received, draining connections");

    let _ = event_tx.send(SHUTDOWN_EVENT_JSON.to_string());

    for id in gateway.channels().ids().await {
        if let Some(adapter) = gateway.channels().get(&id).await {
            adapter.stop();
        }
    }
    for handle in channel_tasks {
        let _ = handle.await;
    }
    log::info!("channel tasks finished");
}

async fn channel_summaries(gateway: &Gateway) -> Vec<ChannelSummary> {
    let mut out = Vec::new();
    for id in gateway.channels().ids().await {
        if let Some(adapter) = gateway.channels().get(&id).await {
            out.push(ChannelSummary {
                id,
                channel_type: adapter.channel_type().to_string(),
                capabilities: adapter.capabilities().clone(),
            });
        }
    }
    out.sort_by(|a, b| a.id.cmp(&b.id));
    out
}

/// GET /manifest: identity + capability + endpoint discovery document.
async fn manifest_http(State(state): State<ServerState>) -> Json<Manifest> {
    let gateway = &state.gateway;
    Json(Manifest {
        agent: gateway.agent_name().to_string(),
        version: gateway.agent_version().to_string(),
        protocol: PROTOCOL_VERSION,
        address: Address::new(gateway.agent_name()).to_string(),
        channels: channel_summaries(gateway).await,
        endpoints: vec![
            "/manifest".to_string(),
            "/channels".to_string(),
            "/messages".to_string(),
            "/health".to_string(),
            "/ws".to_string(),
        ],
    })
}

/// GET /channels: registered channels and their capabilities.
async fn channels_http(State(state): State<ServerState>) -> Json<Vec<ChannelSummary>> {
    Json(channel_summaries(&state.gateway).await)
}

/// POST /messages: body is a wire envelope; returns the response envelope.
async fn messages_http(
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let request = match serde_json::from_slice::<Message>(&body) {
        Ok(m) => m,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, format!("invalid envelope: {}", e)).into_response()
        }
    };
    let response = state.gateway.handle(request).await;
    let response = adapt_for_channel(&response, &ChannelCapabilities::peer());
    Json(response).into_response()
}

/// GET /health: simple health JSON (for probes and finalize checks).
async fn health_http(State(state): State<ServerState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "running",
        "agent": state.gateway.agent_name(),
        "version": state.gateway.agent_version(),
        "protocol": PROTOCOL_VERSION,
        "port": state.config.gateway.port,
    }))
}

/// GET /ws upgrades to WebSocket. First client frame must be identify.
async fn ws_handler(
    State(state): State<ServerState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send_json<T: serde::Serialize>(socket: &mut WebSocket, value: &T) -> bool {
    match serde_json::to_string(value) {
        Ok(text) => socket.send(WsMessage::Text(text)).await.is_ok(),
        Err(_) => false,
    }
}

async fn handle_socket(mut socket: WebSocket, state: ServerState) {
    let mut event_rx = state.event_tx.subscribe();

    // Mandatory identify handshake before any envelope exchange.
    let peer_address = loop {
        let Some(Ok(msg)) = socket.recv().await else {
            return;
        };
        let WsMessage::Text(text) = msg else { continue };
        let identify: IdentifyFrame = match serde_json::from_str(&text) {
            Ok(f) => f,
            Err(_) => {
                let _ = send_json(&mut socket, &WsErrorFrame::new("expected identify frame")).await;
                return;
            }
        };
        if identify.action != "identify" {
            let _ = send_json(
                &mut socket,
                &WsErrorFrame::new(format!("unexpected action: {}", identify.action)),
            )
            .await;
            return;
        }
        match Address::parse(&identify.address) {
            Ok(addr) => break addr,
            Err(e) => {
                let _ = send_json(&mut socket, &WsErrorFrame::new(e.to_string())).await;
                return;
            }
        }
    };

    let session = state
        .gateway
        .sessions()
        .create(Some(peer_address.agent_id.clone()), Some("peer".to_string()), None)
        .await;
    if !send_json(&mut socket, &IdentifiedFrame::new(&session.id)).await {
        state.gateway.sessions().end(&session.id).await;
        return;
    }
    log::debug!("ws peer identified: {} -> {}", peer_address, session.id);

    loop {
        tokio::select! {
            biased;

            event = event_rx.recv() => {
                match event {
                    Ok(text) => {
                        let is_shutdown = text == SHUTDOWN_EVENT_JSON;
                        let _ = socket.send(WsMessage::Text(text)).await;
                        if is_shutdown {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        log::debug!("ws peer lagged {} broadcast messages", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                let WsMessage::Text(text) = msg else { continue };
                let request = match Message::from_wire(&text) {
                    Ok(m) => m,
                    Err(e) => {
                        if !send_json(&mut socket, &WsErrorFrame::new(format!("invalid envelope: {}", e))).await {
                            break;
                        }
                        continue;
                    }
                };
                let request = request.with_session(session.id.clone());
                let response = state.gateway.handle(request).await;
                let response = adapt_for_channel(&response, &ChannelCapabilities::peer());
                if !send_json(&mut socket, &response).await {
                    break;
                }
            }
        }
    }

    state.gateway.sessions().end(&session.id).await;
    log::debug!("ws peer disconnected, session ended");
}
