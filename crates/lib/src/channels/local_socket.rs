//! Local socket channel: length-prefixed JSON frames over loopback TCP.
//!
//! Frame = 4-byte big-endian length prefix + that many bytes of UTF-8 JSON.
//! First server→client frame after connect is a welcome carrying the
//! session id. Client frames carry `{"text": ...}`; server frames carry
//! `{"type": "response"|"error", "text", "message_id", "session_id",
//! "data"?, "dropped_content"?}`.

use crate::address::Address;
use crate::channels::adapter::ChannelAdapter;
use crate::channels::capabilities::{adapt_for_channel, ChannelCapabilities};
use crate::gateway::Gateway;
use crate::message::{ContentType, Message, MessageKind};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Upper bound on one frame's payload. Oversized frames close the connection.
pub const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

/// Read one length-prefixed frame. Returns None on clean EOF.
pub async fn read_frame<R: AsyncReadExt + Unpin>(
    stream: &mut R,
) -> std::io::Result<Option<Vec<u8>>> {
    let mut header = [0u8; 4];
    match stream.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds limit", len),
        ));
    }
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

/// Write one length-prefixed frame.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    stream: &mut W,
    payload: &[u8],
) -> std::io::Result<()> {
    let len = payload.len() as u32;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(payload).await?;
    stream.flush().await
}

#[derive(Debug, Deserialize)]
struct ClientFrame {
    text: String,
    #[serde(default)]
    client_id: Option<String>,
}

/// Local socket listener: one tokio task per connection, messages handled
/// strictly in arrival order per connection.
pub struct LocalSocketChannel {
    id: String,
    bind: String,
    port: u16,
    capabilities: ChannelCapabilities,
    running: AtomicBool,
    stop_notify: Notify,
}

impl LocalSocketChannel {
    pub fn new(bind: impl Into<String>, port: u16) -> Self {
        Self {
            id: "socket".to_string(),
            bind: bind.into(),
            port,
            capabilities: ChannelCapabilities::local_socket(),
            running: AtomicBool::new(false),
            stop_notify: Notify::new(),
        }
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelAdapter for LocalSocketChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn channel_type(&self) -> &str {
        "local-socket"
    }

    fn capabilities(&self) -> &ChannelCapabilities {
        &self.capabilities
    }

    fn start(self: Arc<Self>, gateway: Arc<Gateway>) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        tokio::spawn(async move {
            let addr = format!("{}:{}", self.bind, self.port);
            let listener = match TcpListener::bind(&addr).await {
                Ok(l) => l,
                Err(e) => {
                    log::warn!("socket channel: bind {} failed: {}", addr, e);
                    return;
                }
            };
            log::info!("socket channel listening on {}", addr);
            while self.running() {
                tokio::select! {
                    _ = self.stop_notify.notified() => break,
                    accepted = listener.accept() => {
                        let (stream, peer) = match accepted {
                            Ok(p) => p,
                            Err(e) => {
                                log::debug!("socket channel: accept failed: {}", e);
                                continue;
                            }
                        };
                        log::debug!("socket channel: client connected from {}", peer);
                        let gateway = gateway.clone();
                        let channel = self.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, gateway, channel).await;
                        });
                    }
                }
            }
            log::info!("socket channel stopped");
        })
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.stop_notify.notify_waiters();
    }
}

/// Serve one client: welcome frame, then request/response in arrival order.
/// The session ends when the client disconnects.
async fn handle_connection(
    mut stream: TcpStream,
    gateway: Arc<Gateway>,
    channel: Arc<LocalSocketChannel>,
) {
    let session = gateway
        .sessions()
        .create(None, Some(channel.id.clone()), None)
        .await;
    let welcome = json!({ "type": "welcome", "session_id": session.id });
    if write_frame(&mut stream, welcome.to_string().as_bytes())
        .await
        .is_err()
    {
        gateway.sessions().end(&session.id).await;
        return;
    }

    loop {
        let payload = match read_frame(&mut stream).await {
            Ok(Some(p)) => p,
            Ok(None) => break,
            Err(e) => {
                log::debug!("socket channel: read failed: {}", e);
                break;
            }
        };
        let frame: ClientFrame = match serde_json::from_slice(&payload) {
            Ok(f) => f,
            Err(e) => {
                log::debug!("socket channel: malformed client frame: {}", e);
                break;
            }
        };
        if let Some(client_id) = frame.client_id {
            gateway.sessions().set_client_id(&session.id, client_id).await;
        }

        let request = Message::text(frame.text)
            .with_session(session.id.clone())
            .with_source(
                Address::new("local")
                    .with_channel(channel.id.clone())
                    .with_session(session.id.clone()),
            );
        let response = gateway.handle(request).await;
        let response = adapt_for_channel(&response, &channel.capabilities);

        let mut out = json!({
            "type": match response.kind {
                MessageKind::Error => "error",
                _ => "response",
            },
            "text": response.extract_text(),
            "message_id": response.id,
            "session_id": session.id,
        });
        let extra: Vec<_> = response
            .content
            .iter()
            .filter(|c| c.content_type != ContentType::Text)
            .collect();
        if !extra.is_empty() {
            out["data"] = serde_json::to_value(&extra).unwrap_or(serde_json::Value::Null);
        }
        if let Some(dropped) = response.metadata.get("dropped_content") {
            out["dropped_content"] = dropped.clone();
        }
        if write_frame(&mut stream, out.to_string().as_bytes())
            .await
            .is_err()
        {
            break;
        }
    }

    gateway.sessions().end(&session.id).await;
    log::debug!("socket channel: client disconnected, session ended");
}
