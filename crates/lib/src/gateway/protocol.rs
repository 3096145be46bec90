//! Peer protocol types: the discovery manifest and the WebSocket identify
//! handshake. Envelope exchange itself uses the `Message` wire form.

use crate::channels::ChannelCapabilities;
use serde::{Deserialize, Serialize};

/// Protocol revision announced in the manifest and health document.
pub const PROTOCOL_VERSION: u32 = 1;

/// `GET /manifest`: identity + capability + endpoint discovery document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub agent: String,
    pub version: String,
    pub protocol: u32,
    pub address: String,
    pub channels: Vec<ChannelSummary>,
    pub endpoints: Vec<String>,
}

/// One registered channel as listed in /manifest and /channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSummary {
    pub id: String,
    pub channel_type: String,
    pub capabilities: ChannelCapabilities,
}

/// Mandatory first client frame on `WS /ws`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyFrame {
    pub action: String,
    pub address: String,
}

/// Server answer to a successful identify.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifiedFrame {
    pub action: String,
    pub session_id: String,
}

impl IdentifiedFrame {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            action: "identified".to_string(),
            session_id: session_id.into(),
        }
    }
}

/// Error frame sent before closing a misbehaving WS peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsErrorFrame {
    pub action: String,
    pub error: String,
}

impl WsErrorFrame {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            action: "error".to_string(),
            error: error.into(),
        }
    }
}
