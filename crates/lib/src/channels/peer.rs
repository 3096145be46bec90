//! Outbound peer channel: delivers envelopes to another gateway's
//! `POST /messages` endpoint. Inbound peer traffic arrives through our own
//! HTTP/WS server, so this adapter has no listener task.

use crate::channels::adapter::ChannelAdapter;
use crate::channels::capabilities::{adapt_for_channel, ChannelCapabilities};
use crate::gateway::Gateway;
use crate::message::Message;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub struct PeerChannel {
    id: String,
    base_url: String,
    capabilities: ChannelCapabilities,
    client: reqwest::Client,
}

impl PeerChannel {
    /// `base_url` is the peer gateway root, e.g. `http://peer.local:7410`.
    pub fn new(id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            capabilities: ChannelCapabilities::peer(),
            client: reqwest::Client::new(),
        }
    }

    /// Fetch the peer's discovery manifest.
    pub async fn manifest(&self) -> Result<serde_json::Value, String> {
        let url = format!("{}/manifest", self.base_url);
        let res = self.client.get(&url).send().await.map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            return Err(format!("manifest fetch failed: {}", res.status()));
        }
        res.json().await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl ChannelAdapter for PeerChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn channel_type(&self) -> &str {
        "peer"
    }

    fn capabilities(&self) -> &ChannelCapabilities {
        &self.capabilities
    }

    fn start(self: Arc<Self>, _gateway: Arc<Gateway>) -> JoinHandle<()> {
        // No background listener; inbound comes via the gateway server.
        tokio::spawn(async {})
    }

    fn stop(&self) {}

    async fn send(&self, _conversation_id: &str, message: &Message) -> Result<(), String> {
        let adapted = adapt_for_channel(message, &self.capabilities);
        let url = format!("{}/messages", self.base_url);
        let res = self
            .client
            .post(&url)
            .json(&adapted)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("peer delivery failed: {} {}", status, body));
        }
        Ok(())
    }
}
