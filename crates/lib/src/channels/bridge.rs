//! Generic chat-bridge channel: talks HTTP to an external bridge process
//! that fronts a chat platform. Platform specifics live in the bridge; this
//! adapter only honors the adapter and binding contracts.

use crate::binding::{AuthPoll, AuthPrompt, BindingContext, ChannelAuthenticator};
use crate::channels::adapter::ChannelAdapter;
use crate::channels::capabilities::{adapt_for_channel, ChannelCapabilities};
use crate::error::BindingError;
use crate::gateway::Gateway;
use crate::message::Message;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Bridge channel adapter: text-only capabilities, delivery via the bridge's
/// `/send` endpoint.
pub struct BridgeAdapter {
    id: String,
    base_url: String,
    capabilities: ChannelCapabilities,
    client: reqwest::Client,
}

impl BridgeAdapter {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            capabilities: ChannelCapabilities::bridge(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChannelAdapter for BridgeAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn channel_type(&self) -> &str {
        "bridge"
    }

    fn capabilities(&self) -> &ChannelCapabilities {
        &self.capabilities
    }

    fn start(self: Arc<Self>, _gateway: Arc<Gateway>) -> JoinHandle<()> {
        // The bridge pushes inbound traffic to the gateway server; no
        // listener task here.
        tokio::spawn(async {})
    }

    fn stop(&self) {}

    async fn send(&self, conversation_id: &str, message: &Message) -> Result<(), String> {
        let adapted = adapt_for_channel(message, &self.capabilities);
        let url = format!("{}/send", self.base_url);
        let body = serde_json::json!({
            "conversation_id": conversation_id,
            "text": adapted.extract_text(),
        });
        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("bridge send failed: {} {}", status, body));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct QrResponse {
    qr: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct AuthStatusResponse {
    authenticated: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Binding-side of the bridge: QR auth over the bridge's auth endpoints.
pub struct BridgeAuthenticator {
    channel_type: String,
    base_url: String,
    client: reqwest::Client,
}

impl BridgeAuthenticator {
    pub fn new(channel_type: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            channel_type: channel_type.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChannelAuthenticator for BridgeAuthenticator {
    fn channel_type(&self) -> &str {
        &self.channel_type
    }

    async fn initialize_auth(&self, ctx: &mut BindingContext) -> Result<AuthPrompt, BindingError> {
        let url = format!("{}/auth/qr", self.base_url);
        let res = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| BindingError::InitFailed(e.to_string()))?;
        if !res.status().is_success() {
            return Err(BindingError::InitFailed(format!(
                "qr request failed: {}",
                res.status()
            )));
        }
        let qr: QrResponse = res
            .json()
            .await
            .map_err(|e| BindingError::InitFailed(e.to_string()))?;
        ctx.metadata.insert(
            "bridge_url".to_string(),
            serde_json::Value::String(self.base_url.clone()),
        );
        Ok(AuthPrompt {
            method: "qr".to_string(),
            instructions: format!(
                "Scan this QR code with the {} app to link the channel.",
                self.channel_type
            ),
            data: serde_json::json!({ "qr": qr.qr, "expires_in": qr.expires_in }),
        })
    }

    async fn check_auth_status(&self, _ctx: &mut BindingContext) -> AuthPoll {
        let url = format!("{}/auth/status", self.base_url);
        let res = match self.client.get(&url).send().await {
            Ok(r) => r,
            // Transient transport failure: keep polling until the deadline.
            Err(e) => {
                log::debug!("bridge auth status poll failed: {}", e);
                return AuthPoll::Pending;
            }
        };
        if !res.status().is_success() {
            return AuthPoll::Pending;
        }
        match res.json::<AuthStatusResponse>().await {
            Ok(s) if s.authenticated => AuthPoll::Authenticated,
            Ok(s) => match s.error {
                Some(e) => AuthPoll::Failed(e),
                None => AuthPoll::Pending,
            },
            Err(e) => AuthPoll::Failed(format!("invalid auth status payload: {}", e)),
        }
    }

    async fn finalize_binding(&self, ctx: &mut BindingContext) -> Result<bool, BindingError> {
        let url = format!("{}/health", self.base_url);
        let res = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| BindingError::ConnectivityFailure(e.to_string()))?;
        if res.status().is_success() {
            ctx.metadata
                .insert("connectivity".to_string(), serde_json::Value::String("ok".to_string()));
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn cleanup(&self, _ctx: &mut BindingContext) {
        let url = format!("{}/auth/cancel", self.base_url);
        if let Err(e) = self.client.post(&url).send().await {
            log::debug!("bridge auth cancel failed: {}", e);
        }
    }
}
