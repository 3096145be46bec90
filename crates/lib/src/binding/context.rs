//! Binding context, status machine, and the per-channel auth contract.

use crate::error::BindingError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Binding life-cycle. `Completed` and `Failed` are terminal; `Failed` is
/// reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingStatus {
    Pending,
    ServiceIdentityAuth,
    AwaitingChannelAuth,
    ChannelAuthenticating,
    ChannelAuthenticated,
    TestingConnection,
    Completed,
    Failed,
}

impl BindingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BindingStatus::Completed | BindingStatus::Failed)
    }
}

/// Tracks one channel-onboarding attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingContext {
    pub channel_type: String,
    pub status: BindingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_method: Option<String>,
    /// Method-specific payload, e.g. a QR code or an OAuth URL.
    #[serde(default)]
    pub auth_data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl BindingContext {
    pub fn new(channel_type: impl Into<String>) -> Self {
        Self {
            channel_type: channel_type.into(),
            status: BindingStatus::Pending,
            auth_method: None,
            auth_data: Value::Null,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
            metadata: Map::new(),
        }
    }
}

/// Display instructions returned by `initialize_auth`, published to the UI
/// callback. The manager does not interpret `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthPrompt {
    /// Auth method name ("qr", "oauth", "token", ...).
    pub method: String,
    /// Human-readable instructions for the operator.
    pub instructions: String,
    /// Method-specific payload (QR string, OAuth URL, ...).
    #[serde(default)]
    pub data: Value,
}

/// Outcome of one non-blocking auth poll. Pending is retryable; Failed is
/// fatal and aborts the binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthPoll {
    Authenticated,
    Pending,
    Failed(String),
}

/// Channel-specific binding operations, driven by the manager against a
/// shared context. `cleanup` is invoked exactly once per bind, success or
/// failure.
#[async_trait]
pub trait ChannelAuthenticator: Send + Sync {
    /// The channel type being onboarded (keys concurrent-bind rejection).
    fn channel_type(&self) -> &str;

    /// Begin channel-specific auth and return display instructions.
    async fn initialize_auth(&self, ctx: &mut BindingContext) -> Result<AuthPrompt, BindingError>;

    /// Non-blocking poll of the current auth state.
    async fn check_auth_status(&self, ctx: &mut BindingContext) -> AuthPoll;

    /// Verify end-to-end connectivity and persist whatever is needed to
    /// operate the channel. `Ok(false)` or `Err` both fail the binding.
    async fn finalize_binding(&self, ctx: &mut BindingContext) -> Result<bool, BindingError>;

    /// Release held connections/resources. Must not fail.
    async fn cleanup(&self, ctx: &mut BindingContext);
}
