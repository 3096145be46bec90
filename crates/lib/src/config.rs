//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.ponte/config.json`) and
//! environment. Every section defaults so an empty file is a valid config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Agent identity (name, version override).
    #[serde(default)]
    pub agent: AgentConfig,

    /// Peer HTTP/WS server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Local socket listener settings.
    #[serde(default)]
    pub socket: SocketConfig,

    /// LLM fallback backend settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Binding manager settings.
    #[serde(default)]
    pub binding: BindingConfig,

    /// Channel settings (e.g. chat bridge).
    #[serde(default)]
    pub channels: ChannelsConfig,
}

/// Agent identity announced in /manifest, /health, and /version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// Agent name (default "ponte").
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Override the announced version. Default: crate version.
    pub version: Option<String>,
}

fn default_agent_name() -> String {
    "ponte".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            version: None,
        }
    }
}

/// Gateway peer server bind, port, and auth settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP and WebSocket (default 7410).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// Auth settings. When absent, defaults to no auth for loopback bind.
    #[serde(default)]
    pub auth: GatewayAuthConfig,
}

/// Gateway auth: token or none (loopback-only when none).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayAuthConfig {
    #[serde(default)]
    pub mode: GatewayAuthMode,

    /// Shared secret for peer requests. Overridden by PONTE_GATEWAY_TOKEN env.
    pub token: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayAuthMode {
    /// No auth; allow only when bind is loopback.
    #[default]
    None,

    /// Require a bearer token on peer requests.
    Token,
}

fn default_gateway_port() -> u16 {
    7410
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            auth: GatewayAuthConfig::default(),
        }
    }
}

/// Local socket listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocketConfig {
    /// Whether the local socket listener starts with the gateway.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// Port for the length-prefixed frame protocol (default 7411).
    #[serde(default = "default_socket_port")]
    pub port: u16,
}

fn default_socket_port() -> u16 {
    7411
}

fn default_true() -> bool {
    true
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_gateway_bind(),
            port: default_socket_port(),
        }
    }
}

/// LLM backend settings for the default (fallback) handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    /// Backend base URL (default Ollama's http://127.0.0.1:11434).
    pub base_url: Option<String>,

    /// Model name passed to the backend as-is.
    pub model: Option<String>,

    /// Deadline for one fallback call. A stuck backend call fails the
    /// request with an llm_timeout error envelope instead of blocking the
    /// session task forever.
    #[serde(default = "default_llm_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_llm_timeout_secs() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            model: None,
            request_timeout_secs: default_llm_timeout_secs(),
        }
    }
}

/// Binding manager settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingConfig {
    /// Seconds between auth status polls (default 2).
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Default bind timeout when the CLI does not pass one (default 300).
    #[serde(default = "default_binding_timeout_secs")]
    pub timeout_secs: u64,

    /// Path to the service identity JSON. Default ~/.ponte/identity.json.
    pub service_identity_path: Option<PathBuf>,
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_binding_timeout_secs() -> u64 {
    300
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            timeout_secs: default_binding_timeout_secs(),
            service_identity_path: None,
        }
    }
}

/// Per-channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default)]
    pub bridge: BridgeChannelConfig,
}

/// Chat-bridge channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeChannelConfig {
    /// Base URL of the external bridge process. When unset, no bridge
    /// channel is registered.
    pub base_url: Option<String>,
}

/// Resolve the gateway token: env PONTE_GATEWAY_TOKEN overrides config.
pub fn resolve_gateway_token(config: &Config) -> Option<String> {
    std::env::var("PONTE_GATEWAY_TOKEN")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            config
                .gateway
                .auth
                .token
                .as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// True if the bind address is loopback (127.0.0.1, ::1, localhost).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Announced agent version: config override or the crate version.
pub fn resolve_agent_version(config: &Config) -> String {
    config
        .agent
        .version
        .clone()
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string())
}

/// Resolve config path from env or default (~/.ponte/config.json).
pub fn default_config_path() -> PathBuf {
    std::env::var("PONTE_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".ponte").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Resolve the service identity path (config override or ~/.ponte/identity.json).
pub fn resolve_identity_path(config: &Config) -> PathBuf {
    config
        .binding
        .service_identity_path
        .clone()
        .unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".ponte").join("identity.json"))
                .unwrap_or_else(|| PathBuf::from("identity.json"))
        })
}

/// Load config from the default path (or PONTE_CONFIG_PATH). Missing file
/// => default config. Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_is_valid_config() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.gateway.port, 7410);
        assert_eq!(config.socket.port, 7411);
        assert!(config.socket.enabled);
        assert_eq!(config.agent.name, "ponte");
        assert_eq!(config.llm.request_timeout_secs, 120);
        assert_eq!(config.binding.poll_interval_secs, 2);
    }

    #[test]
    fn loopback_detection() {
        assert!(is_loopback_bind("127.0.0.1"));
        assert!(is_loopback_bind("localhost"));
        assert!(!is_loopback_bind("0.0.0.0"));
    }
}
