//! Central dispatcher: classify an inbound envelope and invoke the matching
//! handler (symbolic command, trigger, or LLM fallback).
//!
//! `handle` never fails outward; every internal error becomes an
//! error-kind envelope with `reply_to` set to the request id.

use crate::channels::ChannelRegistry;
use crate::error::GatewayError;
use crate::llm::LlmBackend;
use crate::message::{Content, Message};
use crate::session::{Session, SessionStore};
use crate::telemetry::{MessageLog, NoopMessageLog};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// A registered message handler (command or trigger target).
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(
        &self,
        gateway: &Gateway,
        request: &Message,
        session: &Session,
    ) -> Result<Message, GatewayError>;
}

struct CommandEntry {
    /// Canonical name (first registered name; aliases point at the same entry).
    name: String,
    description: String,
    handler: Arc<dyn Handler>,
}

struct TriggerEntry {
    /// Lower-cased phrase; matched by substring against lower-cased text.
    phrase: String,
    handler: Arc<dyn Handler>,
}

/// The gateway instance: owns the command/trigger registries, session
/// store, channel registry, and the LLM fallback backend.
pub struct Gateway {
    agent_name: String,
    agent_version: String,
    started_at: DateTime<Utc>,
    commands: RwLock<HashMap<String, Arc<CommandEntry>>>,
    triggers: RwLock<Vec<TriggerEntry>>,
    sessions: Arc<SessionStore>,
    channels: Arc<ChannelRegistry>,
    llm: Arc<dyn LlmBackend>,
    llm_timeout: Duration,
    telemetry: RwLock<Arc<dyn MessageLog>>,
}

impl Gateway {
    pub fn new(
        agent_name: impl Into<String>,
        agent_version: impl Into<String>,
        llm: Arc<dyn LlmBackend>,
        llm_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            agent_name: agent_name.into(),
            agent_version: agent_version.into(),
            started_at: Utc::now(),
            commands: RwLock::new(HashMap::new()),
            triggers: RwLock::new(Vec::new()),
            sessions: Arc::new(SessionStore::new()),
            channels: Arc::new(ChannelRegistry::new()),
            llm,
            llm_timeout,
            telemetry: RwLock::new(Arc::new(NoopMessageLog)),
        })
    }

    /// Replace the telemetry sink.
    pub async fn set_telemetry(&self, telemetry: Arc<dyn MessageLog>) {
        *self.telemetry.write().await = telemetry;
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    pub fn agent_version(&self) -> &str {
        &self.agent_version
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }

    /// Register a command under a name plus aliases. Duplicate names or
    /// aliases are a configuration error and are rejected.
    pub async fn register_command(
        &self,
        names: &[&str],
        description: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> Result<(), GatewayError> {
        let canonical = names
            .first()
            .ok_or_else(|| GatewayError::HandlerFailure("command needs a name".to_string()))?;
        let entry = Arc::new(CommandEntry {
            name: canonical.to_string(),
            description: description.into(),
            handler,
        });
        let mut commands = self.commands.write().await;
        for name in names {
            if commands.contains_key(*name) {
                return Err(GatewayError::DuplicateCommand(name.to_string()));
            }
        }
        for name in names {
            commands.insert(name.to_string(), entry.clone());
        }
        Ok(())
    }

    /// Register a trigger phrase (matched case-insensitively by substring).
    pub async fn register_trigger(
        &self,
        phrase: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> Result<(), GatewayError> {
        let phrase = phrase.into().to_lowercase();
        let mut triggers = self.triggers.write().await;
        if triggers.iter().any(|t| t.phrase == phrase) {
            return Err(GatewayError::DuplicateTrigger(phrase));
        }
        triggers.push(TriggerEntry {
            phrase,
            handler,
        });
        Ok(())
    }

    /// Registered command names with descriptions (canonical names only).
    pub async fn command_list(&self) -> Vec<(String, String)> {
        let commands = self.commands.read().await;
        let mut seen: Vec<(String, String)> = Vec::new();
        for entry in commands.values() {
            if !seen.iter().any(|(n, _)| n == &entry.name) {
                seen.push((entry.name.clone(), entry.description.clone()));
            }
        }
        seen.sort();
        seen
    }

    /// Dispatch one envelope. Routing order: symbolic command, trigger,
    /// LLM fallback. Never returns an error; failures become error
    /// envelopes with `reply_to` set.
    pub async fn handle(&self, message: Message) -> Message {
        let session = self.resolve_session(&message).await;
        let mut request = message;
        request.session_id = Some(session.id.clone());

        let response = self.route(&request, &session).await;
        let telemetry = self.telemetry.read().await.clone();
        if let Err(e) = telemetry.record(&request, &response).await {
            log::warn!("telemetry record failed: {}", e);
        }
        response
    }

    /// Session from the envelope's session_id, else a fresh one bound to the
    /// source channel.
    async fn resolve_session(&self, message: &Message) -> Session {
        if let Some(ref id) = message.session_id {
            if let Some(session) = self.sessions.get(id).await {
                return session;
            }
        }
        let channel_id = message
            .source
            .as_ref()
            .and_then(|a| a.channel_id.clone());
        self.sessions.create(None, channel_id, None).await
    }

    async fn route(&self, request: &Message, session: &Session) -> Message {
        let text = request.extract_text();

        if let Some(command_text) = strip_sigil(text) {
            let token = command_text.split_whitespace().next().unwrap_or("");
            let entry = self.commands.read().await.get(token).cloned();
            return match entry {
                Some(entry) => self.invoke(entry.handler.as_ref(), request, session).await,
                None => {
                    let err = GatewayError::UnknownCommand(token.to_string());
                    Message::error_to(request, err.code(), err.to_string())
                }
            };
        }

        let lowered = text.to_lowercase();
        let trigger = {
            let triggers = self.triggers.read().await;
            triggers
                .iter()
                .find(|t| lowered.contains(&t.phrase))
                .map(|t| t.handler.clone())
        };
        if let Some(handler) = trigger {
            return self.invoke(handler.as_ref(), request, session).await;
        }

        self.fallback(request, session).await
    }

    async fn invoke(
        &self,
        handler: &dyn Handler,
        request: &Message,
        session: &Session,
    ) -> Message {
        match handler.handle(self, request, session).await {
            Ok(response) => response,
            Err(e) => {
                log::warn!("handler failed: {}", e);
                Message::error_to(request, e.code(), e.to_string())
            }
        }
    }

    /// Default handler: forward the text (with session/channel context) to
    /// the LLM backend, bounded by the configured deadline.
    async fn fallback(&self, request: &Message, session: &Session) -> Message {
        let prompt = self.build_prompt(request, session);
        match tokio::time::timeout(self.llm_timeout, self.llm.generate(&prompt)).await {
            Ok(Ok(reply)) => Message::response_to(request, vec![Content::text(reply)]),
            Ok(Err(e)) => {
                log::warn!("llm fallback failed: {}", e);
                Message::error_to(request, "llm_error", e.to_string())
            }
            Err(_) => {
                log::warn!(
                    "llm fallback exceeded {}s deadline",
                    self.llm_timeout.as_secs()
                );
                Message::error_to(
                    request,
                    "llm_timeout",
                    format!("backend did not answer within {}s", self.llm_timeout.as_secs()),
                )
            }
        }
    }

    fn build_prompt(&self, request: &Message, session: &Session) -> String {
        let channel = session.channel_id.as_deref().unwrap_or("unknown");
        format!(
            "You are {}, an agent gateway (version {}). The user is talking to you over the {} channel in session {}.\n\nUser: {}",
            self.agent_name,
            self.agent_version,
            channel,
            session.id,
            request.extract_text()
        )
    }

    /// Register the built-in /help, /version, and /status commands.
    pub async fn register_builtin_commands(&self) -> Result<(), GatewayError> {
        self.register_command(&["help", "h"], "list available commands", Arc::new(HelpCommand))
            .await?;
        self.register_command(&["version"], "agent name and version", Arc::new(VersionCommand))
            .await?;
        self.register_command(&["status"], "gateway status", Arc::new(StatusCommand))
            .await?;
        Ok(())
    }
}

/// Strip the command sigil (`/` or `--`). Returns None for non-command text.
fn strip_sigil(text: &str) -> Option<&str> {
    let trimmed = text.trim_start();
    trimmed
        .strip_prefix("--")
        .or_else(|| trimmed.strip_prefix('/'))
}

struct HelpCommand;

#[async_trait]
impl Handler for HelpCommand {
    async fn handle(
        &self,
        gateway: &Gateway,
        request: &Message,
        _session: &Session,
    ) -> Result<Message, GatewayError> {
        let mut out = String::from("Available commands:\n");
        for (name, description) in gateway.command_list().await {
            out.push_str(&format!("  /{} - {}\n", name, description));
        }
        Ok(Message::response_to(request, vec![Content::text(out)]))
    }
}

struct VersionCommand;

#[async_trait]
impl Handler for VersionCommand {
    async fn handle(
        &self,
        gateway: &Gateway,
        request: &Message,
        _session: &Session,
    ) -> Result<Message, GatewayError> {
        Ok(Message::response_to(
            request,
            vec![Content::text(format!(
                "{} {}",
                gateway.agent_name(),
                gateway.agent_version()
            ))],
        ))
    }
}

struct StatusCommand;

#[async_trait]
impl Handler for StatusCommand {
    async fn handle(
        &self,
        gateway: &Gateway,
        request: &Message,
        _session: &Session,
    ) -> Result<Message, GatewayError> {
        let payload = serde_json::json!({
            "agent": gateway.agent_name(),
            "version": gateway.agent_version(),
            "uptime_secs": gateway.uptime_secs(),
            "sessions": gateway.sessions().count().await,
            "channels": gateway.channels().count().await,
        });
        Ok(Message::response_to(
            request,
            vec![
                Content::text(format!(
                    "{} {}: {} session(s), {} channel(s)",
                    gateway.agent_name(),
                    gateway.agent_version(),
                    gateway.sessions().count().await,
                    gateway.channels().count().await,
                )),
                Content::json(payload),
            ],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::message::MessageKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fake backend that records calls and echoes a canned reply.
    struct FakeLlm {
        calls: AtomicUsize,
        reply: String,
    }

    impl FakeLlm {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                reply: reply.to_string(),
            })
        }
    }

    #[async_trait]
    impl LlmBackend for FakeLlm {
        async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    /// Backend that never answers (for deadline tests).
    struct StuckLlm;

    #[async_trait]
    impl LlmBackend for StuckLlm {
        async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }
    }

    async fn gateway_with(llm: Arc<dyn LlmBackend>) -> Arc<Gateway> {
        let g = Gateway::new("ponte", "0.1.0-test", llm, Duration::from_secs(5));
        g.register_builtin_commands().await.unwrap();
        g
    }

    #[tokio::test]
    async fn help_routes_symbolically_without_llm() {
        let llm = FakeLlm::new("should not be used");
        let gateway = gateway_with(llm.clone()).await;
        let response = gateway.handle(Message::text("/help")).await;
        assert_eq!(response.kind, MessageKind::Response);
        assert!(response.extract_text().contains("/version"));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_command_yields_error_with_reply_to() {
        let gateway = gateway_with(FakeLlm::new("x")).await;
        let request = Message::text("/unknownCmd123");
        let request_id = request.id.clone();
        let response = gateway.handle(request).await;
        assert_eq!(response.kind, MessageKind::Error);
        assert_eq!(response.reply_to.as_deref(), Some(request_id.as_str()));
        assert_eq!(
            response.content[0].data.get("code").and_then(|v| v.as_str()),
            Some("unknown_command")
        );
    }

    #[tokio::test]
    async fn double_dash_sigil_also_routes() {
        let gateway = gateway_with(FakeLlm::new("x")).await;
        let response = gateway.handle(Message::text("--version")).await;
        assert!(response.extract_text().contains("ponte"));
        assert!(response.extract_text().contains("0.1.0-test"));
    }

    #[tokio::test]
    async fn trigger_beats_fallback() {
        let llm = FakeLlm::new("fallback reply");
        let gateway = gateway_with(llm.clone()).await;

        struct WeatherTrigger;
        #[async_trait]
        impl Handler for WeatherTrigger {
            async fn handle(
                &self,
                _gateway: &Gateway,
                request: &Message,
                _session: &Session,
            ) -> Result<Message, GatewayError> {
                Ok(Message::response_to(
                    request,
                    vec![Content::text("weather handler")],
                ))
            }
        }
        gateway
            .register_trigger("weather", Arc::new(WeatherTrigger))
            .await
            .unwrap();

        let response = gateway
            .handle(Message::text("What's the WEATHER like today?"))
            .await;
        assert_eq!(response.extract_text(), "weather handler");
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn plain_text_falls_back_to_llm() {
        let llm = FakeLlm::new("the answer");
        let gateway = gateway_with(llm.clone()).await;
        let response = gateway.handle(Message::text("tell me something")).await;
        assert_eq!(response.kind, MessageKind::Response);
        assert_eq!(response.extract_text(), "the answer");
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_content_falls_back_without_panicking() {
        let llm = FakeLlm::new("ok");
        let gateway = gateway_with(llm).await;
        let response = gateway.handle(Message::notification()).await;
        assert_eq!(response.kind, MessageKind::Response);
    }

    #[tokio::test]
    async fn failing_handler_becomes_error_envelope() {
        let gateway = gateway_with(FakeLlm::new("x")).await;

        struct Boom;
        #[async_trait]
        impl Handler for Boom {
            async fn handle(
                &self,
                _gateway: &Gateway,
                _request: &Message,
                _session: &Session,
            ) -> Result<Message, GatewayError> {
                Err(GatewayError::HandlerFailure("boom".to_string()))
            }
        }
        gateway
            .register_command(&["boom"], "always fails", Arc::new(Boom))
            .await
            .unwrap();

        let request = Message::text("/boom");
        let request_id = request.id.clone();
        let response = gateway.handle(request).await;
        assert_eq!(response.kind, MessageKind::Error);
        assert_eq!(response.reply_to.as_deref(), Some(request_id.as_str()));
        assert_eq!(
            response.content[0].data.get("code").and_then(|v| v.as_str()),
            Some("handler_failure")
        );
    }

    #[tokio::test]
    async fn duplicate_command_registration_is_rejected() {
        let gateway = gateway_with(FakeLlm::new("x")).await;
        struct Noop;
        #[async_trait]
        impl Handler for Noop {
            async fn handle(
                &self,
                _gateway: &Gateway,
                request: &Message,
                _session: &Session,
            ) -> Result<Message, GatewayError> {
                Ok(Message::response_to(request, vec![]))
            }
        }
        let err = gateway
            .register_command(&["help"], "dup", Arc::new(Noop))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::DuplicateCommand(_)));
        // alias collision is rejected too
        let err = gateway
            .register_command(&["other", "h"], "dup alias", Arc::new(Noop))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::DuplicateCommand(_)));
    }

    #[tokio::test]
    async fn stuck_llm_hits_deadline() {
        let gateway = Gateway::new(
            "ponte",
            "0.1.0-test",
            Arc::new(StuckLlm),
            Duration::from_millis(50),
        );
        let response = gateway.handle(Message::text("hang forever")).await;
        assert_eq!(response.kind, MessageKind::Error);
        assert_eq!(
            response.content[0].data.get("code").and_then(|v| v.as_str()),
            Some("llm_timeout")
        );
    }

    #[tokio::test]
    async fn session_is_resolved_and_reused() {
        let gateway = gateway_with(FakeLlm::new("x")).await;
        let first = gateway.handle(Message::text("/version")).await;
        let session_id = first.session_id.clone().unwrap();
        let second = gateway
            .handle(Message::text("/version").with_session(session_id.clone()))
            .await;
        assert_eq!(second.session_id.as_deref(), Some(session_id.as_str()));
    }
}
