//! Binding manager: drives a channel through the auth state machine.
//!
//! The manager knows nothing about rendering; it publishes every state
//! transition (and the auth prompt) to an injected UI callback. Polling is
//! an explicit retry loop with a monotonic deadline.

use crate::binding::context::{
    AuthPoll, AuthPrompt, BindingContext, BindingStatus, ChannelAuthenticator,
};
use crate::binding::service_identity::ServiceIdentity;
use crate::error::BindingError;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Default interval between auth status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Receives every state transition (and the auth prompt when one exists).
/// Errors are logged and never abort the binding.
#[async_trait]
pub trait BindingUi: Send + Sync {
    async fn render(
        &self,
        ctx: &BindingContext,
        prompt: Option<&AuthPrompt>,
    ) -> anyhow::Result<()>;
}

/// UI that renders nothing (tests, headless use).
pub struct NoopBindingUi;

#[async_trait]
impl BindingUi for NoopBindingUi {
    async fn render(&self, _ctx: &BindingContext, _prompt: Option<&AuthPrompt>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Orchestrates channel onboarding. One binding per channel type may be in
/// flight at a time; a second `bind` for the same type is rejected.
pub struct BindingManager {
    service_identity: Option<ServiceIdentity>,
    poll_interval: Duration,
    ui: Arc<dyn BindingUi>,
    active: Mutex<HashSet<String>>,
}

impl BindingManager {
    pub fn new(service_identity: Option<ServiceIdentity>, ui: Arc<dyn BindingUi>) -> Self {
        Self {
            service_identity,
            poll_interval: DEFAULT_POLL_INTERVAL,
            ui,
            active: Mutex::new(HashSet::new()),
        }
    }

    /// Override the poll interval (tests use a short one).
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run the full binding sequence for one channel.
    ///
    /// On success returns the context with status `Completed` and a stamped
    /// `completed_at`. On failure the context is marked `Failed`, `cleanup`
    /// has run, and the typed error is returned to the caller. `cleanup`
    /// runs exactly once per call regardless of outcome.
    pub async fn bind(
        &self,
        authenticator: &dyn ChannelAuthenticator,
        timeout: Duration,
    ) -> Result<BindingContext, BindingError> {
        let channel_type = authenticator.channel_type().to_string();
        {
            let mut active = self.active.lock().await;
            if !active.insert(channel_type.clone()) {
                return Err(BindingError::AlreadyInProgress(channel_type));
            }
        }

        let mut ctx = BindingContext::new(&channel_type);
        self.render(&ctx, None).await;

        let result = self.run_states(authenticator, &mut ctx, timeout).await;
        if let Err(ref e) = result {
            ctx.error = Some(e.to_string());
            self.transition(&mut ctx, BindingStatus::Failed).await;
        }

        // finally-equivalent: cleanup runs exactly once, success or failure.
        authenticator.cleanup(&mut ctx).await;
        self.active.lock().await.remove(&channel_type);

        result.map(|()| ctx)
    }

    async fn run_states(
        &self,
        authenticator: &dyn ChannelAuthenticator,
        ctx: &mut BindingContext,
        timeout: Duration,
    ) -> Result<(), BindingError> {
        if let Some(ref identity) = self.service_identity {
            self.transition(ctx, BindingStatus::ServiceIdentityAuth).await;
            identity.verify()?;
            ctx.metadata.insert(
                "service_identity".to_string(),
                serde_json::Value::String(identity.id.clone()),
            );
        }

        self.transition(ctx, BindingStatus::AwaitingChannelAuth).await;
        let prompt = authenticator.initialize_auth(ctx).await?;
        ctx.auth_method = Some(prompt.method.clone());
        ctx.auth_data = prompt.data.clone();
        self.render(ctx, Some(&prompt)).await;

        self.transition(ctx, BindingStatus::ChannelAuthenticating).await;
        let deadline = Instant::now() + timeout;
        loop {
            match authenticator.check_auth_status(ctx).await {
                AuthPoll::Authenticated => break,
                AuthPoll::Failed(e) => return Err(BindingError::AuthFailed(e)),
                AuthPoll::Pending => {
                    if Instant::now() >= deadline {
                        return Err(BindingError::Timeout(timeout.as_secs()));
                    }
                    tokio::time::sleep(self.poll_interval).await;
                    if Instant::now() >= deadline {
                        return Err(BindingError::Timeout(timeout.as_secs()));
                    }
                }
            }
        }

        self.transition(ctx, BindingStatus::ChannelAuthenticated).await;
        self.transition(ctx, BindingStatus::TestingConnection).await;
        match authenticator.finalize_binding(ctx).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(BindingError::ConnectivityFailure(
                    "finalize reported failure".to_string(),
                ))
            }
            Err(e) => return Err(BindingError::ConnectivityFailure(e.to_string())),
        }

        ctx.completed_at = Some(Utc::now());
        self.transition(ctx, BindingStatus::Completed).await;
        Ok(())
    }

    async fn transition(&self, ctx: &mut BindingContext, status: BindingStatus) {
        ctx.status = status;
        self.render(ctx, None).await;
    }

    async fn render(&self, ctx: &BindingContext, prompt: Option<&AuthPrompt>) {
        if let Err(e) = self.ui.render(ctx, prompt).await {
            log::warn!("binding ui callback failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted authenticator: authenticates after `succeed_after` polls
    /// (0 = never), counts cleanup invocations.
    struct FakeAuthenticator {
        succeed_after: usize,
        polls: AtomicUsize,
        cleanups: Arc<AtomicUsize>,
        finalize_ok: bool,
    }

    impl FakeAuthenticator {
        fn new(succeed_after: usize, finalize_ok: bool) -> (Self, Arc<AtomicUsize>) {
            let cleanups = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    succeed_after,
                    polls: AtomicUsize::new(0),
                    cleanups: cleanups.clone(),
                    finalize_ok,
                },
                cleanups,
            )
        }
    }

    #[async_trait]
    impl ChannelAuthenticator for FakeAuthenticator {
        fn channel_type(&self) -> &str {
            "fake"
        }

        async fn initialize_auth(
            &self,
            _ctx: &mut BindingContext,
        ) -> Result<AuthPrompt, BindingError> {
            Ok(AuthPrompt {
                method: "qr".to_string(),
                instructions: "scan the code".to_string(),
                data: serde_json::json!({ "qr": "fake-payload" }),
            })
        }

        async fn check_auth_status(&self, _ctx: &mut BindingContext) -> AuthPoll {
            let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.succeed_after > 0 && n >= self.succeed_after {
                AuthPoll::Authenticated
            } else {
                AuthPoll::Pending
            }
        }

        async fn finalize_binding(
            &self,
            _ctx: &mut BindingContext,
        ) -> Result<bool, BindingError> {
            Ok(self.finalize_ok)
        }

        async fn cleanup(&self, _ctx: &mut BindingContext) {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn manager() -> BindingManager {
        BindingManager::new(None, Arc::new(NoopBindingUi))
            .with_poll_interval(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn completes_on_third_poll() {
        let (auth, cleanups) = FakeAuthenticator::new(3, true);
        let ctx = manager().bind(&auth, Duration::from_secs(5)).await.unwrap();
        assert_eq!(ctx.status, BindingStatus::Completed);
        assert!(ctx.completed_at.is_some());
        assert_eq!(ctx.auth_method.as_deref(), Some("qr"));
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn never_authenticating_times_out_with_single_cleanup() {
        let (auth, cleanups) = FakeAuthenticator::new(0, true);
        let err = manager()
            .bind(&auth, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, BindingError::Timeout(_)));
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_finalize_is_connectivity_failure() {
        let (auth, cleanups) = FakeAuthenticator::new(1, false);
        let err = manager()
            .bind(&auth, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, BindingError::ConnectivityFailure(_)));
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fatal_poll_error_aborts() {
        struct FatalAuth;
        #[async_trait]
        impl ChannelAuthenticator for FatalAuth {
            fn channel_type(&self) -> &str {
                "fatal"
            }
            async fn initialize_auth(
                &self,
                _ctx: &mut BindingContext,
            ) -> Result<AuthPrompt, BindingError> {
                Ok(AuthPrompt {
                    method: "token".to_string(),
                    instructions: String::new(),
                    data: serde_json::Value::Null,
                })
            }
            async fn check_auth_status(&self, _ctx: &mut BindingContext) -> AuthPoll {
                AuthPoll::Failed("credentials revoked".to_string())
            }
            async fn finalize_binding(
                &self,
                _ctx: &mut BindingContext,
            ) -> Result<bool, BindingError> {
                Ok(true)
            }
            async fn cleanup(&self, _ctx: &mut BindingContext) {}
        }
        let err = manager()
            .bind(&FatalAuth, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, BindingError::AuthFailed(_)));
    }

    #[tokio::test]
    async fn expired_service_identity_fails_before_channel_auth() {
        let mut identity = ServiceIdentity::issue(None);
        identity.expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        let mgr = BindingManager::new(Some(identity), Arc::new(NoopBindingUi))
            .with_poll_interval(Duration::from_millis(10));
        let (auth, cleanups) = FakeAuthenticator::new(1, true);
        let err = mgr.bind(&auth, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, BindingError::AuthExpired));
        // initialize_auth never ran, but cleanup still did exactly once
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        assert_eq!(auth.polls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrent_bind_for_same_channel_type_is_rejected() {
        let mgr = Arc::new(manager());
        let (slow, _cleanups) = FakeAuthenticator::new(50, true);
        let mgr2 = mgr.clone();
        let first = tokio::spawn(async move {
            mgr2.bind(&slow, Duration::from_secs(5)).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        let (second, _) = FakeAuthenticator::new(1, true);
        let err = mgr.bind(&second, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, BindingError::AlreadyInProgress(_)));
        let _ = first.await;
    }

    #[tokio::test]
    async fn ui_sees_every_transition() {
        struct RecordingUi(std::sync::Mutex<Vec<BindingStatus>>);
        #[async_trait]
        impl BindingUi for RecordingUi {
            async fn render(
                &self,
                ctx: &BindingContext,
                _prompt: Option<&AuthPrompt>,
            ) -> anyhow::Result<()> {
                self.0.lock().unwrap().push(ctx.status);
                Ok(())
            }
        }
        let ui = Arc::new(RecordingUi(std::sync::Mutex::new(Vec::new())));
        let mgr = BindingManager::new(None, ui.clone())
            .with_poll_interval(Duration::from_millis(5));
        let (auth, _) = FakeAuthenticator::new(1, true);
        mgr.bind(&auth, Duration::from_secs(5)).await.unwrap();
        let seen = ui.0.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                BindingStatus::Pending,
                BindingStatus::AwaitingChannelAuth,
                BindingStatus::AwaitingChannelAuth, // prompt render
                BindingStatus::ChannelAuthenticating,
                BindingStatus::ChannelAuthenticated,
                BindingStatus::TestingConnection,
                BindingStatus::Completed,
            ]
        );
    }
}
