//! Error taxonomy for the gateway and the binding manager.
//!
//! The gateway never lets these escape `handle()`; they are converted to
//! error envelopes. The binding manager marks its context failed and then
//! returns the typed error to the caller.

use thiserror::Error;

/// Errors raised inside the gateway/router.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Address URI did not parse (wrong scheme, empty agent id).
    #[error("malformed address: {0}")]
    MalformedAddress(String),

    /// Symbolic command not registered.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// A dispatched handler failed.
    #[error("handler failed: {0}")]
    HandlerFailure(String),

    /// Command name or alias already registered.
    #[error("command already registered: {0}")]
    DuplicateCommand(String),

    /// Trigger phrase already registered.
    #[error("trigger already registered: {0}")]
    DuplicateTrigger(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),
}

impl GatewayError {
    /// Stable error code carried in error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::MalformedAddress(_) => "malformed_address",
            GatewayError::UnknownCommand(_) => "unknown_command",
            GatewayError::HandlerFailure(_) => "handler_failure",
            GatewayError::DuplicateCommand(_) => "duplicate_command",
            GatewayError::DuplicateTrigger(_) => "duplicate_trigger",
            GatewayError::SessionNotFound(_) => "session_not_found",
        }
    }
}

/// Errors raised by the binding manager while onboarding a channel.
#[derive(Debug, Error)]
pub enum BindingError {
    /// Service identity credential has expired.
    #[error("service identity expired")]
    AuthExpired,

    /// Service identity is missing one of the baseline permissions.
    #[error("service identity missing permission: {0}")]
    AuthMissingPermission(String),

    /// Channel auth did not complete within the caller's timeout.
    #[error("binding timed out after {0}s")]
    Timeout(u64),

    /// Channel-specific auth reported a fatal error.
    #[error("channel auth failed: {0}")]
    AuthFailed(String),

    /// Connectivity test or finalize step failed.
    #[error("connectivity check failed: {0}")]
    ConnectivityFailure(String),

    /// A bind for the same channel type is already in flight.
    #[error("binding already in progress for channel type: {0}")]
    AlreadyInProgress(String),

    #[error("auth initialization failed: {0}")]
    InitFailed(String),
}

/// Errors from the LLM backend.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm http error: {0}")]
    Http(String),

    #[error("llm backend error: {0}")]
    Backend(String),

    #[error("llm call timed out after {0}s")]
    Timeout(u64),
}
