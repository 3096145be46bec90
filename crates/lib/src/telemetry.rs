//! Telemetry sink for dispatched messages.
//!
//! Recording must never block or fail a response: the gateway swallows sink
//! errors with a warning.

use crate::message::Message;
use async_trait::async_trait;

/// External collaborator that records each request/response pair.
#[async_trait]
pub trait MessageLog: Send + Sync {
    async fn record(&self, request: &Message, response: &Message) -> Result<(), String>;
}

/// Sink that records nothing.
pub struct NoopMessageLog;

#[async_trait]
impl MessageLog for NoopMessageLog {
    async fn record(&self, _request: &Message, _response: &Message) -> Result<(), String> {
        Ok(())
    }
}
