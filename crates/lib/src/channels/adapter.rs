//! Channel adapter contract.

use crate::channels::capabilities::ChannelCapabilities;
use crate::gateway::Gateway;
use crate::message::Message;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A transport boundary: translates between a native wire format and the
/// canonical envelope. One instance per configured transport.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Channel id (e.g. "socket", "peer", "bridge").
    fn id(&self) -> &str;

    /// Adapter variant name, used as the binding channel type.
    fn channel_type(&self) -> &str;

    /// What this channel can carry. Not mutated at runtime.
    fn capabilities(&self) -> &ChannelCapabilities;

    /// Start background listener task(s); inbound messages are dispatched
    /// through the gateway. Adapters without a listener return a completed
    /// no-op handle.
    fn start(self: Arc<Self>, gateway: Arc<Gateway>) -> JoinHandle<()>;

    /// Stop listener tasks; cancellation is treated as normal shutdown.
    fn stop(&self);

    /// Deliver an (already content-negotiated) message to a conversation on
    /// this channel. Default returns an error for one-way adapters.
    async fn send(&self, _conversation_id: &str, _message: &Message) -> Result<(), String> {
        Err("send not implemented for this channel".to_string())
    }
}
