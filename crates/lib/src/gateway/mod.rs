//! Gateway: router/dispatcher plus the peer HTTP + WebSocket server.
//!
//! Single port serves HTTP and WebSocket for agent-to-agent peers; the
//! local socket channel runs beside it. All registries live on the
//! `Gateway` instance, no global state.

mod protocol;
mod router;
mod server;

pub use protocol::{ChannelSummary, IdentifiedFrame, IdentifyFrame, Manifest, WsErrorFrame};
pub use router::{Gateway, Handler};
pub use server::run_gateway;
