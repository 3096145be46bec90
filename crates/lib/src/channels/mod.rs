//! Transport channels.
//!
//! Adapter trait and registry so the gateway can start/stop transports and
//! deliver envelopes. Each adapter declares capabilities; outgoing messages
//! are content-negotiated against them before hitting the native wire.

mod adapter;
mod bridge;
mod capabilities;
mod local_socket;
mod peer;
mod registry;

pub use adapter::ChannelAdapter;
pub use bridge::{BridgeAdapter, BridgeAuthenticator};
pub use capabilities::{adapt_for_channel, ChannelCapabilities};
pub use local_socket::{read_frame, write_frame, LocalSocketChannel, MAX_FRAME_BYTES};
pub use peer::PeerChannel;
pub use registry::ChannelRegistry;
