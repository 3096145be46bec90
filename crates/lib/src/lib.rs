//! Ponte core library: canonical message model, gateway/router, channel
//! adapters, and the channel binding manager, shared by the CLI.

pub mod address;
pub mod binding;
pub mod channels;
pub mod config;
pub mod error;
pub mod gateway;
pub mod llm;
pub mod message;
pub mod session;
pub mod telemetry;
