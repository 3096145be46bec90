//! Channel binding: the onboarding state machine that authenticates a
//! channel adapter before the gateway routes traffic to it.

mod context;
mod manager;
mod service_identity;

pub use context::{AuthPoll, AuthPrompt, BindingContext, BindingStatus, ChannelAuthenticator};
pub use manager::{BindingManager, BindingUi, NoopBindingUi};
pub use service_identity::{ServiceIdentity, BASELINE_PERMISSIONS};
