//! LLM backend seam: a stateless "given prompt, return text" capability.
//! The gateway only depends on the trait; backends are external collaborators.

mod ollama;

pub use ollama::OllamaClient;

use crate::error::LlmError;
use async_trait::async_trait;

/// Stateless text-generation backend.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}
