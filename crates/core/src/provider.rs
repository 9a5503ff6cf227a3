//! Provider trait, the abstraction over the model endpoint.
//!
//! A Provider takes a fully built prompt and returns the model's raw text.
//! It never interprets that text; parsing belongs to the agent loop.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::Message;

/// One chat-completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// Model name sent to the endpoint (a local server usually ignores it)
    pub model: String,

    pub messages: Vec<Message>,

    /// Low by default: the agent wants deterministic JSON
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.2
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated text, untouched
    pub content: String,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// The model endpoint seam.
///
/// The agent loop calls `complete()` without knowing which backend answers,
/// so tests can swap in scripted providers.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g. "openai_compat").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}
