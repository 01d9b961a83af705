use futures::stream::BoxStream;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Ask the provider for per-token log-probabilities when it supports
    /// them; the generator falls back to a self-rating call otherwise.
    pub logprobs: bool,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub logprobs: Option<Vec<f32>>,
}

/// Token stream: each item is one content delta from the provider.
pub type TokenStream = BoxStream<'static, Result<String>>;

/// Pluggable chat-completion provider. One implementation talks to an
/// OpenAI-compatible endpoint; tests substitute deterministic doubles.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(
        &self,
        system: Option<&str>,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<Completion>;

    /// Completion constrained to a JSON object response.
    async fn complete_json(&self, prompt: &str, options: &CompletionOptions) -> Result<Value>;

    /// Streaming completion. The stream holds one connection for its
    /// lifetime; dropping it cancels the provider-side generation.
    async fn stream(
        &self,
        system: Option<&str>,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<TokenStream>;

    /// Whether `complete` can return log-probabilities.
    fn supports_logprobs(&self) -> bool;
}
