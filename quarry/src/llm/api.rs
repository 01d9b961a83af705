use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionRequestMessage, CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs, CreateChatCompletionResponse, ResponseFormat,
    },
    Client,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;

use crate::config::LlmConfig;
use crate::error::{QuarryError, Result};

use super::provider::{Completion, CompletionOptions, LanguageModel, TokenStream};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Chat-completion client for any OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct OpenAiLlm {
    client: Client<OpenAIConfig>,
    model: String,
    max_retries: u32,
    supports_logprobs: bool,
}

impl OpenAiLlm {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| OPENAI_BASE_URL.to_string());

        let openai_config = OpenAIConfig::new()
            .with_api_base(base_url)
            .with_api_key(config.api_key.clone().unwrap_or_default());

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| QuarryError::Llm(format!("Failed to create LLM HTTP client: {error}")))?;

        // Cap async-openai's internal backoff at our own timeout; its default
        // max_elapsed_time retries 5xx responses for up to 15 minutes.
        let backoff = backoff::ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(config.timeout_secs)),
            ..Default::default()
        };

        let client = Client::with_config(openai_config)
            .with_http_client(http_client)
            .with_backoff(backoff);

        Ok(Self {
            client,
            model: config.model.clone(),
            max_retries: config.max_retries,
            supports_logprobs: config.supports_logprobs,
        })
    }

    fn build_messages(
        system: Option<&str>,
        prompt: &str,
    ) -> Result<Vec<ChatCompletionRequestMessage>> {
        let mut messages = Vec::new();

        if let Some(system) = system.filter(|value| !value.trim().is_empty()) {
            messages.push(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system)
                    .build()
                    .map_err(|error| {
                        QuarryError::Validation(format!("Invalid system prompt: {error}"))
                    })?
                    .into(),
            );
        }

        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()
                .map_err(|error| QuarryError::Validation(format!("Invalid user prompt: {error}")))?
                .into(),
        );

        Ok(messages)
    }

    fn build_request(
        &self,
        system: Option<&str>,
        prompt: &str,
        options: &CompletionOptions,
        json_mode: bool,
        streaming: bool,
    ) -> Result<CreateChatCompletionRequest> {
        let messages = Self::build_messages(system, prompt)?;

        let mut request = CreateChatCompletionRequestArgs::default();
        request.model(self.model.clone()).messages(messages);

        if let Some(temperature) = options.temperature {
            request.temperature(temperature);
        }
        if let Some(max_tokens) = options.max_tokens {
            request.max_tokens(max_tokens);
        }
        if options.logprobs && self.supports_logprobs && !json_mode {
            request.logprobs(true);
        }
        if json_mode {
            request.response_format(ResponseFormat::JsonObject);
        }
        if streaming {
            request.stream(true);
        }

        request
            .build()
            .map_err(|error| QuarryError::Llm(format!("Failed to build request: {error}")))
    }

    fn extract_completion(response: CreateChatCompletionResponse) -> Result<Completion> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| QuarryError::Llm("Provider returned no choices".to_string()))?;

        let text = choice
            .message
            .content
            .ok_or_else(|| QuarryError::Llm("Provider returned empty content".to_string()))?;

        let logprobs = choice.logprobs.and_then(|lp| lp.content).map(|tokens| {
            tokens
                .into_iter()
                .map(|token| token.logprob as f32)
                .collect()
        });

        Ok(Completion { text, logprobs })
    }

    async fn complete_with_retry(
        &self,
        request_builder: impl Fn() -> Result<CreateChatCompletionRequest>,
    ) -> Result<Completion> {
        let mut last_error: Option<QuarryError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay_ms = 100 * 2_u64.pow(attempt - 1);
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }

            let request = request_builder()?;
            match self.client.chat().create(request).await {
                Ok(response) => return Self::extract_completion(response),
                Err(error) => {
                    let mapped = QuarryError::Llm(format!("Completion failed: {error}"));
                    if attempt < self.max_retries {
                        last_error = Some(mapped);
                        continue;
                    }
                    return Err(mapped);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| QuarryError::Llm("LLM completion failed after retries".to_string())))
    }
}

#[async_trait]
impl LanguageModel for OpenAiLlm {
    async fn complete(
        &self,
        system: Option<&str>,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<Completion> {
        if prompt.trim().is_empty() {
            return Err(QuarryError::Validation("Prompt cannot be empty".to_string()));
        }

        self.complete_with_retry(|| self.build_request(system, prompt, options, false, false))
            .await
    }

    async fn complete_json(&self, prompt: &str, options: &CompletionOptions) -> Result<Value> {
        if prompt.trim().is_empty() {
            return Err(QuarryError::Validation("Prompt cannot be empty".to_string()));
        }

        let completion = self
            .complete_with_retry(|| self.build_request(None, prompt, options, true, false))
            .await?;

        serde_json::from_str(&completion.text).map_err(|e| {
            tracing::warn!(
                response_len = completion.text.len(),
                error = %e,
                "LLM returned unparseable JSON"
            );
            QuarryError::Llm(format!("Failed to parse JSON response: {e}"))
        })
    }

    async fn stream(
        &self,
        system: Option<&str>,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<TokenStream> {
        if prompt.trim().is_empty() {
            return Err(QuarryError::Validation("Prompt cannot be empty".to_string()));
        }

        let request = self.build_request(system, prompt, options, false, true)?;
        let stream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(|error| QuarryError::Llm(format!("Failed to open stream: {error}")))?;

        let tokens = stream.filter_map(|item| async move {
            match item {
                Ok(response) => response
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.delta.content)
                    .filter(|content| !content.is_empty())
                    .map(Ok),
                Err(error) => Some(Err(QuarryError::Llm(format!("Stream error: {error}")))),
            }
        });

        Ok(Box::pin(tokens))
    }

    fn supports_logprobs(&self) -> bool {
        self.supports_logprobs
    }
}
