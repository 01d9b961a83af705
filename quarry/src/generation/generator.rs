use std::sync::Arc;

use futures::stream::Stream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::config::GenerationConfig;
use crate::error::{QuarryError, Result};
use crate::llm::{prompts, CompletionOptions, LanguageModel};
use crate::models::{Citation, GraphContext, MemoryHit, RetrievedChunk, SummaryFormat};

use super::events::{Confidence, ConfidenceLevel, StreamEvent, StreamStage};

#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<Citation>,
    pub confidence: Confidence,
}

/// Assembles prompts, runs the LLM, and extracts citations and a confidence
/// score. Streaming emits status, citations, tokens, confidence and a
/// terminal event in that order, checking cancellation between tokens.
#[derive(Clone)]
pub struct Generator {
    llm: Option<Arc<dyn LanguageModel>>,
    config: GenerationConfig,
}

impl Generator {
    pub fn new(llm: Option<Arc<dyn LanguageModel>>, config: GenerationConfig) -> Self {
        Self { llm, config }
    }

    pub fn refusal_phrase(&self) -> &str {
        &self.config.refusal_phrase
    }

    fn require_llm(&self) -> Result<&Arc<dyn LanguageModel>> {
        self.llm
            .as_ref()
            .ok_or_else(|| QuarryError::LlmUnavailable("No LLM configured".into()))
    }

    fn is_refusal(&self, text: &str) -> bool {
        text.trim().starts_with(self.config.refusal_phrase.as_str())
    }

    fn citations_for(&self, text: &str, retrieved: &[RetrievedChunk]) -> Vec<Citation> {
        if self.is_refusal(text) {
            return Vec::new();
        }
        retrieved
            .iter()
            .map(|chunk| Citation::from_chunk(chunk, self.config.excerpt_max_chars))
            .collect()
    }

    fn confidence_from(&self, score: f32) -> Confidence {
        Confidence {
            score: score.clamp(0.0, 1.0),
            level: ConfidenceLevel::from_score(
                score,
                self.config.confidence_high,
                self.config.confidence_medium,
            ),
        }
    }

    /// One-shot answer.
    pub async fn answer(
        &self,
        query: &str,
        retrieved: &[RetrievedChunk],
        graph_context: &[GraphContext],
        memories: &[MemoryHit],
    ) -> Result<Answer> {
        if retrieved.is_empty() && memories.is_empty() {
            // Nothing to answer from; the refusal is an answer, not an error.
            return Ok(Answer {
                text: self.config.refusal_phrase.clone(),
                citations: Vec::new(),
                confidence: self.confidence_from(0.0),
            });
        }

        let llm = self.require_llm()?;
        let system = prompts::answer_system_prompt(&self.config.refusal_phrase);
        let user = prompts::answer_user_prompt(query, retrieved, graph_context, memories);

        let completion = llm
            .complete(
                Some(&system),
                &user,
                &CompletionOptions {
                    logprobs: true,
                    ..Default::default()
                },
            )
            .await?;

        let score = if self.is_refusal(&completion.text) {
            0.0
        } else {
            match completion.logprobs.as_deref() {
                Some(logprobs) if !logprobs.is_empty() => logprob_confidence(logprobs),
                _ => {
                    self.rated_confidence(query, &completion.text, &user)
                        .await
                }
            }
        };

        let citations = self.citations_for(&completion.text, retrieved);

        Ok(Answer {
            text: completion.text,
            citations,
            confidence: self.confidence_from(score),
        })
    }

    /// Streaming answer. The returned stream owns its LLM connection;
    /// cancellation is checked between tokens and stops provider work
    /// within one token.
    pub fn stream_answer(
        &self,
        query: String,
        retrieved: Vec<RetrievedChunk>,
        graph_context: Vec<GraphContext>,
        memories: Vec<MemoryHit>,
        cancel: CancellationToken,
    ) -> impl Stream<Item = StreamEvent> + Send + 'static {
        let generator = self.clone();

        async_stream::stream! {
            yield StreamEvent::Status(StreamStage::Retrieving);
            yield StreamEvent::Citations(
                retrieved
                    .iter()
                    .map(|chunk| Citation::from_chunk(chunk, generator.config.excerpt_max_chars))
                    .collect(),
            );
            yield StreamEvent::Status(StreamStage::Generating);

            if retrieved.is_empty() && memories.is_empty() {
                yield StreamEvent::Token(generator.config.refusal_phrase.clone());
                yield StreamEvent::Confidence(generator.confidence_from(0.0));
                yield StreamEvent::Done;
                return;
            }

            let llm = match generator.require_llm() {
                Ok(llm) => llm.clone(),
                Err(error) => {
                    yield StreamEvent::Error(error.to_string());
                    return;
                }
            };

            let system = prompts::answer_system_prompt(&generator.config.refusal_phrase);
            let user = prompts::answer_user_prompt(&query, &retrieved, &graph_context, &memories);

            let mut tokens = match llm
                .stream(Some(&system), &user, &CompletionOptions::default())
                .await
            {
                Ok(stream) => stream,
                Err(error) => {
                    yield StreamEvent::Error(error.to_string());
                    return;
                }
            };

            let mut text = String::new();
            loop {
                if cancel.is_cancelled() {
                    tracing::debug!("Answer stream cancelled between tokens");
                    return;
                }

                let token = tokio::select! {
                    _ = cancel.cancelled() => return,
                    token = tokens.next() => token,
                };

                match token {
                    Some(Ok(token)) => {
                        text.push_str(&token);
                        yield StreamEvent::Token(token);
                    }
                    Some(Err(error)) => {
                        yield StreamEvent::Error(error.to_string());
                        return;
                    }
                    None => break,
                }
            }

            let score = generator.rated_confidence(&query, &text, &user).await;
            yield StreamEvent::Confidence(generator.confidence_from(score));
            yield StreamEvent::Done;
        }
    }

    /// Second-call confidence: the model rates context support on 0-100.
    /// Failures degrade to the medium boundary rather than failing the
    /// answer.
    async fn rated_confidence(&self, query: &str, answer: &str, context: &str) -> f32 {
        if self.is_refusal(answer) {
            return 0.0;
        }

        let Ok(llm) = self.require_llm() else {
            return self.config.confidence_medium;
        };

        let prompt = prompts::confidence_rating_prompt(query, answer, context);
        match llm.complete_json(&prompt, &CompletionOptions::default()).await {
            Ok(value) => {
                let raw = value["score"].as_f64().unwrap_or(50.0) as f32;
                (raw / 100.0).clamp(0.0, 1.0)
            }
            Err(error) => {
                tracing::warn!(error = %error, "Confidence rating failed");
                self.config.confidence_medium
            }
        }
    }

    /// Non-streaming summary used by the summary endpoint.
    pub async fn summarize(
        &self,
        format: SummaryFormat,
        filename: &str,
        content: &str,
    ) -> Result<String> {
        let llm = self.require_llm()?;
        let prompt = prompts::summary_prompt(format, filename, content);
        let completion = llm
            .complete(None, &prompt, &CompletionOptions::default())
            .await?;
        Ok(completion.text.trim().to_string())
    }
}

/// `exp(mean(logprobs))`: the geometric mean token probability.
fn logprob_confidence(logprobs: &[f32]) -> f32 {
    let mean = logprobs.iter().sum::<f32>() / logprobs.len() as f32;
    mean.exp().clamp(0.0, 1.0)
}
