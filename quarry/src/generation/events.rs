use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::models::Citation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStage {
    Retrieving,
    Generating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn from_score(score: f32, high: f32, medium: f32) -> Self {
        if score >= high {
            Self::High
        } else if score >= medium {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Confidence {
    pub score: f32,
    pub level: ConfidenceLevel,
}

/// Events of an answer stream, emitted in a fixed order:
/// `status(retrieving)`, `citations`, `status(generating)`, the `token`
/// sequence, `confidence`, then exactly one of `done` or `error`.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Status(StreamStage),
    Citations(Vec<Citation>),
    Token(String),
    Confidence(Confidence),
    Done,
    Error(String),
}

impl StreamEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Status(_) => "status",
            Self::Citations(_) => "citations",
            Self::Token(_) => "token",
            Self::Confidence(_) => "confidence",
            Self::Done => "done",
            Self::Error(_) => "error",
        }
    }

    /// SSE wire form: tokens go out as plain text, everything else as JSON.
    pub fn into_sse(self) -> axum::response::sse::Event {
        let event = axum::response::sse::Event::default().event(self.name());
        match self {
            Self::Status(stage) => event.data(json!({ "stage": stage }).to_string()),
            Self::Citations(citations) => {
                event.data(serde_json::to_string(&citations).unwrap_or_else(|_| "[]".into()))
            }
            Self::Token(token) => event.data(token),
            Self::Confidence(confidence) => event.data(
                serde_json::to_string(&confidence)
                    .unwrap_or_else(|_| r#"{"score":0.0,"level":"low"}"#.into()),
            ),
            Self::Done => event.data("{}"),
            Self::Error(message) => event.data(json!({ "message": message }).to_string()),
        }
    }
}
