use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of one ingestion run. Stages are strictly ordered; `Failed` and
/// `Completed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStage {
    Pending,
    Extracting,
    Chunking,
    Embedding,
    Indexing,
    Summarizing,
    Completed,
    Failed,
}

impl IngestStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Nominal progress at the *start* of each stage.
    pub fn progress(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Extracting => 10,
            Self::Chunking => 30,
            Self::Embedding => 50,
            Self::Indexing => 70,
            Self::Summarizing => 90,
            Self::Completed => 100,
            Self::Failed => 100,
        }
    }
}

impl std::fmt::Display for IngestStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Extracting => "extracting",
            Self::Chunking => "chunking",
            Self::Embedding => "embedding",
            Self::Indexing => "indexing",
            Self::Summarizing => "summarizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub document_id: Uuid,
    pub stage: IngestStage,
    pub progress: u8,
    pub message: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskRecord {
    pub fn new(document_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            document_id,
            stage: IngestStage::Pending,
            progress: 0,
            message: "queued".to_string(),
            started_at: now,
            updated_at: now,
            error: None,
        }
    }
}
