use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::generation::Confidence;
use crate::models::{
    Citation, Document, MemoryEntry, MemoryKind, MigrationStats, TaskRecord,
};

// -- Auth -------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub migration: MigrationStats,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

// -- Documents --------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub document_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ListQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub filename: String,
    pub file_type: String,
    pub byte_size: u64,
    pub upload_time: chrono::DateTime<chrono::Utc>,
    pub chunk_count: i64,
}

impl From<Document> for DocumentResponse {
    fn from(doc: Document) -> Self {
        Self {
            id: doc.id,
            filename: doc.filename,
            file_type: doc.file_type.to_string(),
            byte_size: doc.byte_size,
            upload_time: doc.upload_time,
            chunk_count: doc.chunk_count,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub task: TaskRecord,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SummaryQuery {
    pub format: Option<String>,
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryResponse {
    pub document_id: Uuid,
    pub format: String,
    pub summary: String,
    pub cached: bool,
}

// -- Query ------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct QueryRequest {
    #[validate(length(min = 1, max = 4000))]
    pub query: String,
    pub k: Option<usize>,
    #[serde(default)]
    pub include_graph: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub confidence: Confidence,
}

// -- Comparison -------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CompareRequest {
    #[validate(length(min = 10, max = 4000))]
    pub query: String,
    #[validate(length(min = 2, max = 5))]
    pub document_ids: Vec<Uuid>,
    #[validate(length(min = 1, max = 128))]
    pub session_id: String,
}

// -- Memory -----------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddMemoryRequest {
    #[validate(length(min = 1, max = 8000))]
    pub text: String,
    pub kind: Option<MemoryKind>,
    pub session_id: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryResponse {
    pub id: Uuid,
    pub text: String,
    pub kind: Option<MemoryKind>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<MemoryEntry> for MemoryResponse {
    fn from(entry: MemoryEntry) -> Self {
        Self {
            id: entry.id,
            text: entry.text,
            kind: entry.metadata.kind,
            created_at: entry.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_request_validates_email() {
        let bad = RegisterRequest {
            email: "not-an-email".into(),
            password: "longenough".into(),
        };
        assert!(bad.validate().is_err());

        let good = RegisterRequest {
            email: "a@example.com".into(),
            password: "longenough".into(),
        };
        assert!(good.validate().is_ok());
    }

    #[test]
    fn compare_request_bounds_document_count() {
        let too_few = CompareRequest {
            query: "compare these documents".into(),
            document_ids: vec![Uuid::new_v4()],
            session_id: "s".into(),
        };
        assert!(too_few.validate().is_err());

        let too_many = CompareRequest {
            query: "compare these documents".into(),
            document_ids: (0..6).map(|_| Uuid::new_v4()).collect(),
            session_id: "s".into(),
        };
        assert!(too_many.validate().is_err());
    }

    #[test]
    fn compare_request_requires_long_query() {
        let short = CompareRequest {
            query: "too short".into(),
            document_ids: vec![Uuid::new_v4(), Uuid::new_v4()],
            session_id: "s".into(),
        };
        assert!(short.validate().is_err());
    }
}
