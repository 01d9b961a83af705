use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A contiguous slice of document text. The same UUID identifies the graph
/// node and the vector point; neither may exist without the other once
/// ingestion has completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub tenant_key: String,
    pub position: i64,
    pub text: String,
}

/// How a retrieved chunk was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMethod {
    Vector,
    Graph,
    Hybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub filename: String,
    pub text: String,
    pub score: f32,
    pub method: RetrievalMethod,
    /// Entity names that matched on the graph path, when any.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub matched_entities: Vec<String>,
}

/// One entity edge surfaced by multi-hop expansion, annotated with how far
/// from the seed chunk it was found (1 or 2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphContext {
    pub chunk_id: Uuid,
    pub source_entity: String,
    pub edge_type: String,
    pub target_entity: String,
    pub hop: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub document_id: Uuid,
    pub chunk_id: Uuid,
    pub filename: String,
    pub excerpt: String,
}

impl Citation {
    /// Citations come from retrieved chunks only; the excerpt is clamped at a
    /// character boundary so it never splits a UTF-8 sequence.
    pub fn from_chunk(chunk: &RetrievedChunk, excerpt_max_chars: usize) -> Self {
        let excerpt: String = chunk.text.chars().take(excerpt_max_chars).collect();
        Self {
            document_id: chunk.document_id,
            chunk_id: chunk.id,
            filename: chunk.filename.clone(),
            excerpt,
        }
    }
}
