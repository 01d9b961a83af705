use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Chunk, ComparisonState, Document, GraphContext, User};

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// Payload-carrying point in a vector collection. For document chunks the id
/// equals the graph chunk node id; for memory entries `metadata` carries the
/// entry metadata and `document_id`/`position` are absent.
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: Uuid,
    pub tenant_key: String,
    pub document_id: Option<Uuid>,
    pub position: Option<i64>,
    pub text: String,
    pub metadata: Option<serde_json::Value>,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct VectorHit {
    pub id: Uuid,
    pub tenant_key: String,
    pub document_id: Option<Uuid>,
    pub position: Option<i64>,
    pub text: String,
    pub metadata: Option<serde_json::Value>,
    pub score: f32,
    pub created_at: DateTime<Utc>,
}

/// A stored point returned by scroll-style iteration (no score).
#[derive(Debug, Clone)]
pub struct ScrolledPoint {
    pub id: Uuid,
    pub tenant_key: String,
    pub text: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// A chunk surfaced through the entity graph, with the entity names that
/// matched the query.
#[derive(Debug, Clone)]
pub struct GraphChunkHit {
    pub chunk: Chunk,
    pub filename: String,
    pub matched_entities: Vec<String>,
}

// ---------------------------------------------------------------------------
// Store traits
// ---------------------------------------------------------------------------

/// Nodes and edges for User, Document, Chunk, Entity. Every query is
/// tenant-scoped and every traversal carries a LIMIT.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn create_document(&self, doc: &Document) -> Result<()>;
    async fn get_document(&self, id: Uuid) -> Result<Option<Document>>;
    /// Documents visible under any of the given tenant keys, newest first.
    async fn list_documents(
        &self,
        tenant_keys: &[String],
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Document>>;
    async fn update_document_indexed(
        &self,
        id: Uuid,
        chunk_count: i64,
        summary_cache: Option<&str>,
    ) -> Result<()>;
    async fn update_document_summary(&self, id: Uuid, summary: &str) -> Result<()>;
    /// Delete the document node, its chunk nodes, and all edges touching
    /// them. Returns (documents, chunks) removed.
    async fn delete_document_cascade(&self, id: Uuid) -> Result<(u64, u64)>;

    /// Create a Chunk node and its `(Document)-[:CONTAINS]->(Chunk)` edge.
    async fn create_chunk(&self, chunk: &Chunk) -> Result<()>;
    async fn chunk_ids_for_document(&self, document_id: Uuid) -> Result<Vec<Uuid>>;
    /// Full chunks of a document in position order (summary regeneration).
    async fn chunks_for_document(&self, document_id: Uuid) -> Result<Vec<Chunk>>;
    /// Which of the given ids exist as Chunk nodes (orphan diffing).
    async fn existing_chunk_ids(&self, ids: &[Uuid]) -> Result<Vec<Uuid>>;

    async fn upsert_entity(&self, name: &str, entity_type: &str, tenant_key: &str)
        -> Result<Uuid>;
    /// `(Entity)-[:APPEARS_IN]->(Chunk)`.
    async fn link_entity_to_chunk(&self, entity_id: Uuid, chunk_id: Uuid, tenant_key: &str)
        -> Result<()>;
    /// `(Entity)-[:RELATES_TO]->(Entity)`, optionally tagged with the memory
    /// entry that produced it.
    async fn relate_entities(
        &self,
        src: Uuid,
        dst: Uuid,
        tenant_key: &str,
        memory_id: Option<Uuid>,
    ) -> Result<()>;

    /// Chunks connected to entities whose name matches any of `names`,
    /// restricted to the visible tenant keys, capped at `limit`.
    async fn chunks_by_entities(
        &self,
        tenant_keys: &[String],
        names: &[String],
        limit: u32,
    ) -> Result<Vec<GraphChunkHit>>;

    /// Entity edges reachable from a chunk within two hops, annotated with
    /// hop distance, capped at `limit`.
    async fn entity_context_for_chunk(
        &self,
        chunk_id: Uuid,
        tenant_keys: &[String],
        limit: u32,
    ) -> Result<Vec<GraphContext>>;

    /// Remove entity edges created by a memory entry and any entity nodes
    /// left without edges. The underlying store does not cascade.
    async fn delete_memory_subgraph(&self, tenant_key: &str, memory_id: Uuid) -> Result<u64>;

    /// Create a User node mirror for the graph schema.
    async fn create_user_node(&self, user_id: Uuid, email: &str) -> Result<()>;

    /// Re-key everything owned by `from` to `to` in single statements.
    /// Returns (documents, chunks) re-keyed.
    async fn migrate_tenant(&self, from: &str, to: &str) -> Result<(u64, u64)>;

    /// Delete Document/Chunk nodes (and their edges) whose tenant key starts
    /// with `prefix` and which were created before `cutoff`. Returns
    /// (documents, chunks) removed.
    async fn reap_expired(
        &self,
        prefix: &str,
        cutoff: DateTime<Utc>,
        batch: u32,
    ) -> Result<(u64, u64)>;
}

/// ANN search with payload filters over the `documents` and `memory`
/// collections.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert_point(&self, collection: &str, point: &VectorPoint) -> Result<()>;
    async fn upsert_points(&self, collection: &str, points: &[VectorPoint]) -> Result<()>;

    /// Cosine-similarity search filtered to the given tenant keys, optionally
    /// restricted to specific documents.
    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        limit: u32,
        tenant_keys: &[String],
        document_ids: Option<&[Uuid]>,
    ) -> Result<Vec<VectorHit>>;

    async fn get_point(&self, collection: &str, id: Uuid) -> Result<Option<ScrolledPoint>>;
    async fn delete_points(&self, collection: &str, ids: &[Uuid]) -> Result<u64>;
    async fn delete_by_document(&self, collection: &str, document_id: Uuid) -> Result<u64>;

    /// Page through a tenant's points, newest first.
    async fn scroll(
        &self,
        collection: &str,
        tenant_key: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ScrolledPoint>>;

    /// Page through every point id in a collection (orphan diffing).
    async fn scroll_ids(&self, collection: &str, limit: u32, offset: u32) -> Result<Vec<Uuid>>;

    /// Re-key a tenant's points in place. Returns points re-keyed.
    async fn migrate_tenant(&self, collection: &str, from: &str, to: &str) -> Result<u64>;

    async fn count_by_tenant(&self, collection: &str, tenant_key: &str) -> Result<u64>;

    /// Delete points whose tenant key starts with `prefix` and which were
    /// created before `cutoff`.
    async fn reap_expired(
        &self,
        collection: &str,
        prefix: &str,
        cutoff: DateTime<Utc>,
        batch: u32,
    ) -> Result<u64>;
}

/// TTL'd key-value store for the token blocklist and refresh-token hashes.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn delete(&self, key: &str) -> Result<bool>;
    /// Read and delete in one step: of N concurrent callers exactly one
    /// receives the value. This is what makes refresh rotation single-use.
    async fn take(&self, key: &str) -> Result<Option<String>>;
    async fn purge_expired(&self) -> Result<u64>;
}

/// Durable snapshots for the comparison workflow.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, thread_id: &str, state: &ComparisonState) -> Result<()>;
    async fn load(&self, thread_id: &str) -> Result<Option<ComparisonState>>;
    async fn delete(&self, thread_id: &str) -> Result<bool>;
}

/// Registered accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, user: &User) -> Result<()>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>>;
}

/// Instance metadata (embedding dimensionality).
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get_embedding_dimensions(&self) -> Result<Option<usize>>;
    async fn set_embedding_dimensions(&self, dims: usize) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Unified backend supertrait
// ---------------------------------------------------------------------------

/// A complete backend combining all store traits plus lifecycle operations.
#[async_trait]
pub trait DatabaseBackend:
    GraphStore + VectorStore + KvStore + CheckpointStore + UserStore + MetadataStore
{
    /// Sync with remote (e.g. Turso replication). No-op for local backends.
    async fn sync(&self) -> Result<()>;
}
