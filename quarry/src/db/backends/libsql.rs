use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::params;
use uuid::Uuid;

use crate::db::connection::Database;
use crate::db::repository::{
    CheckpointRepository, GraphRepository, KvRepository, UserRepository, VectorRepository,
};
use crate::db::traits::{
    CheckpointStore, DatabaseBackend, GraphChunkHit, GraphStore, KvStore, MetadataStore,
    ScrolledPoint, UserStore, VectorHit, VectorPoint, VectorStore,
};
use crate::error::Result;
use crate::models::{Chunk, ComparisonState, Document, GraphContext, User};

pub struct LibSqlBackend {
    db: Database,
}

impl LibSqlBackend {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl GraphStore for LibSqlBackend {
    async fn create_document(&self, doc: &Document) -> Result<()> {
        let conn = self.db.connect()?;
        GraphRepository::create_document(&conn, doc).await
    }
    async fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
        let conn = self.db.connect()?;
        GraphRepository::get_document(&conn, id).await
    }
    async fn list_documents(
        &self,
        tenant_keys: &[String],
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Document>> {
        let conn = self.db.connect()?;
        GraphRepository::list_documents(&conn, tenant_keys, limit, offset).await
    }
    async fn update_document_indexed(
        &self,
        id: Uuid,
        chunk_count: i64,
        summary_cache: Option<&str>,
    ) -> Result<()> {
        let conn = self.db.connect()?;
        GraphRepository::update_document_indexed(&conn, id, chunk_count, summary_cache).await
    }
    async fn update_document_summary(&self, id: Uuid, summary: &str) -> Result<()> {
        let conn = self.db.connect()?;
        GraphRepository::update_document_summary(&conn, id, summary).await
    }
    async fn delete_document_cascade(&self, id: Uuid) -> Result<(u64, u64)> {
        let conn = self.db.connect()?;
        GraphRepository::delete_document_cascade(&conn, id).await
    }
    async fn create_chunk(&self, chunk: &Chunk) -> Result<()> {
        let conn = self.db.connect()?;
        GraphRepository::create_chunk(&conn, chunk).await
    }
    async fn chunk_ids_for_document(&self, document_id: Uuid) -> Result<Vec<Uuid>> {
        let conn = self.db.connect()?;
        GraphRepository::chunk_ids_for_document(&conn, document_id).await
    }
    async fn chunks_for_document(&self, document_id: Uuid) -> Result<Vec<Chunk>> {
        let conn = self.db.connect()?;
        GraphRepository::chunks_for_document(&conn, document_id).await
    }
    async fn existing_chunk_ids(&self, ids: &[Uuid]) -> Result<Vec<Uuid>> {
        let conn = self.db.connect()?;
        GraphRepository::existing_chunk_ids(&conn, ids).await
    }
    async fn upsert_entity(
        &self,
        name: &str,
        entity_type: &str,
        tenant_key: &str,
    ) -> Result<Uuid> {
        let conn = self.db.connect()?;
        GraphRepository::upsert_entity(&conn, name, entity_type, tenant_key).await
    }
    async fn link_entity_to_chunk(
        &self,
        entity_id: Uuid,
        chunk_id: Uuid,
        tenant_key: &str,
    ) -> Result<()> {
        let conn = self.db.connect()?;
        GraphRepository::link_entity_to_chunk(&conn, entity_id, chunk_id, tenant_key).await
    }
    async fn relate_entities(
        &self,
        src: Uuid,
        dst: Uuid,
        tenant_key: &str,
        memory_id: Option<Uuid>,
    ) -> Result<()> {
        let conn = self.db.connect()?;
        GraphRepository::relate_entities(&conn, src, dst, tenant_key, memory_id).await
    }
    async fn chunks_by_entities(
        &self,
        tenant_keys: &[String],
        names: &[String],
        limit: u32,
    ) -> Result<Vec<GraphChunkHit>> {
        let conn = self.db.connect()?;
        GraphRepository::chunks_by_entities(&conn, tenant_keys, names, limit).await
    }
    async fn entity_context_for_chunk(
        &self,
        chunk_id: Uuid,
        tenant_keys: &[String],
        limit: u32,
    ) -> Result<Vec<GraphContext>> {
        let conn = self.db.connect()?;
        GraphRepository::entity_context_for_chunk(&conn, chunk_id, tenant_keys, limit).await
    }
    async fn delete_memory_subgraph(&self, tenant_key: &str, memory_id: Uuid) -> Result<u64> {
        let conn = self.db.connect()?;
        GraphRepository::delete_memory_subgraph(&conn, tenant_key, memory_id).await
    }
    async fn create_user_node(&self, user_id: Uuid, email: &str) -> Result<()> {
        let conn = self.db.connect()?;
        GraphRepository::create_user_node(&conn, user_id, email).await
    }
    async fn migrate_tenant(&self, from: &str, to: &str) -> Result<(u64, u64)> {
        let conn = self.db.connect()?;
        GraphRepository::migrate_tenant(&conn, from, to).await
    }
    async fn reap_expired(
        &self,
        prefix: &str,
        cutoff: DateTime<Utc>,
        batch: u32,
    ) -> Result<(u64, u64)> {
        let conn = self.db.connect()?;
        GraphRepository::reap_expired(&conn, prefix, cutoff, batch).await
    }
}

#[async_trait]
impl VectorStore for LibSqlBackend {
    async fn upsert_point(&self, collection: &str, point: &VectorPoint) -> Result<()> {
        let conn = self.db.connect()?;
        VectorRepository::upsert(&conn, collection, point).await
    }
    async fn upsert_points(&self, collection: &str, points: &[VectorPoint]) -> Result<()> {
        let conn = self.db.connect()?;
        VectorRepository::upsert_batch(&conn, collection, points).await
    }
    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        limit: u32,
        tenant_keys: &[String],
        document_ids: Option<&[Uuid]>,
    ) -> Result<Vec<VectorHit>> {
        let conn = self.db.connect()?;
        VectorRepository::search(&conn, collection, embedding, limit, tenant_keys, document_ids)
            .await
    }
    async fn get_point(&self, collection: &str, id: Uuid) -> Result<Option<ScrolledPoint>> {
        let conn = self.db.connect()?;
        VectorRepository::get_point(&conn, collection, id).await
    }
    async fn delete_points(&self, collection: &str, ids: &[Uuid]) -> Result<u64> {
        let conn = self.db.connect()?;
        VectorRepository::delete_points(&conn, collection, ids).await
    }
    async fn delete_by_document(&self, collection: &str, document_id: Uuid) -> Result<u64> {
        let conn = self.db.connect()?;
        VectorRepository::delete_by_document(&conn, collection, document_id).await
    }
    async fn scroll(
        &self,
        collection: &str,
        tenant_key: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ScrolledPoint>> {
        let conn = self.db.connect()?;
        VectorRepository::scroll(&conn, collection, tenant_key, limit, offset).await
    }
    async fn scroll_ids(&self, collection: &str, limit: u32, offset: u32) -> Result<Vec<Uuid>> {
        let conn = self.db.connect()?;
        VectorRepository::scroll_ids(&conn, collection, limit, offset).await
    }
    async fn migrate_tenant(&self, collection: &str, from: &str, to: &str) -> Result<u64> {
        let conn = self.db.connect()?;
        VectorRepository::migrate_tenant(&conn, collection, from, to).await
    }
    async fn count_by_tenant(&self, collection: &str, tenant_key: &str) -> Result<u64> {
        let conn = self.db.connect()?;
        VectorRepository::count_by_tenant(&conn, collection, tenant_key).await
    }
    async fn reap_expired(
        &self,
        collection: &str,
        prefix: &str,
        cutoff: DateTime<Utc>,
        batch: u32,
    ) -> Result<u64> {
        let conn = self.db.connect()?;
        VectorRepository::reap_expired(&conn, collection, prefix, cutoff, batch).await
    }
}

#[async_trait]
impl KvStore for LibSqlBackend {
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let conn = self.db.connect()?;
        KvRepository::set(&conn, key, value, ttl_secs).await
    }
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.db.connect()?;
        KvRepository::get(&conn, key).await
    }
    async fn delete(&self, key: &str) -> Result<bool> {
        let conn = self.db.connect()?;
        KvRepository::delete(&conn, key).await
    }
    async fn take(&self, key: &str) -> Result<Option<String>> {
        let conn = self.db.connect()?;
        KvRepository::take(&conn, key).await
    }
    async fn purge_expired(&self) -> Result<u64> {
        let conn = self.db.connect()?;
        KvRepository::purge_expired(&conn).await
    }
}

#[async_trait]
impl CheckpointStore for LibSqlBackend {
    async fn save(&self, thread_id: &str, state: &ComparisonState) -> Result<()> {
        let conn = self.db.connect()?;
        CheckpointRepository::save(&conn, thread_id, state).await
    }
    async fn load(&self, thread_id: &str) -> Result<Option<ComparisonState>> {
        let conn = self.db.connect()?;
        CheckpointRepository::load(&conn, thread_id).await
    }
    async fn delete(&self, thread_id: &str) -> Result<bool> {
        let conn = self.db.connect()?;
        CheckpointRepository::delete(&conn, thread_id).await
    }
}

#[async_trait]
impl UserStore for LibSqlBackend {
    async fn create_user(&self, user: &User) -> Result<()> {
        let conn = self.db.connect()?;
        UserRepository::create(&conn, user).await
    }
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.db.connect()?;
        UserRepository::get_by_email(&conn, email).await
    }
    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let conn = self.db.connect()?;
        UserRepository::get_by_id(&conn, id).await
    }
}

#[async_trait]
impl MetadataStore for LibSqlBackend {
    async fn get_embedding_dimensions(&self) -> Result<Option<usize>> {
        let conn = self.db.connect()?;
        let mut rows = conn
            .query(
                "SELECT value FROM instance_metadata WHERE key = 'embedding_dimensions'",
                (),
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get::<String>(0)?.parse().ok()),
            None => Ok(None),
        }
    }
    async fn set_embedding_dimensions(&self, dims: usize) -> Result<()> {
        let conn = self.db.connect()?;
        conn.execute(
            r#"
            INSERT INTO instance_metadata (key, value) VALUES ('embedding_dimensions', ?1)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value
            "#,
            params![dims as i64],
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl DatabaseBackend for LibSqlBackend {
    async fn sync(&self) -> Result<()> {
        self.db.sync().await
    }
}
