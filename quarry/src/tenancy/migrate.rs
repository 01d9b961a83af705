use std::sync::Arc;

use crate::db::{
    DatabaseBackend, GraphStore, VectorStore, DOCUMENTS_COLLECTION, MEMORY_COLLECTION,
};
use crate::error::Result;
use crate::models::MigrationStats;

/// Re-keys every record owned by an anonymous session to a freshly
/// registered user. Runs synchronously inside registration, before the
/// success response.
///
/// Sections run in value order and are individually best-effort: a failure
/// is logged and the remaining sections still run, so the most valuable
/// data (the graph) is always migrated first.
#[derive(Clone)]
pub struct Migrator {
    db: Arc<dyn DatabaseBackend>,
}

impl Migrator {
    pub fn new(db: Arc<dyn DatabaseBackend>) -> Self {
        Self { db }
    }

    pub async fn migrate(&self, anon_id: &str, user_id: &str) -> Result<MigrationStats> {
        let mut stats = MigrationStats::default();

        // Graph: single re-key statements over nodes and edges.
        match GraphStore::migrate_tenant(&*self.db, anon_id, user_id).await {
            Ok((documents, chunks)) => {
                stats.documents = documents;
                stats.chunks = chunks;
            }
            Err(error) => {
                tracing::error!(anon = %anon_id, error = %error, "Graph migration failed");
            }
        }

        // Vector: re-key the documents collection payloads.
        match VectorStore::migrate_tenant(&*self.db, DOCUMENTS_COLLECTION, anon_id, user_id).await
        {
            Ok(vectors) => stats.vectors = vectors,
            Err(error) => {
                tracing::error!(anon = %anon_id, error = %error, "Vector migration failed");
            }
        }

        // Memory: re-key the memory collection payloads.
        match VectorStore::migrate_tenant(&*self.db, MEMORY_COLLECTION, anon_id, user_id).await {
            Ok(memories) => stats.memories = memories,
            Err(error) => {
                tracing::error!(anon = %anon_id, error = %error, "Memory migration failed");
            }
        }

        tracing::info!(
            anon = %anon_id,
            user = %user_id,
            documents = stats.documents,
            chunks = stats.chunks,
            vectors = stats.vectors,
            memories = stats.memories,
            "Anonymous session migrated"
        );

        Ok(stats)
    }
}
