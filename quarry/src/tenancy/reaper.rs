use std::sync::Arc;

use chrono::{Duration, Local, Utc};

use crate::config::{ReaperConfig, ANON_PREFIX};
use crate::db::{
    DatabaseBackend, GraphStore, KvStore, VectorStore, DOCUMENTS_COLLECTION, MEMORY_COLLECTION,
};
use crate::error::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapSummary {
    pub documents: u64,
    pub chunks: u64,
    pub vectors: u64,
    pub memories: u64,
    pub kv_entries: u64,
}

/// Daily sweep of expired anonymous data across graph, vector and memory
/// stores, plus the KV TTL backlog. Everything ingested carries a creation
/// timestamp, which is what makes this sweep indexable.
#[derive(Clone)]
pub struct Reaper {
    db: Arc<dyn DatabaseBackend>,
    config: ReaperConfig,
    ttl_days: i64,
}

impl Reaper {
    pub fn new(db: Arc<dyn DatabaseBackend>, config: ReaperConfig, ttl_days: i64) -> Self {
        Self {
            db,
            config,
            ttl_days,
        }
    }

    /// Seconds until the next configured local sweep hour.
    pub fn seconds_until_next_run(&self) -> u64 {
        let now = Local::now();
        let target_hour = self.config.hour.min(23);
        let mut next = now
            .date_naive()
            .and_hms_opt(target_hour, 0, 0)
            .unwrap_or_else(|| now.naive_local());
        if next <= now.naive_local() {
            next += Duration::days(1);
        }
        (next - now.naive_local()).num_seconds().max(60) as u64
    }

    pub async fn run_once(&self) -> Result<ReapSummary> {
        let cutoff = Utc::now() - Duration::days(self.ttl_days);
        let batch = self.config.batch_size as u32;
        let mut summary = ReapSummary::default();

        tracing::info!(cutoff = %cutoff, "Starting anonymous-data sweep");

        // Graph: expired anonymous documents cascade their chunks.
        loop {
            let (documents, chunks) =
                GraphStore::reap_expired(&*self.db, ANON_PREFIX, cutoff, batch).await?;
            summary.documents += documents;
            summary.chunks += chunks;
            if documents == 0 {
                break;
            }
        }

        // Vector: chunk points, then memory entries, in bounded batches.
        loop {
            let deleted =
                VectorStore::reap_expired(&*self.db, DOCUMENTS_COLLECTION, ANON_PREFIX, cutoff, batch)
                    .await?;
            summary.vectors += deleted;
            if deleted == 0 {
                break;
            }
        }
        loop {
            let deleted =
                VectorStore::reap_expired(&*self.db, MEMORY_COLLECTION, ANON_PREFIX, cutoff, batch)
                    .await?;
            summary.memories += deleted;
            if deleted == 0 {
                break;
            }
        }

        summary.kv_entries = KvStore::purge_expired(&*self.db).await?;

        tracing::info!(
            documents = summary.documents,
            chunks = summary.chunks,
            vectors = summary.vectors,
            memories = summary.memories,
            kv_entries = summary.kv_entries,
            "Sweep complete"
        );

        Ok(summary)
    }
}
