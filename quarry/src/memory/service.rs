use std::sync::Arc;

use uuid::Uuid;

use crate::config::MemoryConfig;
use crate::db::{DatabaseBackend, ScrolledPoint, VectorPoint, MEMORY_COLLECTION};
use crate::embeddings::Embedder;
use crate::error::{QuarryError, Result};
use crate::llm::{prompts, CompletionOptions, LanguageModel};
use crate::models::{MemoryEntry, MemoryHit, MemoryKind, MemoryMetadata, Principal};
use crate::processing::estimate_tokens;

const SCROLL_PAGE: u32 = 200;

/// Tenant-scoped fact and conversation memory over the `memory` vector
/// collection plus an entity sub-partition in the graph.
#[derive(Clone)]
pub struct MemoryService {
    db: Arc<dyn DatabaseBackend>,
    embedder: Arc<dyn Embedder>,
    llm: Option<Arc<dyn LanguageModel>>,
    config: MemoryConfig,
    shared_sentinel: String,
}

impl MemoryService {
    pub fn new(
        db: Arc<dyn DatabaseBackend>,
        embedder: Arc<dyn Embedder>,
        llm: Option<Arc<dyn LanguageModel>>,
        config: MemoryConfig,
        shared_sentinel: String,
    ) -> Self {
        Self {
            db,
            embedder,
            llm,
            config,
            shared_sentinel,
        }
    }

    pub async fn add(
        &self,
        tenant_key: &str,
        text: &str,
        metadata: MemoryMetadata,
    ) -> Result<MemoryEntry> {
        if text.trim().is_empty() {
            return Err(QuarryError::Validation("Memory text cannot be empty".into()));
        }

        let entry = MemoryEntry::new(tenant_key.to_string(), text.to_string(), metadata);
        let embedding = self.embedder.embed_one(&entry.text).await?;

        let point = VectorPoint {
            id: entry.id,
            tenant_key: entry.tenant_key.clone(),
            document_id: None,
            position: None,
            text: entry.text.clone(),
            metadata: Some(serde_json::to_value(&entry.metadata)?),
            embedding,
            created_at: entry.created_at,
        };
        self.db.upsert_point(MEMORY_COLLECTION, &point).await?;

        self.index_entities(&entry).await;

        if let Err(error) = self.maybe_summarize(tenant_key).await {
            tracing::warn!(tenant = %tenant_key, error = %error, "Memory summarization failed");
        }

        Ok(entry)
    }

    /// Admin-only write under the shared sentinel.
    pub async fn add_shared(
        &self,
        principal: &Principal,
        text: &str,
        mut metadata: MemoryMetadata,
    ) -> Result<MemoryEntry> {
        if !principal.is_admin() {
            return Err(QuarryError::Forbidden(
                "Shared memory is writable by admins only".into(),
            ));
        }
        metadata.kind = Some(MemoryKind::Shared);
        let sentinel = self.shared_sentinel.clone();
        self.add(&sentinel, text, metadata).await
    }

    pub async fn search(&self, tenant_key: &str, query: &str, k: usize) -> Result<Vec<MemoryHit>> {
        self.search_keys(&[tenant_key.to_string()], query, k).await
    }

    /// Union of private and shared memory for authenticated principals;
    /// private only for anonymous ones.
    pub async fn search_with_shared(
        &self,
        principal: &Principal,
        query: &str,
        k: usize,
    ) -> Result<Vec<MemoryHit>> {
        let keys = principal.visible_tenant_keys(&self.shared_sentinel);
        self.search_keys(&keys, query, k).await
    }

    async fn search_keys(
        &self,
        tenant_keys: &[String],
        query: &str,
        k: usize,
    ) -> Result<Vec<MemoryHit>> {
        let embedding = self.embedder.embed_one(query).await?;
        let hits = self
            .db
            .search(MEMORY_COLLECTION, &embedding, k.max(1) as u32, tenant_keys, None)
            .await?;

        Ok(hits
            .into_iter()
            .map(|hit| {
                let shared = hit.tenant_key == self.shared_sentinel;
                let metadata = hit
                    .metadata
                    .and_then(|m| serde_json::from_value(m).ok())
                    .unwrap_or_default();
                MemoryHit {
                    entry: MemoryEntry {
                        id: hit.id,
                        tenant_key: hit.tenant_key,
                        text: hit.text,
                        metadata,
                        created_at: hit.created_at,
                    },
                    score: hit.score,
                    shared,
                }
            })
            .collect())
    }

    pub async fn list(&self, tenant_key: &str, limit: u32) -> Result<Vec<MemoryEntry>> {
        let points = self
            .db
            .scroll(MEMORY_COLLECTION, tenant_key, limit.clamp(1, 500), 0)
            .await?;
        Ok(points.into_iter().map(point_to_entry).collect())
    }

    /// Delete one entry: the vector point and the entity edges it created.
    /// The graph side is explicit because the store does not cascade.
    pub async fn delete(&self, tenant_key: &str, id: Uuid) -> Result<()> {
        let point = self
            .db
            .get_point(MEMORY_COLLECTION, id)
            .await?
            .filter(|p| p.tenant_key == tenant_key)
            .ok_or_else(|| QuarryError::NotFound(format!("Memory {id} not found")))?;

        self.db.delete_points(MEMORY_COLLECTION, &[point.id]).await?;
        self.db.delete_memory_subgraph(tenant_key, id).await?;
        Ok(())
    }

    pub async fn delete_shared(&self, principal: &Principal, id: Uuid) -> Result<()> {
        if !principal.is_admin() {
            return Err(QuarryError::Forbidden(
                "Shared memory is writable by admins only".into(),
            ));
        }
        let sentinel = self.shared_sentinel.clone();
        self.delete(&sentinel, id).await
    }

    pub async fn list_shared(&self, principal: &Principal, limit: u32) -> Result<Vec<MemoryEntry>> {
        if !principal.is_admin() {
            return Err(QuarryError::Forbidden(
                "Shared memory is listable by admins only".into(),
            ));
        }
        let sentinel = self.shared_sentinel.clone();
        self.list(&sentinel, limit).await
    }

    /// Wire naive entity pairs into the graph, tagged with the memory id so
    /// deletion can find them again. Best-effort.
    async fn index_entities(&self, entry: &MemoryEntry) {
        let names = extract_entity_names(&entry.text);
        if names.len() < 2 {
            return;
        }

        let mut ids = Vec::new();
        for name in names.iter().take(8) {
            match self
                .db
                .upsert_entity(name, "memory_entity", &entry.tenant_key)
                .await
            {
                Ok(id) => ids.push(id),
                Err(error) => {
                    tracing::warn!(error = %error, "Memory entity upsert failed");
                    return;
                }
            }
        }

        for pair in ids.windows(2) {
            if let Err(error) = self
                .db
                .relate_entities(pair[0], pair[1], &entry.tenant_key, Some(entry.id))
                .await
            {
                tracing::warn!(error = %error, "Memory entity relation failed");
            }
        }
    }

    /// Fold old entries into one historical summary once the tenant's
    /// estimated token usage crosses the watermark. The newest entries and
    /// existing summaries are left alone.
    async fn maybe_summarize(&self, tenant_key: &str) -> Result<()> {
        let Some(llm) = &self.llm else {
            return Ok(());
        };

        let entries = self.scroll_all(tenant_key).await?;
        let total_tokens: usize = entries.iter().map(|e| estimate_tokens(&e.text)).sum();
        let threshold =
            (self.config.max_context_tokens as f32 * self.config.summarize_watermark) as usize;
        if total_tokens <= threshold {
            return Ok(());
        }

        // Entries arrive newest first; fold everything after the keep window
        // that is not itself a summary.
        let foldable: Vec<&MemoryEntry> = entries
            .iter()
            .skip(self.config.keep_recent)
            .filter(|e| !e.is_summary())
            .collect();
        if foldable.len() < 2 {
            return Ok(());
        }

        let texts: Vec<&str> = foldable.iter().map(|e| e.text.as_str()).collect();
        let prompt = prompts::memory_summarize_prompt(&texts);
        let completion = llm
            .complete(None, &prompt, &CompletionOptions::default())
            .await?;

        let mut summary_text = completion.text.trim().to_string();
        if !summary_text.starts_with("[Historical Summary]") {
            summary_text = format!("[Historical Summary] {summary_text}");
        }

        let embedding = self.embedder.embed_one(&summary_text).await?;
        let summary = MemoryEntry::new(
            tenant_key.to_string(),
            summary_text,
            MemoryMetadata {
                kind: Some(MemoryKind::Fact),
                ..Default::default()
            },
        );
        self.db
            .upsert_point(
                MEMORY_COLLECTION,
                &VectorPoint {
                    id: summary.id,
                    tenant_key: summary.tenant_key.clone(),
                    document_id: None,
                    position: None,
                    text: summary.text.clone(),
                    metadata: Some(serde_json::to_value(&summary.metadata)?),
                    embedding,
                    created_at: summary.created_at,
                },
            )
            .await?;

        for entry in foldable {
            self.db.delete_points(MEMORY_COLLECTION, &[entry.id]).await?;
            self.db.delete_memory_subgraph(tenant_key, entry.id).await?;
        }

        tracing::info!(tenant = %tenant_key, "Folded old memories into a historical summary");
        Ok(())
    }

    async fn scroll_all(&self, tenant_key: &str) -> Result<Vec<MemoryEntry>> {
        let mut entries = Vec::new();
        let mut offset = 0u32;
        loop {
            let page = self
                .db
                .scroll(MEMORY_COLLECTION, tenant_key, SCROLL_PAGE, offset)
                .await?;
            let len = page.len();
            entries.extend(page.into_iter().map(point_to_entry));
            if len < SCROLL_PAGE as usize {
                break;
            }
            offset += SCROLL_PAGE;
        }
        Ok(entries)
    }
}

fn point_to_entry(point: ScrolledPoint) -> MemoryEntry {
    let metadata: MemoryMetadata = point
        .metadata
        .and_then(|m| serde_json::from_value(m).ok())
        .unwrap_or_default();
    MemoryEntry {
        id: point.id,
        tenant_key: point.tenant_key,
        text: point.text,
        metadata,
        created_at: point.created_at,
    }
}

/// Naive named-entity heuristic for the memory sub-partition: runs of
/// capitalized words, skipping sentence-initial position.
fn extract_entity_names(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut sentence_start = true;

    for word in text.split_whitespace() {
        let cleaned = word.trim_matches(|c: char| !c.is_alphanumeric());
        let capitalized = cleaned.chars().next().is_some_and(|c| c.is_uppercase());

        if capitalized && !(sentence_start && current.is_empty()) {
            current.push(cleaned);
        } else {
            if !current.is_empty() {
                let name = current.join(" ");
                if name.len() > 2 && !names.contains(&name) {
                    names.push(name);
                }
            }
            current.clear();
        }

        sentence_start = word.ends_with(['.', '!', '?']);
    }

    if !current.is_empty() {
        let name = current.join(" ");
        if name.len() > 2 && !names.contains(&name) {
            names.push(name);
        }
    }

    names
}
