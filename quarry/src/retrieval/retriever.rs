use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::config::RetrievalConfig;
use crate::db::{DatabaseBackend, GraphChunkHit, VectorHit, DOCUMENTS_COLLECTION};
use crate::embeddings::Embedder;
use crate::error::Result;
use crate::llm::{prompts, CompletionOptions, LanguageModel};
use crate::models::{GraphContext, Principal, RetrievalMethod, RetrievedChunk};

#[derive(Debug, Clone, Copy, Default)]
pub struct RetrievalOptions {
    /// Attach bounded multi-hop entity context to the chosen chunks.
    pub include_graph: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RetrievalOutput {
    pub chunks: Vec<RetrievedChunk>,
    pub graph_context: Vec<GraphContext>,
}

/// Candidate with the position kept around for deterministic tie-breaking.
struct Candidate {
    chunk: RetrievedChunk,
    position: i64,
}

/// Hybrid retrieval: vector similarity and graph entity lookup run in
/// parallel; results are merged with a boost for chunks both paths agree
/// on. The graph path is strictly best-effort.
#[derive(Clone)]
pub struct Retriever {
    db: Arc<dyn DatabaseBackend>,
    embedder: Arc<dyn Embedder>,
    llm: Option<Arc<dyn LanguageModel>>,
    config: RetrievalConfig,
    shared_sentinel: String,
}

impl Retriever {
    pub fn new(
        db: Arc<dyn DatabaseBackend>,
        embedder: Arc<dyn Embedder>,
        llm: Option<Arc<dyn LanguageModel>>,
        config: RetrievalConfig,
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

    pub async fn retrieve(
        &self,
        principal: &Principal,
        query: &str,
        k: usize,
        opts: RetrievalOptions,
    ) -> Result<RetrievalOutput> {
        self.retrieve_inner(principal, query, None, k, opts).await
    }

    /// Document-scoped variant. The tenant filter still applies: ids the
    /// principal cannot see simply yield nothing.
    pub async fn retrieve_for(
        &self,
        principal: &Principal,
        query: &str,
        document_ids: &[Uuid],
        k: usize,
        opts: RetrievalOptions,
    ) -> Result<RetrievalOutput> {
        self.retrieve_inner(principal, query, Some(document_ids), k, opts)
            .await
    }

    async fn retrieve_inner(
        &self,
        principal: &Principal,
        query: &str,
        document_ids: Option<&[Uuid]>,
        k: usize,
        opts: RetrievalOptions,
    ) -> Result<RetrievalOutput> {
        let k = k.max(1);
        let tenant_keys = principal.visible_tenant_keys(&self.shared_sentinel);
        let embedding = self.embedder.embed_one(query).await?;

        let vector_fut = self.db.search(
            DOCUMENTS_COLLECTION,
            &embedding,
            k as u32,
            &tenant_keys,
            document_ids,
        );
        let graph_fut = self.graph_lookup(query, &tenant_keys, k);

        let (vector_result, graph_hits) = tokio::join!(vector_fut, graph_fut);
        let vector_hits = vector_result?;

        let mut candidates = self
            .merge(vector_hits, graph_hits, document_ids)
            .await?;

        candidates.sort_by(|a, b| {
            b.chunk
                .score
                .partial_cmp(&a.chunk.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.document_id.cmp(&b.chunk.document_id))
                .then_with(|| a.position.cmp(&b.position))
        });
        candidates.truncate(k);

        let chunks: Vec<RetrievedChunk> = candidates.into_iter().map(|c| c.chunk).collect();

        let mut graph_context = Vec::new();
        if opts.include_graph {
            for chunk in &chunks {
                match self
                    .db
                    .entity_context_for_chunk(
                        chunk.id,
                        &tenant_keys,
                        self.config.max_edges_per_chunk as u32,
                    )
                    .await
                {
                    Ok(edges) => graph_context.extend(edges),
                    Err(error) => {
                        tracing::warn!(chunk_id = %chunk.id, error = %error, "Graph expansion failed");
                    }
                }
            }
        }

        Ok(RetrievalOutput {
            chunks,
            graph_context,
        })
    }

    /// Entity lookup on the graph path. Every failure mode (no LLM, budget
    /// exceeded, parse error, graph unavailable) degrades to an empty list.
    async fn graph_lookup(
        &self,
        query: &str,
        tenant_keys: &[String],
        k: usize,
    ) -> Vec<GraphChunkHit> {
        let Some(llm) = &self.llm else {
            return Vec::new();
        };

        let budget = Duration::from_millis(self.config.graph_budget_ms);
        let prompt = prompts::entity_extraction_prompt(query);

        let response = match tokio::time::timeout(
            budget,
            llm.complete_json(&prompt, &CompletionOptions::default()),
        )
        .await
        {
            Ok(Ok(value)) => value,
            Ok(Err(error)) => {
                tracing::warn!(error = %error, "Entity extraction failed; vector-only retrieval");
                return Vec::new();
            }
            Err(_) => {
                tracing::warn!("Entity extraction exceeded budget; vector-only retrieval");
                return Vec::new();
            }
        };

        let names: Vec<String> = response["entities"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        if names.is_empty() {
            return Vec::new();
        }

        match self
            .db
            .chunks_by_entities(tenant_keys, &names, k as u32)
            .await
        {
            Ok(hits) => hits,
            Err(error) => {
                tracing::warn!(error = %error, "Graph lookup failed; vector-only retrieval");
                Vec::new()
            }
        }
    }

    async fn merge(
        &self,
        vector_hits: Vec<VectorHit>,
        graph_hits: Vec<GraphChunkHit>,
        document_filter: Option<&[Uuid]>,
    ) -> Result<Vec<Candidate>> {
        let mut filenames: HashMap<Uuid, String> = HashMap::new();
        let mut by_id: HashMap<Uuid, Candidate> = HashMap::new();

        for hit in vector_hits {
            let Some(document_id) = hit.document_id else {
                continue;
            };
            let filename = self.filename_for(&mut filenames, document_id).await?;
            by_id.insert(
                hit.id,
                Candidate {
                    chunk: RetrievedChunk {
                        id: hit.id,
                        document_id,
                        filename,
                        text: hit.text,
                        score: hit.score,
                        method: RetrievalMethod::Vector,
                        matched_entities: Vec::new(),
                    },
                    position: hit.position.unwrap_or(0),
                },
            );
        }

        for hit in graph_hits {
            if let Some(filter) = document_filter {
                if !filter.contains(&hit.chunk.document_id) {
                    continue;
                }
            }

            match by_id.get_mut(&hit.chunk.id) {
                Some(existing) => {
                    // Found by both paths: boost and retag as hybrid.
                    existing.chunk.score *= self.config.hybrid_boost;
                    existing.chunk.method = RetrievalMethod::Hybrid;
                    for entity in hit.matched_entities {
                        if !existing.chunk.matched_entities.contains(&entity) {
                            existing.chunk.matched_entities.push(entity);
                        }
                    }
                }
                None => {
                    by_id.insert(
                        hit.chunk.id,
                        Candidate {
                            chunk: RetrievedChunk {
                                id: hit.chunk.id,
                                document_id: hit.chunk.document_id,
                                filename: hit.filename,
                                text: hit.chunk.text,
                                score: self.config.graph_base_score,
                                method: RetrievalMethod::Graph,
                                matched_entities: hit.matched_entities,
                            },
                            position: hit.chunk.position,
                        },
                    );
                }
            }
        }

        Ok(by_id.into_values().collect())
    }

    async fn filename_for(
        &self,
        cache: &mut HashMap<Uuid, String>,
        document_id: Uuid,
    ) -> Result<String> {
        if let Some(filename) = cache.get(&document_id) {
            return Ok(filename.clone());
        }

        let filename = self
            .db
            .get_document(document_id)
            .await?
            .map(|doc| doc.filename)
            .unwrap_or_default();
        cache.insert(document_id, filename.clone());
        Ok(filename)
    }
}
