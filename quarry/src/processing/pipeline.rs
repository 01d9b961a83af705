use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::ProcessingConfig;
use crate::db::{DatabaseBackend, VectorPoint, DOCUMENTS_COLLECTION};
use crate::embeddings::Embedder;
use crate::error::{QuarryError, Result};
use crate::generation::Generator;
use crate::llm::{prompts, CompletionOptions, LanguageModel};
use crate::models::{Chunk, Document, FileType, IngestStage, SummaryFormat};

use super::chunker::SemanticChunker;
use super::extractors::TextExtractor;
use super::tasks::TaskTracker;

/// Cap on how much document text is handed to the LLM for summaries and
/// entity extraction.
const LLM_CONTEXT_CHARS: usize = 8000;
const ENTITY_PASS_TIMEOUT: Duration = Duration::from_secs(15);

/// Staged ingestion: extract, chunk, embed, dual-write, summarize. The
/// caller gets the document id immediately; everything else happens on a
/// background worker whose progress is visible through the task tracker.
#[derive(Clone)]
pub struct Ingestor {
    db: Arc<dyn DatabaseBackend>,
    embedder: Arc<dyn Embedder>,
    llm: Option<Arc<dyn LanguageModel>>,
    generator: Generator,
    extractor: Arc<dyn TextExtractor>,
    chunker: SemanticChunker,
    tasks: TaskTracker,
    max_upload_bytes: usize,
    cancel: CancellationToken,
}

impl Ingestor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<dyn DatabaseBackend>,
        embedder: Arc<dyn Embedder>,
        llm: Option<Arc<dyn LanguageModel>>,
        generator: Generator,
        extractor: Arc<dyn TextExtractor>,
        tasks: TaskTracker,
        config: &ProcessingConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            db,
            embedder,
            llm,
            generator,
            extractor,
            chunker: SemanticChunker::new(config),
            tasks,
            max_upload_bytes: config.max_upload_bytes,
            cancel,
        }
    }

    pub fn tasks(&self) -> &TaskTracker {
        &self.tasks
    }

    /// Validate the upload, record the document, and kick off the background
    /// pipeline. Returns the new document id.
    pub async fn ingest(
        &self,
        tenant_key: &str,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<Uuid> {
        let file_type = FileType::from_filename(filename).ok_or_else(|| {
            QuarryError::Validation("Only .pdf and .docx uploads are supported".into())
        })?;

        if bytes.is_empty() {
            return Err(QuarryError::Validation("Upload is empty".into()));
        }
        if bytes.len() > self.max_upload_bytes {
            return Err(QuarryError::Validation(format!(
                "Upload exceeds the {} byte limit",
                self.max_upload_bytes
            )));
        }

        let document = Document::new(
            tenant_key.to_string(),
            filename.to_string(),
            file_type,
            bytes.len() as u64,
        );
        self.db.create_document(&document).await?;
        let document_id = document.id;
        self.tasks.create(document_id);

        let ingestor = self.clone();
        tokio::spawn(async move {
            if let Err(error) = ingestor.run(document, bytes).await {
                tracing::error!(doc_id = %document_id, error = %error, "Ingestion failed");
                ingestor.fail_and_clean(document_id, &error.to_string()).await;
            }
        });

        Ok(document_id)
    }

    async fn run(&self, document: Document, bytes: Vec<u8>) -> Result<()> {
        let doc_id = document.id;

        // Extract ---------------------------------------------------------
        self.checkpoint(doc_id, IngestStage::Extracting, "extracting text")?;
        let text = self.extractor.extract(document.file_type, &bytes)?;
        if text.trim().is_empty() {
            return Err(QuarryError::Validation(
                "Document contains no extractable text".into(),
            ));
        }

        // Chunk -----------------------------------------------------------
        self.checkpoint(doc_id, IngestStage::Chunking, "chunking")?;
        let pieces = self.chunker.chunk(&text);
        let chunks: Vec<Chunk> = pieces
            .into_iter()
            .enumerate()
            .map(|(position, text)| Chunk {
                id: Uuid::new_v4(),
                document_id: doc_id,
                tenant_key: document.tenant_key.clone(),
                position: position as i64,
                text,
            })
            .collect();
        if chunks.is_empty() {
            return Err(QuarryError::Validation(
                "Document produced no chunks".into(),
            ));
        }

        // Embed -----------------------------------------------------------
        self.checkpoint(doc_id, IngestStage::Embedding, "embedding chunks")?;
        if let Some(stored) = self.db.get_embedding_dimensions().await? {
            if stored != self.embedder.dimensions() {
                return Err(QuarryError::Embedding(format!(
                    "Embedder produces {} dimensions but the collection holds {}",
                    self.embedder.dimensions(),
                    stored
                )));
            }
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;

        // Index: vector first, then graph, chunk by chunk. A crash between
        // the two leaves a vector point with no graph anchor, which live
        // reads never see and the orphan sweeper removes.
        self.checkpoint(doc_id, IngestStage::Indexing, "writing dual store")?;
        for (chunk, embedding) in chunks.iter().zip(embeddings.into_iter()) {
            let point = VectorPoint {
                id: chunk.id,
                tenant_key: chunk.tenant_key.clone(),
                document_id: Some(chunk.document_id),
                position: Some(chunk.position),
                text: chunk.text.clone(),
                metadata: None,
                embedding,
                created_at: document.upload_time,
            };
            self.db.upsert_point(DOCUMENTS_COLLECTION, &point).await?;
            self.db.create_chunk(chunk).await?;
        }
        self.db
            .update_document_indexed(doc_id, chunks.len() as i64, None)
            .await?;

        // Entity graph is populated best-effort; retrieval works without it.
        self.populate_entities(&document, &text, &chunks).await;

        // Summarize -------------------------------------------------------
        self.checkpoint(doc_id, IngestStage::Summarizing, "summarizing")?;
        match self.generate_summary(&document, &text).await {
            Ok(Some(summary)) => {
                self.db
                    .update_document_indexed(doc_id, chunks.len() as i64, Some(&summary))
                    .await?;
            }
            Ok(None) => {}
            Err(error) => {
                tracing::warn!(doc_id = %doc_id, error = %error, "Summary generation failed");
            }
        }

        self.tasks.complete(doc_id);
        tracing::info!(doc_id = %doc_id, chunks = chunks.len(), "Document indexed");
        Ok(())
    }

    /// Advance the task unless a shutdown was requested between stages.
    fn checkpoint(&self, doc_id: Uuid, stage: IngestStage, message: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(QuarryError::Internal("Ingestion cancelled".into()));
        }
        self.tasks.set_stage(doc_id, stage, message);
        Ok(())
    }

    async fn generate_summary(&self, document: &Document, text: &str) -> Result<Option<String>> {
        if self.llm.is_none() {
            return Ok(None);
        }

        let content: String = text.chars().take(LLM_CONTEXT_CHARS).collect();
        let summary = self
            .generator
            .summarize(SummaryFormat::Brief, &document.filename, &content)
            .await?;
        Ok(Some(summary))
    }

    /// Extract named entities from the document and wire them into the
    /// graph. Any failure here is logged and swallowed.
    async fn populate_entities(&self, document: &Document, text: &str, chunks: &[Chunk]) {
        let Some(llm) = &self.llm else {
            return;
        };

        let content: String = text.chars().take(LLM_CONTEXT_CHARS).collect();
        let prompt = prompts::entity_extraction_prompt(&content);
        let response = match tokio::time::timeout(
            ENTITY_PASS_TIMEOUT,
            llm.complete_json(&prompt, &CompletionOptions::default()),
        )
        .await
        {
            Ok(Ok(value)) => value,
            Ok(Err(error)) => {
                tracing::warn!(doc_id = %document.id, error = %error, "Entity pass failed");
                return;
            }
            Err(_) => {
                tracing::warn!(doc_id = %document.id, "Entity pass timed out");
                return;
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

        for name in names.iter().take(32) {
            let entity_id = match self
                .db
                .upsert_entity(name, "named_entity", &document.tenant_key)
                .await
            {
                Ok(id) => id,
                Err(error) => {
                    tracing::warn!(error = %error, "Entity upsert failed");
                    continue;
                }
            };

            let needle = name.to_lowercase();
            for chunk in chunks {
                if chunk.text.to_lowercase().contains(&needle) {
                    if let Err(error) = self
                        .db
                        .link_entity_to_chunk(entity_id, chunk.id, &document.tenant_key)
                        .await
                    {
                        tracing::warn!(error = %error, "Entity link failed");
                    }
                }
            }
        }
    }

    /// Terminal failure: mark the task failed and remove everything already
    /// written, graph first, then vectors (the same cascade as delete).
    async fn fail_and_clean(&self, doc_id: Uuid, error: &str) {
        self.tasks.fail(doc_id, error);

        if let Err(cleanup_error) = self.db.delete_document_cascade(doc_id).await {
            tracing::error!(doc_id = %doc_id, error = %cleanup_error, "Cleanup of graph state failed");
        }
        if let Err(cleanup_error) = self
            .db
            .delete_by_document(DOCUMENTS_COLLECTION, doc_id)
            .await
        {
            tracing::error!(doc_id = %doc_id, error = %cleanup_error, "Cleanup of vector state failed");
        }
    }

    /// Owner-initiated delete: graph nodes go first so no graph chunk can
    /// outlive its vector twin, then the vector points.
    pub async fn delete_document(&self, doc_id: Uuid) -> Result<(u64, u64, u64)> {
        let (documents, chunks) = self.db.delete_document_cascade(doc_id).await?;
        let vectors = self
            .db
            .delete_by_document(DOCUMENTS_COLLECTION, doc_id)
            .await?;
        Ok((documents, chunks, vectors))
    }
}
