use axum::{
    extract::{Extension, Multipart, Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::api::state::AppState;
use crate::api::v1::dto::{
    DocumentResponse, ListQuery, StatusResponse, SummaryQuery, SummaryResponse, UploadResponse,
};
use crate::error::{QuarryError, Result};
use crate::models::{Document, IngestStage, Principal, SummaryFormat, TaskRecord};

/// Upload a PDF/DOCX. Returns the document id immediately; ingestion runs
/// in the background and is observable via the status endpoint.
pub async fn upload(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| QuarryError::Validation(format!("Malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .ok_or_else(|| QuarryError::Validation("Upload is missing a filename".into()))?
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| QuarryError::Validation(format!("Failed to read upload: {e}")))?;
        upload = Some((filename, bytes.to_vec()));
        break;
    }

    let (filename, bytes) =
        upload.ok_or_else(|| QuarryError::Validation("Missing 'file' field".into()))?;

    let document_id = state
        .ingestor
        .ingest(&principal.tenant_key(), &filename, bytes)
        .await?;

    Ok(Json(UploadResponse { document_id }))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<DocumentResponse>>> {
    let keys = principal.visible_tenant_keys(&state.config.shared_sentinel);
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let offset = query.offset.unwrap_or(0);

    let documents = state.db.list_documents(&keys, limit, offset).await?;
    Ok(Json(documents.into_iter().map(Into::into).collect()))
}

/// Fetch a document the principal can see. Invisible and nonexistent are
/// indistinguishable to prevent id enumeration.
async fn visible_document(
    state: &AppState,
    principal: &Principal,
    id: Uuid,
) -> Result<Document> {
    let document = state
        .db
        .get_document(id)
        .await?
        .ok_or_else(|| QuarryError::NotFound(format!("Document {id} not found")))?;

    let visible = document.tenant_key == principal.tenant_key()
        || (document.tenant_key == state.config.shared_sentinel && principal.can_read_shared());
    if !visible {
        return Err(QuarryError::NotFound(format!("Document {id} not found")));
    }
    Ok(document)
}

pub async fn get(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<DocumentResponse>> {
    let document = visible_document(&state, &principal, id).await?;
    Ok(Json(document.into()))
}

pub async fn status(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<StatusResponse>> {
    // The task record may outlive a failed document (a failed ingest
    // cascades its document away), so check the tracker first.
    if let Some(task) = state.ingestor.tasks().get(id) {
        return Ok(Json(StatusResponse { task }));
    }

    let document = visible_document(&state, &principal, id).await?;
    // No live task: the document finished before this process restarted.
    let mut task = TaskRecord::new(document.id);
    task.stage = IngestStage::Completed;
    task.progress = IngestStage::Completed.progress();
    task.message = "indexed".into();
    Ok(Json(StatusResponse { task }))
}

/// Owner-only cascade delete.
pub async fn delete(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    let document = visible_document(&state, &principal, id).await?;
    if document.tenant_key != principal.tenant_key() {
        // Visible via the shared sentinel but not owned.
        return Err(QuarryError::NotFound(format!("Document {id} not found")));
    }

    let (documents, chunks, vectors) = state.ingestor.delete_document(id).await?;
    Ok(Json(serde_json::json!({
        "deleted": documents > 0,
        "chunks": chunks,
        "vectors": vectors,
    })))
}

/// Cached brief summary; other formats (or `refresh=true`) recompute from
/// the stored chunks.
pub async fn summary(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<SummaryResponse>> {
    let document = visible_document(&state, &principal, id).await?;

    let format: SummaryFormat = match query.format.as_deref() {
        Some(raw) => raw.parse().map_err(QuarryError::Validation)?,
        None => SummaryFormat::Brief,
    };

    if format == SummaryFormat::Brief && !query.refresh {
        if let Some(cached) = document.summary_cache.clone() {
            return Ok(Json(SummaryResponse {
                document_id: id,
                format: "brief".into(),
                summary: cached,
                cached: true,
            }));
        }
    }

    let chunks = state.db.chunks_for_document(id).await?;
    if chunks.is_empty() {
        return Err(QuarryError::Conflict(
            "Document is still being indexed".into(),
        ));
    }
    let content: String = chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
        .chars()
        .take(12_000)
        .collect();

    let summary = state
        .generator
        .summarize(format, &document.filename, &content)
        .await?;

    if format == SummaryFormat::Brief {
        state.db.update_document_summary(id, &summary).await?;
    }

    Ok(Json(SummaryResponse {
        document_id: id,
        format: format!("{format:?}").to_lowercase(),
        summary,
        cached: false,
    }))
}
