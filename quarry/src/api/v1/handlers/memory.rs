use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::api::state::AppState;
use crate::api::v1::dto::{AddMemoryRequest, ListQuery, MemoryResponse};
use crate::error::{QuarryError, Result};
use crate::models::{MemoryKind, MemoryMetadata, Principal};

pub async fn list(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<MemoryResponse>>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let entries = state.memory.list(&principal.tenant_key(), limit).await?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}

pub async fn add(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<AddMemoryRequest>,
) -> Result<Json<MemoryResponse>> {
    request
        .validate()
        .map_err(|e| QuarryError::Validation(e.to_string()))?;

    if request.kind == Some(MemoryKind::Shared) {
        return Err(QuarryError::Forbidden(
            "Shared memory is written through the admin endpoint".into(),
        ));
    }

    let metadata = MemoryMetadata {
        kind: request.kind.or(Some(MemoryKind::Fact)),
        session_id: request.session_id,
        role: request.role,
        timestamp: Some(chrono::Utc::now()),
    };

    let entry = state
        .memory
        .add(&principal.tenant_key(), &request.text, metadata)
        .await?;
    Ok(Json(entry.into()))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    state.memory.delete(&principal.tenant_key(), id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}
