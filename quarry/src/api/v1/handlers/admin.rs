use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::api::state::AppState;
use crate::api::v1::dto::{AddMemoryRequest, ListQuery, MemoryResponse};
use crate::error::{QuarryError, Result};
use crate::models::{MemoryMetadata, Principal};

/// Anonymous callers get `unauthorized`; authenticated non-admins get
/// `forbidden`.
fn require_admin(principal: &Principal) -> Result<()> {
    if !principal.is_authenticated() {
        return Err(QuarryError::Unauthorized);
    }
    if !principal.is_admin() {
        return Err(QuarryError::Forbidden("Admin role required".into()));
    }
    Ok(())
}

pub async fn add_shared_memory(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<AddMemoryRequest>,
) -> Result<Json<MemoryResponse>> {
    require_admin(&principal)?;
    request
        .validate()
        .map_err(|e| QuarryError::Validation(e.to_string()))?;

    let metadata = MemoryMetadata {
        session_id: request.session_id,
        role: request.role,
        timestamp: Some(chrono::Utc::now()),
        ..Default::default()
    };

    let entry = state
        .memory
        .add_shared(&principal, &request.text, metadata)
        .await?;
    Ok(Json(entry.into()))
}

pub async fn list_shared_memory(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<MemoryResponse>>> {
    require_admin(&principal)?;
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let entries = state.memory.list_shared(&principal, limit).await?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}

pub async fn delete_shared_memory(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    require_admin(&principal)?;
    state.memory.delete_shared(&principal, id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}
