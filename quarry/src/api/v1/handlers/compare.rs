use axum::{
    extract::{Extension, State},
    Json,
};
use validator::Validate;

use crate::api::state::AppState;
use crate::api::v1::dto::CompareRequest;
use crate::error::{QuarryError, Result};
use crate::models::{ComparisonState, Principal};

/// Run (or resume) the durable comparison workflow. Authenticated only.
pub async fn compare(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<CompareRequest>,
) -> Result<Json<ComparisonState>> {
    if !principal.is_authenticated() {
        return Err(QuarryError::Unauthorized);
    }
    request
        .validate()
        .map_err(|e| QuarryError::Validation(e.to_string()))?;

    let result = state
        .workflow
        .run(
            &principal,
            &request.query,
            &request.document_ids,
            &request.session_id,
        )
        .await?;

    Ok(Json(result))
}
