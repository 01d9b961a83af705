use axum::{
    extract::{Extension, State},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::api::state::AppState;
use crate::api::v1::dto::{LoginRequest, RefreshRequest, RegisterRequest, RegisterResponse};
use crate::api::v1::middleware::clear_session_cookie;
use crate::auth::{hash_password, verify_password};
use crate::error::{QuarryError, Result};
use crate::models::{Claims, MigrationStats, Principal, Role, TokenPair, User};

/// Create an account. An anonymous caller's data is migrated to the new
/// user synchronously, before the response; the anonymous cookie is cleared
/// on success.
pub async fn register(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<RegisterRequest>,
) -> Result<Response> {
    request
        .validate()
        .map_err(|e| QuarryError::Validation(e.to_string()))?;

    let email = request.email.trim().to_lowercase();
    if state.db.get_user_by_email(&email).await?.is_some() {
        return Err(QuarryError::Conflict("Account already exists".into()));
    }

    let role = if state.config.auth.admin_emails.contains(&email) {
        Role::Admin
    } else {
        Role::User
    };

    let user = User {
        id: Uuid::new_v4(),
        email: email.clone(),
        password_hash: hash_password(&request.password)?,
        role,
        created_at: Utc::now(),
    };
    state.db.create_user(&user).await?;
    state.db.create_user_node(user.id, &email).await?;

    let migration = match &principal {
        Principal::Anonymous { session_id } => {
            state
                .migrator
                .migrate(session_id, &user.id.to_string())
                .await?
        }
        Principal::Authenticated { .. } => MigrationStats::default(),
    };

    let body = Json(RegisterResponse {
        user_id: user.id,
        migration,
    });

    // Clearing the cookie ends the anonymous session for good.
    let (name, value) = clear_session_cookie();
    Ok(([(name, value)], body).into_response())
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenPair>> {
    request
        .validate()
        .map_err(|e| QuarryError::Validation(e.to_string()))?;

    let email = request.email.trim().to_lowercase();
    let user = state
        .db
        .get_user_by_email(&email)
        .await?
        .ok_or(QuarryError::Unauthorized)?;

    if !verify_password(&request.password, &user.password_hash) {
        return Err(QuarryError::Unauthorized);
    }

    let pair = state.gateway.tokens().issue_pair(&user).await?;
    Ok(Json(pair))
}

/// Single-use refresh rotation.
pub async fn refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<TokenPair>> {
    let pair = state.gateway.tokens().rotate_refresh(&request.refresh).await?;
    Ok(Json(pair))
}

/// Blocklist the presented access token for its remaining lifetime.
pub async fn logout(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    claims: Option<Extension<Claims>>,
) -> Result<Json<serde_json::Value>> {
    if !principal.is_authenticated() {
        return Err(QuarryError::Unauthorized);
    }
    let Some(Extension(claims)) = claims else {
        return Err(QuarryError::Unauthorized);
    };

    state.gateway.tokens().blocklist(&claims).await?;
    Ok(Json(serde_json::json!({ "logged_out": true })))
}
