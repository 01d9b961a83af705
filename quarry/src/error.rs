use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuarryError {
    #[error("Database error: {0}")]
    Database(#[from] libsql::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Dependency failed: {0}")]
    DependencyFailed(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl QuarryError {
    /// Machine-readable error code used in the wire body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::DependencyFailed(_)
            | Self::Embedding(_)
            | Self::Llm(_)
            | Self::LlmUnavailable(_)
            | Self::Http(_) => "dependency_failed",
            Self::Timeout(_) => "timeout",
            Self::Database(_)
            | Self::Json(_)
            | Self::Io(_)
            | Self::Processing(_)
            | Self::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::DependencyFailed(_) | Self::Embedding(_) | Self::Llm(_) | Self::Http(_) => {
                StatusCode::BAD_GATEWAY
            }
            Self::LlmUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Database(_)
            | Self::Json(_)
            | Self::Io(_)
            | Self::Processing(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for QuarryError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        // Internal detail never reaches the wire; it goes to the log instead.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Internal error surfaced at HTTP boundary");
            "An internal error occurred".to_string()
        } else if matches!(self, Self::Unauthorized) {
            // Never disclose why credentials were rejected.
            "Authentication required".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": code,
            "message": message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, QuarryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_codes_map_to_statuses() {
        assert_eq!(
            QuarryError::Validation("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(QuarryError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            QuarryError::Forbidden("role".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            QuarryError::NotFound("doc".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            QuarryError::Conflict("reuse".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            QuarryError::Timeout("graph".into()).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn dependency_errors_share_a_code() {
        assert_eq!(
            QuarryError::DependencyFailed("graph down".into()).code(),
            "dependency_failed"
        );
        assert_eq!(
            QuarryError::Embedding("dim".into()).code(),
            "dependency_failed"
        );
        assert_eq!(QuarryError::Llm("boom".into()).code(), "dependency_failed");
    }

    #[test]
    fn internal_variants_collapse_to_internal() {
        assert_eq!(QuarryError::Internal("secret".into()).code(), "internal");
        assert_eq!(
            QuarryError::Processing("half-parsed".into()).code(),
            "internal"
        );
    }
}
