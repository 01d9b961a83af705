use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use super::state::AppState;
use super::v1;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Body limit: the upload cap plus multipart framing overhead.
    let body_limit = RequestBodyLimitLayer::new(state.config.processing.max_upload_bytes + 64 * 1024);

    let v1 = v1::v1_router(state.clone());

    Router::new()
        .nest("/api/v1", v1)
        .layer(cors)
        .layer(body_limit)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
