use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use crate::api::state::AppState;

use super::handlers;
use super::middleware::principal_middleware;

pub fn v1_router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/health", get(handlers::health::health));

    let gated = Router::new()
        // Auth
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/auth/logout", post(handlers::auth::logout))
        // Documents
        .route("/documents/upload", post(handlers::documents::upload))
        .route("/documents", get(handlers::documents::list))
        .route("/documents/{id}", get(handlers::documents::get))
        .route("/documents/{id}", delete(handlers::documents::delete))
        .route("/documents/{id}/status", get(handlers::documents::status))
        .route("/documents/{id}/summary", get(handlers::documents::summary))
        // Query
        .route("/query", post(handlers::query::query))
        .route("/query/stream", post(handlers::query::query_stream))
        // Comparison
        .route("/compare", post(handlers::compare::compare))
        // Memory
        .route("/memory", get(handlers::memory::list))
        .route("/memory", post(handlers::memory::add))
        .route("/memory/{id}", delete(handlers::memory::delete))
        // Admin
        .route(
            "/admin/memory/shared",
            post(handlers::admin::add_shared_memory),
        )
        .route(
            "/admin/memory/shared",
            get(handlers::admin::list_shared_memory),
        )
        .route(
            "/admin/memory/shared/{id}",
            delete(handlers::admin::delete_shared_memory),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            principal_middleware,
        ));

    public.merge(gated)
}
