use axum::{
    extract::{Extension, State},
    response::sse::{KeepAlive, Sse},
    response::IntoResponse,
    Json,
};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use validator::Validate;

use crate::api::state::AppState;
use crate::api::v1::dto::{QueryRequest, QueryResponse};
use crate::error::{QuarryError, Result};
use crate::models::Principal;
use crate::retrieval::RetrievalOptions;

const MEMORY_K: usize = 5;

/// One-shot answer.
pub async fn query(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>> {
    request
        .validate()
        .map_err(|e| QuarryError::Validation(e.to_string()))?;

    let k = request.k.unwrap_or(state.config.retrieval.default_k);
    let output = state
        .retriever
        .retrieve(
            &principal,
            &request.query,
            k,
            RetrievalOptions {
                include_graph: request.include_graph,
            },
        )
        .await?;

    let memories = state
        .memory
        .search_with_shared(&principal, &request.query, MEMORY_K)
        .await
        .unwrap_or_else(|error| {
            tracing::warn!(error = %error, "Memory search failed; answering without memories");
            Vec::new()
        });

    let answer = state
        .generator
        .answer(&request.query, &output.chunks, &output.graph_context, &memories)
        .await?;

    Ok(Json(QueryResponse {
        answer: answer.text,
        citations: answer.citations,
        confidence: answer.confidence,
    }))
}

/// SSE answer stream. Buffering is disabled end to end
/// (`x-accel-buffering: no`); the connection is kept alive with periodic
/// pings; dropping the response cancels generation within one token.
pub async fn query_stream(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<QueryRequest>,
) -> Result<impl IntoResponse> {
    request
        .validate()
        .map_err(|e| QuarryError::Validation(e.to_string()))?;

    let k = request.k.unwrap_or(state.config.retrieval.default_k);
    let output = state
        .retriever
        .retrieve(
            &principal,
            &request.query,
            k,
            RetrievalOptions {
                include_graph: request.include_graph,
            },
        )
        .await?;

    let memories = state
        .memory
        .search_with_shared(&principal, &request.query, MEMORY_K)
        .await
        .unwrap_or_else(|error| {
            tracing::warn!(error = %error, "Memory search failed; streaming without memories");
            Vec::new()
        });

    let cancel = CancellationToken::new();
    let events = state
        .generator
        .stream_answer(
            request.query,
            output.chunks,
            output.graph_context,
            memories,
            cancel,
        )
        .map(|event| Ok::<_, std::convert::Infallible>(event.into_sse()));

    let sse = Sse::new(events).keep_alive(KeepAlive::default());
    Ok(([("x-accel-buffering", "no")], sse))
}
