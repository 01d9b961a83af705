mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{
    build_app, get_request, json_request, multipart_upload, register_and_login, send,
    upload_and_wait, wait_for_terminal, REFUSAL,
};
use quarry::db::{GraphStore, VectorStore, DOCUMENTS_COLLECTION};

#[tokio::test]
async fn upload_then_query_answers_with_citation() {
    let app = build_app().await;
    let (access, _, _) = register_and_login(&app, "q@example.com", "password123", None).await;

    let (document_id, _) = upload_and_wait(
        &app,
        "r.pdf",
        "Revenue grew 25% in Q3.",
        Some(&access),
        None,
    )
    .await;

    let response = send(
        &app.router,
        json_request(
            "POST",
            "/api/v1/query",
            json!({ "query": "What was Q3 revenue growth?" }),
            Some(&access),
            None,
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.raw_body);

    let answer = response.body["answer"].as_str().unwrap();
    assert!(answer.contains("25%"), "answer was: {answer}");

    let citations = response.body["citations"].as_array().unwrap();
    assert_eq!(citations.len(), 1);
    assert_eq!(citations[0]["document_id"].as_str().unwrap(), document_id);
    assert_eq!(citations[0]["filename"], "r.pdf");

    assert_eq!(response.body["confidence"]["level"], "high");
}

#[tokio::test]
async fn tenants_are_isolated() {
    let app = build_app().await;
    let (access_a, _, _) = register_and_login(&app, "a@example.com", "password123", None).await;
    let (access_b, _, _) = register_and_login(&app, "b@example.com", "password123", None).await;

    upload_and_wait(
        &app,
        "a.pdf",
        "Project Atlas launches in June.",
        Some(&access_a),
        None,
    )
    .await;

    // User B sees nothing of A's data: refusal, no citations.
    let response = send(
        &app.router,
        json_request(
            "POST",
            "/api/v1/query",
            json!({ "query": "When does Atlas launch?" }),
            Some(&access_b),
            None,
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["answer"].as_str().unwrap(), REFUSAL);
    assert!(response.body["citations"].as_array().unwrap().is_empty());

    // And B's document list is empty.
    let list = send(
        &app.router,
        get_request("/api/v1/documents", Some(&access_b), None),
    )
    .await;
    assert!(list.body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn anonymous_and_authenticated_tenants_do_not_mix() {
    let app = build_app().await;
    let (access, _, _) = register_and_login(&app, "owner@example.com", "password123", None).await;
    upload_and_wait(&app, "s.pdf", "The secret plan targets Mars.", Some(&access), None).await;

    let response = send(
        &app.router,
        json_request(
            "POST",
            "/api/v1/query",
            json!({ "query": "What does the secret plan target?" }),
            None,
            None,
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["answer"].as_str().unwrap(), REFUSAL);
}

#[tokio::test]
async fn delete_cascades_graph_and_vector_state() {
    let app = build_app().await;
    let (access, _, _) = register_and_login(&app, "del@example.com", "password123", None).await;

    let (document_id, _) = upload_and_wait(
        &app,
        "d.pdf",
        "Quarterly numbers improved across the board.",
        Some(&access),
        None,
    )
    .await;
    let doc_uuid: uuid::Uuid = document_id.parse().unwrap();

    let chunk_ids = app.db.chunk_ids_for_document(doc_uuid).await.unwrap();
    assert!(!chunk_ids.is_empty());

    let delete = send(
        &app.router,
        axum::http::Request::builder()
            .method("DELETE")
            .uri(format!("/api/v1/documents/{document_id}"))
            .header(axum::http::header::AUTHORIZATION, format!("Bearer {access}"))
            .body(axum::body::Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(delete.status, StatusCode::OK);

    // No graph chunks, no graph document, no vector points remain.
    assert!(app.db.get_document(doc_uuid).await.unwrap().is_none());
    assert!(app
        .db
        .chunk_ids_for_document(doc_uuid)
        .await
        .unwrap()
        .is_empty());
    for chunk_id in chunk_ids {
        assert!(app
            .db
            .get_point(DOCUMENTS_COLLECTION, chunk_id)
            .await
            .unwrap()
            .is_none());
    }

    // A later query never cites the deleted document.
    let response = send(
        &app.router,
        json_request(
            "POST",
            "/api/v1/query",
            json!({ "query": "How did the quarterly numbers improve?" }),
            Some(&access),
            None,
        ),
    )
    .await;
    assert!(response.body["citations"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn unsupported_extension_is_rejected_inline() {
    let app = build_app().await;
    let response = send(
        &app.router,
        multipart_upload("sheet.xlsx", "cells", None, None),
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "validation");
}

#[tokio::test]
async fn oversized_upload_is_rejected_inline() {
    let app = build_app().await;
    // Over the 64 KiB test cap but under the transport layer's margin.
    let big = "x".repeat(65 * 1024);
    let response = send(&app.router, multipart_upload("big.pdf", &big, None, None)).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn failed_extraction_cleans_up_and_reports_failed() {
    let app = build_app().await;
    let (access, _, _) = register_and_login(&app, "fail@example.com", "password123", None).await;

    let response = send(
        &app.router,
        multipart_upload("bad.pdf", "FAIL_EXTRACT", Some(&access), None),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    let document_id = response.body["document_id"].as_str().unwrap().to_string();

    let status = wait_for_terminal(&app, &document_id, Some(&access), None).await;
    assert_eq!(status["stage"], "failed");
    assert!(status["error"].as_str().unwrap().contains("Unreadable"));

    // Zero chunks and zero vector points for the failed document.
    let doc_uuid: uuid::Uuid = document_id.parse().unwrap();
    assert!(app
        .db
        .chunk_ids_for_document(doc_uuid)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        app.db
            .delete_by_document(DOCUMENTS_COLLECTION, doc_uuid)
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn summary_is_cached_after_first_generation() {
    let app = build_app().await;
    let (access, _, _) = register_and_login(&app, "sum@example.com", "password123", None).await;
    let (document_id, _) = upload_and_wait(
        &app,
        "s.pdf",
        "A document about numbers. It has two sentences.",
        Some(&access),
        None,
    )
    .await;

    let first = send(
        &app.router,
        get_request(
            &format!("/api/v1/documents/{document_id}/summary"),
            Some(&access),
            None,
        ),
    )
    .await;
    assert_eq!(first.status, StatusCode::OK, "{}", first.raw_body);
    // The ingest pipeline already cached a brief summary.
    assert_eq!(first.body["cached"], true);
    assert!(!first.body["summary"].as_str().unwrap().is_empty());

    let bullet = send(
        &app.router,
        get_request(
            &format!("/api/v1/documents/{document_id}/summary?format=bullet"),
            Some(&access),
            None,
        ),
    )
    .await;
    assert_eq!(bullet.status, StatusCode::OK);
    assert_eq!(bullet.body["cached"], false);
}

#[tokio::test]
async fn document_metadata_is_not_enumerable_across_tenants() {
    let app = build_app().await;
    let (access_a, _, _) = register_and_login(&app, "own@example.com", "password123", None).await;
    let (access_b, _, _) = register_and_login(&app, "spy@example.com", "password123", None).await;

    let (document_id, _) =
        upload_and_wait(&app, "p.pdf", "Private words live here.", Some(&access_a), None).await;

    let response = send(
        &app.router,
        get_request(
            &format!("/api/v1/documents/{document_id}"),
            Some(&access_b),
            None,
        ),
    )
    .await;
    // Invisible and nonexistent are the same status.
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["error"], "not_found");
}
