mod common;

use axum::http::StatusCode;
use serde_json::json;
use uuid::Uuid;

use common::{build_app, json_request, register_and_login, send, upload_and_wait};
use quarry::db::CheckpointStore;
use quarry::models::{compare_thread_id, CompareNode, ComparisonState};

#[tokio::test]
async fn comparison_completes_with_analysis_and_citations() {
    let app = build_app().await;
    let (access, _, _) = register_and_login(&app, "cmp@example.com", "password123", None).await;

    let (doc_a, _) = upload_and_wait(
        &app,
        "q1.pdf",
        "The Q1 report highlights revenue growth for Project Atlas.",
        Some(&access),
        None,
    )
    .await;
    let (doc_b, _) = upload_and_wait(
        &app,
        "q2.pdf",
        "The Q2 report highlights staffing changes for Project Atlas.",
        Some(&access),
        None,
    )
    .await;

    let response = send(
        &app.router,
        json_request(
            "POST",
            "/api/v1/compare",
            json!({
                "query": "How do these two quarterly reports differ?",
                "document_ids": [doc_a, doc_b],
                "session_id": "s1",
            }),
            Some(&access),
            None,
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.raw_body);
    assert_eq!(response.body["status"], "completed");
    assert!(!response.body["similarities"].as_array().unwrap().is_empty());
    assert!(!response.body["differences"].as_array().unwrap().is_empty());
    assert!(!response.body["response"].as_str().unwrap().is_empty());
    assert!(!response.body["citations"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn comparison_rejects_invisible_documents() {
    let app = build_app().await;
    let (access_a, _, _) = register_and_login(&app, "va@example.com", "password123", None).await;
    let (access_b, _, _) = register_and_login(&app, "vb@example.com", "password123", None).await;

    let (doc_a, _) =
        upload_and_wait(&app, "mine.pdf", "Owned by user A.", Some(&access_a), None).await;
    let (doc_b, _) =
        upload_and_wait(&app, "also.pdf", "Also owned by user A.", Some(&access_a), None).await;

    // B supplies A's document ids: authorization failure, not a silent drop.
    let response = send(
        &app.router,
        json_request(
            "POST",
            "/api/v1/compare",
            json!({
                "query": "Compare the two documents please.",
                "document_ids": [doc_a, doc_b],
                "session_id": "sx",
            }),
            Some(&access_b),
            None,
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn comparison_requires_authentication_and_bounds() {
    let app = build_app().await;

    // Anonymous callers are rejected outright.
    let anon = send(
        &app.router,
        json_request(
            "POST",
            "/api/v1/compare",
            json!({
                "query": "Compare the two documents please.",
                "document_ids": [Uuid::new_v4(), Uuid::new_v4()],
                "session_id": "s",
            }),
            None,
            None,
        ),
    )
    .await;
    assert_eq!(anon.status, StatusCode::UNAUTHORIZED);

    // A single document is below the bound.
    let (access, _, _) = register_and_login(&app, "bounds@example.com", "password123", None).await;
    let one = send(
        &app.router,
        json_request(
            "POST",
            "/api/v1/compare",
            json!({
                "query": "Compare the two documents please.",
                "document_ids": [Uuid::new_v4()],
                "session_id": "s",
            }),
            Some(&access),
            None,
        ),
    )
    .await;
    assert_eq!(one.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn resume_skips_completed_nodes() {
    let app = build_app().await;
    let (access, _, _) = register_and_login(&app, "resume@example.com", "password123", None).await;

    let (doc_a, _) = upload_and_wait(
        &app,
        "ra.pdf",
        "Alpha report covers the launch schedule.",
        Some(&access),
        None,
    )
    .await;
    let (doc_b, _) = upload_and_wait(
        &app,
        "rb.pdf",
        "Beta report covers the marketing budget.",
        Some(&access),
        None,
    )
    .await;
    let doc_a: Uuid = doc_a.parse().unwrap();
    let doc_b: Uuid = doc_b.parse().unwrap();

    // Find the user's tenant key through the login-issued principal: the
    // workflow keys threads by tenant, so recover it from a checkpoint we
    // plant ourselves.
    let user_id = {
        let login = send(
            &app.router,
            json_request(
                "POST",
                "/api/v1/auth/login",
                json!({ "email": "resume@example.com", "password": "password123" }),
                None,
                None,
            ),
        )
        .await;
        // The access token's payload carries user_id as JSON (middle segment).
        let access_token = login.body["access"].as_str().unwrap();
        let payload = access_token.split('.').nth(1).unwrap();
        use base64::Engine;
        let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(payload)
            .unwrap();
        let claims: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
        claims["user_id"].as_str().unwrap().to_string()
    };

    let query = "How do the alpha and beta reports differ?";
    let thread_id = compare_thread_id(&user_id, "s-resume");

    // Simulate a worker killed between expand_graph and compare: a
    // checkpoint holding marker retrieval output that a re-run would
    // never produce.
    let mut state = ComparisonState::new(query.into(), user_id.clone(), vec![doc_a, doc_b]);
    let marker = quarry::models::RetrievedChunk {
        id: Uuid::new_v4(),
        document_id: doc_a,
        filename: "planted-marker.pdf".into(),
        text: "Marker chunk that retrieval would never return.".into(),
        score: 0.99,
        method: quarry::models::RetrievalMethod::Vector,
        matched_entities: Vec::new(),
    };
    state.retrieved_chunks.insert(doc_a, vec![marker]);
    state.retrieved_chunks.insert(doc_b, Vec::new());
    state.graph_context.insert(doc_a, Vec::new());
    state.graph_context.insert(doc_b, Vec::new());
    state.completed_node = Some(CompareNode::ExpandGraph);
    app.db.save(&thread_id, &state).await.unwrap();

    // Re-invoke with the same (user, session): retrieve and expand_graph
    // must not be recomputed, and the workflow completes.
    let response = send(
        &app.router,
        json_request(
            "POST",
            "/api/v1/compare",
            json!({
                "query": query,
                "document_ids": [doc_a, doc_b],
                "session_id": "s-resume",
            }),
            Some(&access),
            None,
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.raw_body);
    assert_eq!(response.body["status"], "completed");
    assert!(!response.body["similarities"].as_array().unwrap().is_empty());

    // The planted marker survived: retrieval was not re-run.
    let key = doc_a.to_string();
    let chunks = &response.body["retrieved_chunks"][key.as_str()];
    assert_eq!(chunks[0]["filename"], "planted-marker.pdf");
}
