mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{build_app, get_request, json_request, register_and_login, send, REFUSAL};

#[tokio::test]
async fn shared_memory_is_visible_to_authenticated_users_only() {
    let app = build_app().await;
    let (admin_access, _, _) =
        register_and_login(&app, "admin@example.com", "password123", None).await;

    let add = send(
        &app.router,
        json_request(
            "POST",
            "/api/v1/admin/memory/shared",
            json!({ "text": "Company fiscal year starts April 1." }),
            Some(&admin_access),
            None,
        ),
    )
    .await;
    assert_eq!(add.status, StatusCode::OK, "{}", add.raw_body);

    // An authenticated user's query folds the shared memory in.
    let (user_access, _, _) =
        register_and_login(&app, "reader@example.com", "password123", None).await;
    let answered = send(
        &app.router,
        json_request(
            "POST",
            "/api/v1/query",
            json!({ "query": "When is fiscal year start?" }),
            Some(&user_access),
            None,
        ),
    )
    .await;
    assert_eq!(answered.status, StatusCode::OK);
    let answer = answered.body["answer"].as_str().unwrap();
    assert!(answer.contains("April 1"), "answer was: {answer}");

    // The same query from an anonymous session gets the refusal.
    let anonymous = send(
        &app.router,
        json_request(
            "POST",
            "/api/v1/query",
            json!({ "query": "When is fiscal year start?" }),
            None,
            None,
        ),
    )
    .await;
    assert_eq!(anonymous.status, StatusCode::OK);
    assert_eq!(anonymous.body["answer"].as_str().unwrap(), REFUSAL);
}

#[tokio::test]
async fn shared_writes_require_admin_role() {
    let app = build_app().await;
    let (user_access, _, _) =
        register_and_login(&app, "user@example.com", "password123", None).await;

    let response = send(
        &app.router,
        json_request(
            "POST",
            "/api/v1/admin/memory/shared",
            json!({ "text": "should not land" }),
            Some(&user_access),
            None,
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    // The shared-kind escape hatch on the user endpoint is closed too.
    let sneaky = send(
        &app.router,
        json_request(
            "POST",
            "/api/v1/memory",
            json!({ "text": "smuggled", "kind": "shared" }),
            Some(&user_access),
            None,
        ),
    )
    .await;
    assert_eq!(sneaky.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn private_memory_round_trip() {
    let app = build_app().await;
    let (access, _, _) = register_and_login(&app, "mem@example.com", "password123", None).await;

    let added = send(
        &app.router,
        json_request(
            "POST",
            "/api/v1/memory",
            json!({ "text": "Prefers metric units.", "kind": "preference" }),
            Some(&access),
            None,
        ),
    )
    .await;
    assert_eq!(added.status, StatusCode::OK, "{}", added.raw_body);
    let memory_id = added.body["id"].as_str().unwrap().to_string();

    let listed = send(
        &app.router,
        get_request("/api/v1/memory", Some(&access), None),
    )
    .await;
    let entries = listed.body.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["text"], "Prefers metric units.");

    // Another user cannot delete it.
    let (other_access, _, _) =
        register_and_login(&app, "other@example.com", "password123", None).await;
    let stolen = send(
        &app.router,
        axum::http::Request::builder()
            .method("DELETE")
            .uri(format!("/api/v1/memory/{memory_id}"))
            .header(
                axum::http::header::AUTHORIZATION,
                format!("Bearer {other_access}"),
            )
            .body(axum::body::Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(stolen.status, StatusCode::NOT_FOUND);

    // The owner can.
    let deleted = send(
        &app.router,
        axum::http::Request::builder()
            .method("DELETE")
            .uri(format!("/api/v1/memory/{memory_id}"))
            .header(axum::http::header::AUTHORIZATION, format!("Bearer {access}"))
            .body(axum::body::Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(deleted.status, StatusCode::OK);

    let relisted = send(
        &app.router,
        get_request("/api/v1/memory", Some(&access), None),
    )
    .await;
    assert!(relisted.body.as_array().unwrap().is_empty());
}
