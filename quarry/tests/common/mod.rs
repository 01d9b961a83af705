#![allow(dead_code)]

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use quarry::api::{create_router, AppState};
use quarry::config::{
    AuthConfig, Config, DatabaseConfig, EmbeddingsConfig, GenerationConfig, LlmConfig,
    MemoryConfig, ProcessingConfig, ReaperConfig, RetrievalConfig, ServerConfig,
};
use quarry::db::{Database, DatabaseBackend, LibSqlBackend, MetadataStore};
use quarry::embeddings::Embedder;
use quarry::error::{QuarryError, Result};
use quarry::llm::{Completion, CompletionOptions, LanguageModel, TokenStream};
use quarry::models::FileType;
use quarry::processing::TextExtractor;

pub const TEST_DIMENSIONS: usize = 16;
pub const REFUSAL: &str = "I don't know based on the provided documents.";

/// Deterministic bag-of-words embedder: shared vocabulary between query and
/// chunk produces high cosine similarity without any network call.
pub struct HashingEmbedder;

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| embed_text(t)).collect())
    }

    fn dimensions(&self) -> usize {
        TEST_DIMENSIONS
    }
}

fn embed_text(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; TEST_DIMENSIONS];
    for word in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
        if word.is_empty() {
            continue;
        }
        let mut hasher = DefaultHasher::new();
        word.hash(&mut hasher);
        vector[(hasher.finish() as usize) % TEST_DIMENSIONS] += 1.0;
    }
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    } else {
        vector[0] = 1.0;
    }
    vector
}

/// Scripted language model. Answers echo the context and memory blocks so
/// assertions can check grounding; structured prompts get canned JSON.
pub struct ScriptedLlm;

fn answer_from_prompt(prompt: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    let mut in_context = false;
    for line in prompt.lines() {
        if line.starts_with("Context:") {
            in_context = true;
            continue;
        }
        if line.starts_with("Question:") {
            break;
        }
        if line.starts_with("Memories:") {
            in_context = true;
            continue;
        }
        if !in_context
            || line.trim().is_empty()
            || line.starts_with("[Source:")
            || line.starts_with('(')
        {
            continue;
        }
        let cleaned = line
            .trim_start_matches("[User Memory]")
            .trim_start_matches("[Shared Memory]")
            .trim();
        parts.push(cleaned);
    }

    if parts.is_empty() {
        REFUSAL.to_string()
    } else {
        parts.join(" ")
    }
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    async fn complete(
        &self,
        _system: Option<&str>,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<Completion> {
        let text = if prompt.contains("Summarize only what the document says") {
            "A short summary of the document.".to_string()
        } else if prompt.contains("Condense the following memory entries") {
            "[Historical Summary] Older notes condensed.\nCritical facts: none.".to_string()
        } else {
            answer_from_prompt(prompt)
        };

        let logprobs = options
            .logprobs
            .then(|| vec![-0.05f32; text.split_whitespace().count().max(1)]);

        Ok(Completion { text, logprobs })
    }

    async fn complete_json(&self, prompt: &str, _options: &CompletionOptions) -> Result<Value> {
        if prompt.contains("Extract the named entities") {
            return Ok(serde_json::json!({ "entities": [] }));
        }
        if prompt.contains("Rate from 0 to 100") {
            return Ok(serde_json::json!({ "score": 85 }));
        }
        if prompt.contains("Compare the following documents") {
            return Ok(serde_json::json!({
                "similarities": ["Both documents cover the same project."],
                "differences": ["They emphasize different quarters."],
                "insights": ["Read together they span the full year."],
            }));
        }
        Err(QuarryError::Llm("Unexpected structured prompt".into()))
    }

    async fn stream(
        &self,
        system: Option<&str>,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<TokenStream> {
        let completion = self.complete(system, prompt, options).await?;
        let words: Vec<Result<String>> = completion
            .text
            .split_inclusive(' ')
            .map(|w| Ok(w.to_string()))
            .collect();
        Ok(Box::pin(futures::stream::iter(words)))
    }

    fn supports_logprobs(&self) -> bool {
        true
    }
}

/// Uploads carry plain text in tests; the marker content simulates a parser
/// failure on garbage bytes.
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, _file_type: FileType, bytes: &[u8]) -> Result<String> {
        let text = String::from_utf8(bytes.to_vec())
            .map_err(|_| QuarryError::Validation("Not valid text".into()))?;
        if text.contains("FAIL_EXTRACT") {
            return Err(QuarryError::Validation("Unreadable document bytes".into()));
        }
        Ok(text)
    }
}

pub fn test_config(db_path: &str) -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            cookie_secure: false,
        },
        database: DatabaseConfig {
            url: format!("file:{db_path}"),
            auth_token: None,
            local_path: None,
        },
        auth: AuthConfig {
            jwt_secret: "test-secret-test-secret-test-secret!".into(),
            access_lifetime_secs: 900,
            refresh_lifetime_secs: 3600,
            anonymous_ttl_days: 7,
            admin_emails: vec!["admin@example.com".into()],
        },
        embeddings: EmbeddingsConfig {
            model: "hashing-test".into(),
            dimensions: TEST_DIMENSIONS,
            batch_size: 16,
            api_key: None,
            base_url: None,
            timeout_secs: 5,
            max_retries: 0,
        },
        processing: ProcessingConfig {
            chunk_target_tokens: 50,
            chunk_overlap_percent: 0,
            max_upload_bytes: 64 * 1024,
        },
        retrieval: RetrievalConfig {
            default_k: 8,
            graph_budget_ms: 500,
            hybrid_boost: 1.2,
            graph_base_score: 0.7,
            max_edges_per_chunk: 15,
        },
        generation: GenerationConfig {
            refusal_phrase: REFUSAL.into(),
            excerpt_max_chars: 200,
            confidence_high: 0.75,
            confidence_medium: 0.5,
        },
        memory: MemoryConfig {
            max_context_tokens: 4000,
            summarize_watermark: 0.75,
            keep_recent: 5,
        },
        reaper: ReaperConfig {
            hour: 3,
            batch_size: 100,
        },
        llm: Some(LlmConfig {
            model: "scripted-test".into(),
            api_key: None,
            base_url: None,
            timeout_secs: 5,
            max_retries: 0,
            supports_logprobs: true,
        }),
        shared_sentinel: "__shared__".into(),
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub db: Arc<dyn DatabaseBackend>,
    // Keeps the backing file alive for the test's duration.
    _db_file: NamedTempFile,
}

pub async fn build_app() -> TestApp {
    let db_file = NamedTempFile::new().expect("temp db file");
    let config = test_config(db_file.path().to_str().unwrap());

    let raw_db = Database::new(&config.database, TEST_DIMENSIONS)
        .await
        .expect("database");
    let db: Arc<dyn DatabaseBackend> = Arc::new(LibSqlBackend::new(raw_db));
    db.set_embedding_dimensions(TEST_DIMENSIONS).await.unwrap();

    let state = AppState::new(
        config,
        db.clone(),
        Arc::new(HashingEmbedder),
        Some(Arc::new(ScriptedLlm)),
        Arc::new(PlainTextExtractor),
        CancellationToken::new(),
    )
    .expect("app state");

    TestApp {
        router: create_router(state.clone()),
        state,
        db,
        _db_file: db_file,
    }
}

// -- HTTP helpers -----------------------------------------------------------

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Value,
    pub raw_body: String,
}

impl TestResponse {
    pub fn cookie(&self) -> Option<String> {
        self.headers
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(str::to_string)
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.expect("request");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let raw_body = String::from_utf8_lossy(&bytes).to_string();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    TestResponse {
        status,
        headers,
        body,
        raw_body,
    }
}

pub fn json_request(
    method: &str,
    uri: &str,
    body: Value,
    bearer: Option<&str>,
    cookie: Option<&str>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).expect("request")
}

pub fn get_request(uri: &str, bearer: Option<&str>, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).expect("request")
}

pub fn multipart_upload(
    filename: &str,
    content: &str,
    bearer: Option<&str>,
    cookie: Option<&str>,
) -> Request<Body> {
    let boundary = "quarry-test-boundary";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n{content}\r\n--{boundary}--\r\n"
    );

    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/v1/documents/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        );
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body)).expect("request")
}

/// Upload a document and wait until ingestion reaches a terminal stage.
/// Returns the document id and the (possibly newly minted) session cookie.
pub async fn upload_and_wait(
    app: &TestApp,
    filename: &str,
    content: &str,
    bearer: Option<&str>,
    cookie: Option<&str>,
) -> (String, Option<String>) {
    let response = send(
        &app.router,
        multipart_upload(filename, content, bearer, cookie),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK, "upload: {}", response.raw_body);

    let document_id = response.body["document_id"].as_str().unwrap().to_string();
    let new_cookie = response.cookie().or_else(|| cookie.map(str::to_string));

    wait_for_terminal(app, &document_id, bearer, new_cookie.as_deref()).await;
    (document_id, new_cookie)
}

pub async fn wait_for_terminal(
    app: &TestApp,
    document_id: &str,
    bearer: Option<&str>,
    cookie: Option<&str>,
) -> Value {
    for _ in 0..200 {
        let response = send(
            &app.router,
            get_request(
                &format!("/api/v1/documents/{document_id}/status"),
                bearer,
                cookie,
            ),
        )
        .await;
        if response.status == StatusCode::OK {
            let stage = response.body["stage"].as_str().unwrap_or_default().to_string();
            if stage == "completed" || stage == "failed" {
                return response.body;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("document {document_id} never reached a terminal stage");
}

/// Register an account (optionally carrying an anonymous cookie for
/// migration) and log in. Returns (access, refresh, register-response).
pub async fn register_and_login(
    app: &TestApp,
    email: &str,
    password: &str,
    cookie: Option<&str>,
) -> (String, String, Value) {
    let register = send(
        &app.router,
        json_request(
            "POST",
            "/api/v1/auth/register",
            serde_json::json!({ "email": email, "password": password }),
            None,
            cookie,
        ),
    )
    .await;
    assert_eq!(register.status, StatusCode::OK, "register: {}", register.raw_body);

    let login = send(
        &app.router,
        json_request(
            "POST",
            "/api/v1/auth/login",
            serde_json::json!({ "email": email, "password": password }),
            None,
            None,
        ),
    )
    .await;
    assert_eq!(login.status, StatusCode::OK, "login: {}", login.raw_body);

    (
        login.body["access"].as_str().unwrap().to_string(),
        login.body["refresh"].as_str().unwrap().to_string(),
        register.body,
    )
}

/// Parse an SSE body into (event, data) pairs.
pub fn parse_sse(raw: &str) -> Vec<(String, String)> {
    let mut events = Vec::new();
    let mut current_event = String::new();
    let mut current_data = String::new();

    for line in raw.lines() {
        if let Some(rest) = line.strip_prefix("event:") {
            current_event = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix("data:") {
            if !current_data.is_empty() {
                current_data.push('\n');
            }
            current_data.push_str(rest.trim_start_matches(' '));
        } else if line.is_empty() && !current_event.is_empty() {
            events.push((current_event.clone(), current_data.clone()));
            current_event.clear();
            current_data.clear();
        }
    }
    events
}

