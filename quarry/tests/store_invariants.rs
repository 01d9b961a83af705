mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use common::{build_app, HashingEmbedder, TEST_DIMENSIONS};
use quarry::config::ANON_PREFIX;
use quarry::db::{
    GraphStore, KvStore, VectorPoint, VectorStore, DOCUMENTS_COLLECTION,
};
use quarry::embeddings::Embedder;
use quarry::models::{Chunk, Document, FileType};
use quarry::tenancy::{OrphanSweeper, Reaper};

async fn seed_document(
    app: &common::TestApp,
    tenant_key: &str,
    filename: &str,
    texts: &[&str],
) -> Document {
    seed_document_at(app, tenant_key, filename, texts, Utc::now()).await
}

async fn seed_document_at(
    app: &common::TestApp,
    tenant_key: &str,
    filename: &str,
    texts: &[&str],
    created_at: chrono::DateTime<Utc>,
) -> Document {
    let mut document = Document::new(
        tenant_key.to_string(),
        filename.to_string(),
        FileType::Pdf,
        1024,
    );
    document.upload_time = created_at;
    app.db.create_document(&document).await.unwrap();

    let embedder = HashingEmbedder;
    for (position, text) in texts.iter().enumerate() {
        let chunk = Chunk {
            id: Uuid::new_v4(),
            document_id: document.id,
            tenant_key: tenant_key.to_string(),
            position: position as i64,
            text: text.to_string(),
        };
        let embedding = embedder.embed_one(text).await.unwrap();
        // Vector first, then graph: the ingest pipeline's write order.
        app.db
            .upsert_point(
                DOCUMENTS_COLLECTION,
                &VectorPoint {
                    id: chunk.id,
                    tenant_key: chunk.tenant_key.clone(),
                    document_id: Some(chunk.document_id),
                    position: Some(chunk.position),
                    text: chunk.text.clone(),
                    metadata: None,
                    embedding,
                    created_at,
                },
            )
            .await
            .unwrap();
        app.db.create_chunk(&chunk).await.unwrap();
    }

    document
}

#[tokio::test]
async fn dual_store_ids_match_in_both_directions() {
    let app = build_app().await;
    let doc = seed_document(
        &app,
        "tenant-1",
        "pair.pdf",
        &["First chunk text.", "Second chunk text."],
    )
    .await;

    let graph_ids = app.db.chunk_ids_for_document(doc.id).await.unwrap();
    assert_eq!(graph_ids.len(), 2);

    // Every graph chunk has a vector twin with matching payload.
    for id in &graph_ids {
        let point = app
            .db
            .get_point(DOCUMENTS_COLLECTION, *id)
            .await
            .unwrap()
            .expect("vector twin exists");
        assert_eq!(point.tenant_key, "tenant-1");
    }

    // And every vector point in the collection is anchored in the graph.
    let vector_ids = app
        .db
        .scroll_ids(DOCUMENTS_COLLECTION, 100, 0)
        .await
        .unwrap();
    let existing = app.db.existing_chunk_ids(&vector_ids).await.unwrap();
    assert_eq!(existing.len(), vector_ids.len());
}

#[tokio::test]
async fn vector_search_never_crosses_tenants() {
    let app = build_app().await;
    seed_document(&app, "tenant-a", "a.pdf", &["Atlas launches in June."]).await;
    seed_document(&app, "tenant-b", "b.pdf", &["Borealis launches in July."]).await;

    let embedder = HashingEmbedder;
    let query = embedder.embed_one("When does Atlas launch?").await.unwrap();

    // Searching as tenant-b never returns tenant-a's chunks, however
    // similar they are.
    let hits = app
        .db
        .search(
            DOCUMENTS_COLLECTION,
            &query,
            10,
            &["tenant-b".to_string()],
            None,
        )
        .await
        .unwrap();
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|hit| hit.tenant_key == "tenant-b"));
}

#[tokio::test]
async fn document_filter_composes_with_tenant_filter() {
    let app = build_app().await;
    let doc_a = seed_document(&app, "tenant-a", "a.pdf", &["Shared topic text."]).await;
    let doc_b = seed_document(&app, "tenant-b", "b.pdf", &["Shared topic text."]).await;

    let embedder = HashingEmbedder;
    let query = embedder.embed_one("shared topic").await.unwrap();

    // Tenant B asking for tenant A's document id gets zero results, not an
    // error.
    let hits = app
        .db
        .search(
            DOCUMENTS_COLLECTION,
            &query,
            10,
            &["tenant-b".to_string()],
            Some(&[doc_a.id]),
        )
        .await
        .unwrap();
    assert!(hits.is_empty());

    let own = app
        .db
        .search(
            DOCUMENTS_COLLECTION,
            &query,
            10,
            &["tenant-b".to_string()],
            Some(&[doc_b.id]),
        )
        .await
        .unwrap();
    assert_eq!(own.len(), 1);
}

#[tokio::test]
async fn kv_take_is_single_use() {
    let app = build_app().await;
    app.db.set("refresh:u:jti", "hash-value", 60).await.unwrap();

    let first = app.db.take("refresh:u:jti").await.unwrap();
    assert_eq!(first.as_deref(), Some("hash-value"));

    let second = app.db.take("refresh:u:jti").await.unwrap();
    assert!(second.is_none());
}

#[tokio::test]
async fn kv_entries_expire() {
    let app = build_app().await;
    app.db.set("blocklist:x", "revoked", 0).await.unwrap();
    // TTL zero means already expired for reads.
    assert!(app.db.get("blocklist:x").await.unwrap().is_none());

    app.db.set("blocklist:y", "revoked", 120).await.unwrap();
    assert_eq!(app.db.get("blocklist:y").await.unwrap().as_deref(), Some("revoked"));
}

#[tokio::test]
async fn reaper_deletes_exactly_the_expired_anonymous_records() {
    let app = build_app().await;
    let old = Utc::now() - Duration::days(30);

    let expired_anon = format!("{ANON_PREFIX}expired00000000000000000000");
    let fresh_anon = format!("{ANON_PREFIX}fresh0000000000000000000000");

    let expired_doc =
        seed_document_at(&app, &expired_anon, "old.pdf", &["Stale anonymous text."], old).await;
    let fresh_doc =
        seed_document(&app, &fresh_anon, "new.pdf", &["Fresh anonymous text."]).await;
    let user_doc =
        seed_document_at(&app, "3e9d1c64-0000-4000-8000-000000000001", "u.pdf", &["User text."], old)
            .await;

    let reaper = Reaper::new(
        app.db.clone(),
        quarry::config::ReaperConfig {
            hour: 3,
            batch_size: 100,
        },
        7,
    );
    let summary = reaper.run_once().await.unwrap();
    assert_eq!(summary.documents, 1);
    assert_eq!(summary.chunks, 1);
    assert_eq!(summary.vectors, 1);

    // Exactly the expired anonymous document is gone.
    assert!(app.db.get_document(expired_doc.id).await.unwrap().is_none());
    assert!(app.db.get_document(fresh_doc.id).await.unwrap().is_some());
    assert!(app.db.get_document(user_doc.id).await.unwrap().is_some());
}

#[tokio::test]
async fn orphan_sweeper_removes_unanchored_vector_points() {
    let app = build_app().await;
    let doc = seed_document(&app, "tenant-o", "ok.pdf", &["Anchored chunk."]).await;

    // A crash between vector and graph writes leaves this orphan behind.
    let embedder = HashingEmbedder;
    let orphan_id = Uuid::new_v4();
    app.db
        .upsert_point(
            DOCUMENTS_COLLECTION,
            &VectorPoint {
                id: orphan_id,
                tenant_key: "tenant-o".into(),
                document_id: Some(doc.id),
                position: Some(99),
                text: "Orphaned point.".into(),
                metadata: None,
                embedding: embedder.embed_one("Orphaned point.").await.unwrap(),
                created_at: Utc::now(),
            },
        )
        .await
        .unwrap();

    let sweeper = OrphanSweeper::new(app.db.clone(), 50);
    let removed = sweeper.run_once().await.unwrap();
    assert_eq!(removed, 1);

    assert!(app
        .db
        .get_point(DOCUMENTS_COLLECTION, orphan_id)
        .await
        .unwrap()
        .is_none());

    // The anchored point survives.
    let remaining = app
        .db
        .scroll_ids(DOCUMENTS_COLLECTION, 100, 0)
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
}

#[tokio::test]
async fn graph_entity_lookup_is_tenant_scoped() {
    let app = build_app().await;
    let doc = seed_document(&app, "tenant-g", "g.pdf", &["Atlas appears here."]).await;
    let chunk_id = app.db.chunk_ids_for_document(doc.id).await.unwrap()[0];

    let entity = app
        .db
        .upsert_entity("Atlas", "project", "tenant-g")
        .await
        .unwrap();
    app.db
        .link_entity_to_chunk(entity, chunk_id, "tenant-g")
        .await
        .unwrap();

    let hits = app
        .db
        .chunks_by_entities(&["tenant-g".to_string()], &["Atlas".to_string()], 10)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].matched_entities, vec!["Atlas"]);

    // A different tenant asking for the same entity name sees nothing.
    let other = app
        .db
        .chunks_by_entities(&["tenant-x".to_string()], &["Atlas".to_string()], 10)
        .await
        .unwrap();
    assert!(other.is_empty());
}

#[tokio::test]
async fn entity_expansion_is_bounded_and_hop_annotated() {
    let app = build_app().await;
    let doc = seed_document(&app, "tenant-h", "h.pdf", &["Atlas links to many things."]).await;
    let chunk_id = app.db.chunk_ids_for_document(doc.id).await.unwrap()[0];

    let atlas = app
        .db
        .upsert_entity("Atlas", "project", "tenant-h")
        .await
        .unwrap();
    app.db
        .link_entity_to_chunk(atlas, chunk_id, "tenant-h")
        .await
        .unwrap();

    let june = app
        .db
        .upsert_entity("June", "date", "tenant-h")
        .await
        .unwrap();
    app.db
        .relate_entities(atlas, june, "tenant-h", None)
        .await
        .unwrap();

    let maria = app
        .db
        .upsert_entity("Maria", "person", "tenant-h")
        .await
        .unwrap();
    app.db
        .relate_entities(june, maria, "tenant-h", None)
        .await
        .unwrap();

    let context = app
        .db
        .entity_context_for_chunk(chunk_id, &["tenant-h".to_string()], 15)
        .await
        .unwrap();

    let hop1: Vec<_> = context.iter().filter(|e| e.hop == 1).collect();
    let hop2: Vec<_> = context.iter().filter(|e| e.hop == 2).collect();
    assert_eq!(hop1.len(), 1);
    assert_eq!(hop1[0].source_entity, "Atlas");
    assert_eq!(hop1[0].target_entity, "June");
    assert_eq!(hop2.len(), 1);
    assert_eq!(hop2[0].source_entity, "June");
    assert_eq!(hop2[0].target_entity, "Maria");

    // The cap truncates, never expands.
    let capped = app
        .db
        .entity_context_for_chunk(chunk_id, &["tenant-h".to_string()], 1)
        .await
        .unwrap();
    assert_eq!(capped.len(), 1);
}

#[tokio::test]
async fn checkpoint_round_trip() {
    let app = build_app().await;
    use quarry::db::CheckpointStore;
    use quarry::models::{CompareNode, ComparisonState};

    let mut state = ComparisonState::new(
        "compare the things".into(),
        "tenant-c".into(),
        vec![Uuid::new_v4(), Uuid::new_v4()],
    );
    state.similarities.push("both exist".into());
    state.completed_node = Some(CompareNode::Compare);

    app.db.save("tenant-c:doc_compare:s", &state).await.unwrap();
    let loaded = app
        .db
        .load("tenant-c:doc_compare:s")
        .await
        .unwrap()
        .expect("checkpoint exists");
    assert_eq!(loaded.similarities, vec!["both exist"]);
    assert_eq!(loaded.resume_from(), Some(CompareNode::Generate));

    assert!(CheckpointStore::delete(&*app.db, "tenant-c:doc_compare:s").await.unwrap());
    assert!(app.db.load("tenant-c:doc_compare:s").await.unwrap().is_none());
}

#[tokio::test]
async fn embedder_dimension_guard() {
    let app = build_app().await;
    assert_eq!(
        quarry::db::MetadataStore::get_embedding_dimensions(&*app.db)
            .await
            .unwrap(),
        Some(TEST_DIMENSIONS)
    );

    let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder);
    assert_eq!(embedder.dimensions(), TEST_DIMENSIONS);
}
