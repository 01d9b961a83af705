use chrono::{DateTime, Utc};
use libsql::{params, Connection};
use uuid::Uuid;

use crate::error::{QuarryError, Result};
use crate::models::{Chunk, Document, GraphContext};

use super::super::traits::GraphChunkHit;

/// Build a positional placeholder list `?N, ?N+1, ...` for dynamic IN
/// clauses; values are always bound, never interpolated.
pub(crate) fn placeholders(start_idx: usize, count: usize) -> String {
    (0..count)
        .map(|i| format!("?{}", start_idx + i))
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| QuarryError::Internal(format!("Bad UUID in store: {e}")))
}

pub struct GraphRepository;

impl GraphRepository {
    // -- Documents ---------------------------------------------------------

    pub async fn create_document(conn: &Connection, doc: &Document) -> Result<()> {
        let properties = serde_json::json!({
            "filename": doc.filename,
            "file_type": doc.file_type.to_string(),
            "byte_size": doc.byte_size,
            "upload_time": doc.upload_time.to_rfc3339(),
            "chunk_count": doc.chunk_count,
            "summary_cache": doc.summary_cache,
        });

        conn.execute(
            r#"
            INSERT INTO graph_nodes (id, label, tenant_key, properties, created_at)
            VALUES (?1, 'Document', ?2, ?3, ?4)
            "#,
            params![
                doc.id.to_string(),
                doc.tenant_key.clone(),
                properties.to_string(),
                doc.upload_time.to_rfc3339(),
            ],
        )
        .await?;

        // (User)-[:OWNS]->(Document), only when the tenant has a User node
        // (anonymous tenants do not).
        conn.execute(
            r#"
            INSERT INTO graph_edges (id, src, dst, edge_type, tenant_key, properties, created_at)
            SELECT ?1, id, ?2, 'OWNS', ?3, '{}', ?4
            FROM graph_nodes WHERE id = ?3 AND label = 'User'
            "#,
            params![
                Uuid::new_v4().to_string(),
                doc.id.to_string(),
                doc.tenant_key.clone(),
                doc.upload_time.to_rfc3339(),
            ],
        )
        .await?;

        Ok(())
    }

    fn document_from_row(row: &libsql::Row) -> Result<Document> {
        let id = parse_uuid(&row.get::<String>(0)?)?;
        let tenant_key = row.get::<String>(1)?;
        let properties: serde_json::Value = serde_json::from_str(&row.get::<String>(2)?)?;

        let filename = properties["filename"].as_str().unwrap_or_default().to_string();
        let file_type = properties["file_type"]
            .as_str()
            .unwrap_or("pdf")
            .parse()
            .map_err(QuarryError::Internal)?;
        let byte_size = properties["byte_size"].as_u64().unwrap_or(0);
        let upload_time = properties["upload_time"]
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        let chunk_count = properties["chunk_count"].as_i64().unwrap_or(0);
        let summary_cache = properties["summary_cache"].as_str().map(str::to_string);

        Ok(Document {
            id,
            tenant_key,
            filename,
            file_type,
            byte_size,
            upload_time,
            chunk_count,
            summary_cache,
        })
    }

    pub async fn get_document(conn: &Connection, id: Uuid) -> Result<Option<Document>> {
        let mut rows = conn
            .query(
                r#"
                SELECT id, tenant_key, properties FROM graph_nodes
                WHERE id = ?1 AND label = 'Document'
                "#,
                params![id.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::document_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_documents(
        conn: &Connection,
        tenant_keys: &[String],
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Document>> {
        if tenant_keys.is_empty() {
            return Ok(Vec::new());
        }

        let keys = placeholders(3, tenant_keys.len());
        let query = format!(
            r#"
            SELECT id, tenant_key, properties FROM graph_nodes
            WHERE label = 'Document' AND tenant_key IN ({keys})
            ORDER BY created_at DESC
            LIMIT ?1 OFFSET ?2
            "#
        );

        let mut values: Vec<libsql::Value> =
            vec![libsql::Value::from(limit), libsql::Value::from(offset)];
        values.extend(tenant_keys.iter().cloned().map(libsql::Value::from));

        let mut rows = conn.query(&query, libsql::params_from_iter(values)).await?;
        let mut documents = Vec::new();
        while let Some(row) = rows.next().await? {
            documents.push(Self::document_from_row(&row)?);
        }
        Ok(documents)
    }

    pub async fn update_document_indexed(
        conn: &Connection,
        id: Uuid,
        chunk_count: i64,
        summary_cache: Option<&str>,
    ) -> Result<()> {
        // json_set returns NULL if any argument is NULL, so the summary gets
        // its own statement instead of a nullable bind.
        conn.execute(
            r#"
            UPDATE graph_nodes
            SET properties = json_set(properties, '$.chunk_count', ?2)
            WHERE id = ?1 AND label = 'Document'
            "#,
            params![id.to_string(), chunk_count],
        )
        .await?;

        if let Some(summary) = summary_cache {
            Self::update_document_summary(conn, id, summary).await?;
        }
        Ok(())
    }

    pub async fn update_document_summary(conn: &Connection, id: Uuid, summary: &str) -> Result<()> {
        conn.execute(
            r#"
            UPDATE graph_nodes
            SET properties = json_set(properties, '$.summary_cache', ?2)
            WHERE id = ?1 AND label = 'Document'
            "#,
            params![id.to_string(), summary],
        )
        .await?;
        Ok(())
    }

    pub async fn delete_document_cascade(conn: &Connection, id: Uuid) -> Result<(u64, u64)> {
        let id_str = id.to_string();

        // Edges first, then chunk nodes, then the document node, so a crash
        // mid-way never leaves an edge pointing at a missing node.
        conn.execute(
            r#"
            DELETE FROM graph_edges
            WHERE src = ?1 OR dst = ?1
               OR src IN (SELECT id FROM graph_nodes
                          WHERE label = 'Chunk'
                            AND json_extract(properties, '$.document_id') = ?1)
               OR dst IN (SELECT id FROM graph_nodes
                          WHERE label = 'Chunk'
                            AND json_extract(properties, '$.document_id') = ?1)
            "#,
            params![id_str.clone()],
        )
        .await?;

        let chunks = conn
            .execute(
                r#"
                DELETE FROM graph_nodes
                WHERE label = 'Chunk' AND json_extract(properties, '$.document_id') = ?1
                "#,
                params![id_str.clone()],
            )
            .await?;

        let documents = conn
            .execute(
                "DELETE FROM graph_nodes WHERE id = ?1 AND label = 'Document'",
                params![id_str],
            )
            .await?;

        Ok((documents, chunks))
    }

    // -- Chunks ------------------------------------------------------------

    pub async fn create_chunk(conn: &Connection, chunk: &Chunk) -> Result<()> {
        let properties = serde_json::json!({
            "document_id": chunk.document_id.to_string(),
            "position": chunk.position,
            "text": chunk.text,
        });
        let now = Utc::now().to_rfc3339();

        // OR IGNORE keeps a retried ingest of the same document id idempotent.
        conn.execute(
            r#"
            INSERT OR IGNORE INTO graph_nodes (id, label, tenant_key, properties, created_at)
            VALUES (?1, 'Chunk', ?2, ?3, ?4)
            "#,
            params![
                chunk.id.to_string(),
                chunk.tenant_key.clone(),
                properties.to_string(),
                now.clone(),
            ],
        )
        .await?;

        conn.execute(
            r#"
            INSERT INTO graph_edges (id, src, dst, edge_type, tenant_key, properties, created_at)
            SELECT ?1, ?2, ?3, 'CONTAINS', ?4, '{}', ?5
            WHERE NOT EXISTS (
                SELECT 1 FROM graph_edges
                WHERE src = ?2 AND dst = ?3 AND edge_type = 'CONTAINS'
            )
            "#,
            params![
                Uuid::new_v4().to_string(),
                chunk.document_id.to_string(),
                chunk.id.to_string(),
                chunk.tenant_key.clone(),
                now,
            ],
        )
        .await?;

        Ok(())
    }

    pub async fn chunk_ids_for_document(
        conn: &Connection,
        document_id: Uuid,
    ) -> Result<Vec<Uuid>> {
        let mut rows = conn
            .query(
                r#"
                SELECT id FROM graph_nodes
                WHERE label = 'Chunk' AND json_extract(properties, '$.document_id') = ?1
                ORDER BY json_extract(properties, '$.position')
                "#,
                params![document_id.to_string()],
            )
            .await?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            ids.push(parse_uuid(&row.get::<String>(0)?)?);
        }
        Ok(ids)
    }

    pub async fn chunks_for_document(conn: &Connection, document_id: Uuid) -> Result<Vec<Chunk>> {
        let mut rows = conn
            .query(
                r#"
                SELECT id, tenant_key,
                       json_extract(properties, '$.position'),
                       json_extract(properties, '$.text')
                FROM graph_nodes
                WHERE label = 'Chunk' AND json_extract(properties, '$.document_id') = ?1
                ORDER BY json_extract(properties, '$.position')
                "#,
                params![document_id.to_string()],
            )
            .await?;

        let mut chunks = Vec::new();
        while let Some(row) = rows.next().await? {
            chunks.push(Chunk {
                id: parse_uuid(&row.get::<String>(0)?)?,
                document_id,
                tenant_key: row.get::<String>(1)?,
                position: row.get::<i64>(2)?,
                text: row.get::<String>(3)?,
            });
        }
        Ok(chunks)
    }

    pub async fn existing_chunk_ids(conn: &Connection, ids: &[Uuid]) -> Result<Vec<Uuid>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let marks = placeholders(1, ids.len());
        let query =
            format!("SELECT id FROM graph_nodes WHERE label = 'Chunk' AND id IN ({marks})");
        let values: Vec<libsql::Value> = ids
            .iter()
            .map(|id| libsql::Value::from(id.to_string()))
            .collect();

        let mut rows = conn.query(&query, libsql::params_from_iter(values)).await?;
        let mut found = Vec::new();
        while let Some(row) = rows.next().await? {
            found.push(parse_uuid(&row.get::<String>(0)?)?);
        }
        Ok(found)
    }

    // -- Entities ----------------------------------------------------------

    pub async fn upsert_entity(
        conn: &Connection,
        name: &str,
        entity_type: &str,
        tenant_key: &str,
    ) -> Result<Uuid> {
        let mut rows = conn
            .query(
                r#"
                SELECT id FROM graph_nodes
                WHERE label = 'Entity' AND tenant_key = ?1
                  AND LOWER(json_extract(properties, '$.name')) = LOWER(?2)
                LIMIT 1
                "#,
                params![tenant_key, name],
            )
            .await?;

        if let Some(row) = rows.next().await? {
            return parse_uuid(&row.get::<String>(0)?);
        }

        let id = Uuid::new_v4();
        let properties = serde_json::json!({ "name": name, "type": entity_type });
        conn.execute(
            r#"
            INSERT INTO graph_nodes (id, label, tenant_key, properties, created_at)
            VALUES (?1, 'Entity', ?2, ?3, ?4)
            "#,
            params![
                id.to_string(),
                tenant_key,
                properties.to_string(),
                Utc::now().to_rfc3339(),
            ],
        )
        .await?;

        Ok(id)
    }

    pub async fn link_entity_to_chunk(
        conn: &Connection,
        entity_id: Uuid,
        chunk_id: Uuid,
        tenant_key: &str,
    ) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO graph_edges (id, src, dst, edge_type, tenant_key, properties, created_at)
            SELECT ?1, ?2, ?3, 'APPEARS_IN', ?4, '{}', ?5
            WHERE NOT EXISTS (
                SELECT 1 FROM graph_edges
                WHERE src = ?2 AND dst = ?3 AND edge_type = 'APPEARS_IN'
            )
            "#,
            params![
                Uuid::new_v4().to_string(),
                entity_id.to_string(),
                chunk_id.to_string(),
                tenant_key,
                Utc::now().to_rfc3339(),
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn relate_entities(
        conn: &Connection,
        src: Uuid,
        dst: Uuid,
        tenant_key: &str,
        memory_id: Option<Uuid>,
    ) -> Result<()> {
        let properties = match memory_id {
            Some(id) => serde_json::json!({ "memory_id": id.to_string() }).to_string(),
            None => "{}".to_string(),
        };

        conn.execute(
            r#"
            INSERT INTO graph_edges (id, src, dst, edge_type, tenant_key, properties, created_at)
            VALUES (?1, ?2, ?3, 'RELATES_TO', ?4, ?5, ?6)
            "#,
            params![
                Uuid::new_v4().to_string(),
                src.to_string(),
                dst.to_string(),
                tenant_key,
                properties,
                Utc::now().to_rfc3339(),
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn chunks_by_entities(
        conn: &Connection,
        tenant_keys: &[String],
        names: &[String],
        limit: u32,
    ) -> Result<Vec<GraphChunkHit>> {
        if tenant_keys.is_empty() || names.is_empty() {
            return Ok(Vec::new());
        }

        let key_marks = placeholders(2, tenant_keys.len());
        let name_start = 2 + tenant_keys.len();
        let name_marks = placeholders(name_start, names.len());

        let query = format!(
            r#"
            SELECT
                c.id,
                json_extract(c.properties, '$.document_id'),
                c.tenant_key,
                json_extract(c.properties, '$.position'),
                json_extract(c.properties, '$.text'),
                json_extract(d.properties, '$.filename'),
                json_extract(e.properties, '$.name')
            FROM graph_nodes e
            JOIN graph_edges a ON a.src = e.id AND a.edge_type = 'APPEARS_IN'
            JOIN graph_nodes c ON c.id = a.dst AND c.label = 'Chunk'
            JOIN graph_nodes d ON d.id = json_extract(c.properties, '$.document_id')
                              AND d.label = 'Document'
            WHERE e.label = 'Entity'
              AND e.tenant_key IN ({key_marks})
              AND c.tenant_key IN ({key_marks})
              AND LOWER(json_extract(e.properties, '$.name')) IN ({name_marks})
            LIMIT ?1
            "#
        );

        let mut values: Vec<libsql::Value> = vec![libsql::Value::from(limit)];
        values.extend(tenant_keys.iter().cloned().map(libsql::Value::from));
        values.extend(names.iter().map(|n| libsql::Value::from(n.to_lowercase())));

        let mut rows = conn.query(&query, libsql::params_from_iter(values)).await?;

        // One row per (chunk, entity) pair; fold matched entities per chunk.
        let mut hits: Vec<GraphChunkHit> = Vec::new();
        while let Some(row) = rows.next().await? {
            let chunk_id = parse_uuid(&row.get::<String>(0)?)?;
            let entity = row.get::<String>(6)?;

            if let Some(existing) = hits.iter_mut().find(|h| h.chunk.id == chunk_id) {
                if !existing.matched_entities.contains(&entity) {
                    existing.matched_entities.push(entity);
                }
                continue;
            }

            hits.push(GraphChunkHit {
                chunk: Chunk {
                    id: chunk_id,
                    document_id: parse_uuid(&row.get::<String>(1)?)?,
                    tenant_key: row.get::<String>(2)?,
                    position: row.get::<i64>(3)?,
                    text: row.get::<String>(4)?,
                },
                filename: row.get::<String>(5)?,
                matched_entities: vec![entity],
            });
        }

        Ok(hits)
    }

    pub async fn entity_context_for_chunk(
        conn: &Connection,
        chunk_id: Uuid,
        tenant_keys: &[String],
        limit: u32,
    ) -> Result<Vec<GraphContext>> {
        if tenant_keys.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let key_marks = placeholders(3, tenant_keys.len());
        let mut values: Vec<libsql::Value> = vec![
            libsql::Value::from(chunk_id.to_string()),
            libsql::Value::from(limit),
        ];
        values.extend(tenant_keys.iter().cloned().map(libsql::Value::from));

        // Hop 1: RELATES_TO edges out of entities appearing in this chunk.
        let hop1_query = format!(
            r#"
            SELECT
                json_extract(e1.properties, '$.name'),
                r.edge_type,
                json_extract(e2.properties, '$.name'),
                e2.id
            FROM graph_edges a
            JOIN graph_nodes e1 ON e1.id = a.src AND e1.label = 'Entity'
            JOIN graph_edges r ON r.src = e1.id AND r.edge_type = 'RELATES_TO'
            JOIN graph_nodes e2 ON e2.id = r.dst AND e2.label = 'Entity'
            WHERE a.dst = ?1 AND a.edge_type = 'APPEARS_IN'
              AND e1.tenant_key IN ({key_marks})
              AND e2.tenant_key IN ({key_marks})
            LIMIT ?2
            "#
        );

        let mut rows = conn
            .query(&hop1_query, libsql::params_from_iter(values.clone()))
            .await?;

        let mut context = Vec::new();
        let mut frontier: Vec<String> = Vec::new();
        while let Some(row) = rows.next().await? {
            context.push(GraphContext {
                chunk_id,
                source_entity: row.get::<String>(0)?,
                edge_type: row.get::<String>(1)?,
                target_entity: row.get::<String>(2)?,
                hop: 1,
            });
            frontier.push(row.get::<String>(3)?);
        }

        let remaining = limit as usize - context.len().min(limit as usize);
        if remaining == 0 || frontier.is_empty() {
            context.truncate(limit as usize);
            return Ok(context);
        }

        // Hop 2: one further RELATES_TO step from the hop-1 targets.
        frontier.sort();
        frontier.dedup();
        let hop2_key_marks = placeholders(2, tenant_keys.len());
        let frontier_marks = placeholders(2 + tenant_keys.len(), frontier.len());
        let hop2_query = format!(
            r#"
            SELECT
                json_extract(e2.properties, '$.name'),
                r.edge_type,
                json_extract(e3.properties, '$.name')
            FROM graph_edges r
            JOIN graph_nodes e2 ON e2.id = r.src AND e2.label = 'Entity'
            JOIN graph_nodes e3 ON e3.id = r.dst AND e3.label = 'Entity'
            WHERE r.edge_type = 'RELATES_TO'
              AND e3.tenant_key IN ({hop2_key_marks})
              AND e2.id IN ({frontier_marks})
            LIMIT ?1
            "#
        );

        let mut hop2_values: Vec<libsql::Value> = vec![libsql::Value::from(remaining as u32)];
        hop2_values.extend(tenant_keys.iter().cloned().map(libsql::Value::from));
        hop2_values.extend(frontier.into_iter().map(libsql::Value::from));

        let mut rows = conn
            .query(&hop2_query, libsql::params_from_iter(hop2_values))
            .await?;
        while let Some(row) = rows.next().await? {
            context.push(GraphContext {
                chunk_id,
                source_entity: row.get::<String>(0)?,
                edge_type: row.get::<String>(1)?,
                target_entity: row.get::<String>(2)?,
                hop: 2,
            });
        }

        context.truncate(limit as usize);
        Ok(context)
    }

    pub async fn delete_memory_subgraph(
        conn: &Connection,
        tenant_key: &str,
        memory_id: Uuid,
    ) -> Result<u64> {
        let edges = conn
            .execute(
                r#"
                DELETE FROM graph_edges
                WHERE tenant_key = ?1
                  AND json_extract(properties, '$.memory_id') = ?2
                "#,
                params![tenant_key, memory_id.to_string()],
            )
            .await?;

        // Entity nodes left without any edge are garbage once their last
        // memory is gone.
        conn.execute(
            r#"
            DELETE FROM graph_nodes
            WHERE label = 'Entity' AND tenant_key = ?1
              AND id NOT IN (SELECT src FROM graph_edges)
              AND id NOT IN (SELECT dst FROM graph_edges)
            "#,
            params![tenant_key],
        )
        .await?;

        Ok(edges)
    }

    // -- Users & tenancy ---------------------------------------------------

    pub async fn create_user_node(conn: &Connection, user_id: Uuid, email: &str) -> Result<()> {
        let properties = serde_json::json!({ "email": email });
        conn.execute(
            r#"
            INSERT OR IGNORE INTO graph_nodes (id, label, tenant_key, properties, created_at)
            VALUES (?1, 'User', ?2, ?3, ?4)
            "#,
            params![
                user_id.to_string(),
                user_id.to_string(),
                properties.to_string(),
                Utc::now().to_rfc3339(),
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn migrate_tenant(conn: &Connection, from: &str, to: &str) -> Result<(u64, u64)> {
        let documents = conn
            .execute(
                "UPDATE graph_nodes SET tenant_key = ?2 WHERE tenant_key = ?1 AND label = 'Document'",
                params![from, to],
            )
            .await?;
        let chunks = conn
            .execute(
                "UPDATE graph_nodes SET tenant_key = ?2 WHERE tenant_key = ?1 AND label = 'Chunk'",
                params![from, to],
            )
            .await?;
        conn.execute(
            "UPDATE graph_nodes SET tenant_key = ?2 WHERE tenant_key = ?1",
            params![from, to],
        )
        .await?;
        conn.execute(
            "UPDATE graph_edges SET tenant_key = ?2 WHERE tenant_key = ?1",
            params![from, to],
        )
        .await?;

        Ok((documents, chunks))
    }

    pub async fn reap_expired(
        conn: &Connection,
        prefix: &str,
        cutoff: DateTime<Utc>,
        batch: u32,
    ) -> Result<(u64, u64)> {
        // LIKE with a trailing % keeps this an index range scan; the prefix
        // itself contains no wildcard characters.
        let pattern = format!("{prefix}%");

        let mut rows = conn
            .query(
                r#"
                SELECT id FROM graph_nodes
                WHERE label = 'Document' AND tenant_key LIKE ?1 AND created_at < ?2
                LIMIT ?3
                "#,
                params![pattern.clone(), cutoff.to_rfc3339(), batch],
            )
            .await?;

        let mut doc_ids = Vec::new();
        while let Some(row) = rows.next().await? {
            doc_ids.push(parse_uuid(&row.get::<String>(0)?)?);
        }

        let mut documents = 0u64;
        let mut chunks = 0u64;
        for id in doc_ids {
            let (d, c) = Self::delete_document_cascade(conn, id).await?;
            documents += d;
            chunks += c;
        }

        // Expired anonymous entity nodes and their edges go with them.
        conn.execute(
            r#"
            DELETE FROM graph_edges
            WHERE tenant_key LIKE ?1 AND created_at < ?2
              AND (src IN (SELECT id FROM graph_nodes
                           WHERE label = 'Entity' AND tenant_key LIKE ?1 AND created_at < ?2)
                OR dst IN (SELECT id FROM graph_nodes
                           WHERE label = 'Entity' AND tenant_key LIKE ?1 AND created_at < ?2))
            "#,
            params![pattern.clone(), cutoff.to_rfc3339()],
        )
        .await?;
        conn.execute(
            r#"
            DELETE FROM graph_nodes
            WHERE label = 'Entity' AND tenant_key LIKE ?1 AND created_at < ?2
              AND id NOT IN (SELECT src FROM graph_edges)
              AND id NOT IN (SELECT dst FROM graph_edges)
            "#,
            params![pattern, cutoff.to_rfc3339()],
        )
        .await?;

        Ok((documents, chunks))
    }
}
