use chrono::{DateTime, Utc};
use libsql::{params, Connection};
use uuid::Uuid;

use crate::error::{QuarryError, Result};

use super::super::traits::{ScrolledPoint, VectorHit, VectorPoint};
use super::graph::placeholders;

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| QuarryError::Internal(format!("Bad UUID in store: {e}")))
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub struct VectorRepository;

impl VectorRepository {
    pub async fn upsert(conn: &Connection, collection: &str, point: &VectorPoint) -> Result<()> {
        let embedding_json = serde_json::to_string(&point.embedding)?;
        let metadata = point.metadata.as_ref().map(|m| m.to_string());

        conn.execute(
            r#"
            INSERT INTO vector_points
                (id, collection, tenant_key, document_id, position, text, metadata, embedding, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, vector32(?8), ?9)
            ON CONFLICT (collection, id) DO UPDATE SET
                tenant_key = excluded.tenant_key,
                document_id = excluded.document_id,
                position = excluded.position,
                text = excluded.text,
                metadata = excluded.metadata,
                embedding = excluded.embedding
            "#,
            params![
                point.id.to_string(),
                collection,
                point.tenant_key.clone(),
                point.document_id.map(|id| id.to_string()),
                point.position,
                point.text.clone(),
                metadata,
                embedding_json,
                point.created_at.to_rfc3339(),
            ],
        )
        .await?;

        Ok(())
    }

    pub async fn upsert_batch(
        conn: &Connection,
        collection: &str,
        points: &[VectorPoint],
    ) -> Result<()> {
        for point in points {
            Self::upsert(conn, collection, point).await?;
        }
        Ok(())
    }

    pub async fn search(
        conn: &Connection,
        collection: &str,
        embedding: &[f32],
        limit: u32,
        tenant_keys: &[String],
        document_ids: Option<&[Uuid]>,
    ) -> Result<Vec<VectorHit>> {
        if tenant_keys.is_empty() {
            return Ok(Vec::new());
        }

        let embedding_json = serde_json::to_string(embedding)?;

        // Fixed params: ?1 = embedding, ?2 = collection, ?3 = limit.
        let key_marks = placeholders(4, tenant_keys.len());
        let mut values: Vec<libsql::Value> = vec![
            libsql::Value::from(embedding_json),
            libsql::Value::from(collection.to_string()),
            libsql::Value::from(limit),
        ];
        values.extend(tenant_keys.iter().cloned().map(libsql::Value::from));

        let doc_clause = match document_ids {
            Some(ids) if !ids.is_empty() => {
                let marks = placeholders(4 + tenant_keys.len(), ids.len());
                values.extend(ids.iter().map(|id| libsql::Value::from(id.to_string())));
                format!("AND document_id IN ({marks})")
            }
            Some(_) => return Ok(Vec::new()),
            None => String::new(),
        };

        let query = format!(
            r#"
            SELECT
                id, tenant_key, document_id, position, text, metadata, created_at,
                1 - vector_distance_cos(embedding, vector32(?1)) AS score
            FROM vector_points
            WHERE collection = ?2
              AND embedding IS NOT NULL
              AND tenant_key IN ({key_marks})
              {doc_clause}
            ORDER BY score DESC
            LIMIT ?3
            "#
        );

        let mut rows = conn.query(&query, libsql::params_from_iter(values)).await?;
        let mut hits = Vec::new();
        while let Some(row) = rows.next().await? {
            let document_id = match row.get::<Option<String>>(2)? {
                Some(raw) => Some(parse_uuid(&raw)?),
                None => None,
            };
            let metadata = row
                .get::<Option<String>>(5)?
                .and_then(|raw| serde_json::from_str(&raw).ok());

            hits.push(VectorHit {
                id: parse_uuid(&row.get::<String>(0)?)?,
                tenant_key: row.get::<String>(1)?,
                document_id,
                position: row.get::<Option<i64>>(3)?,
                text: row.get::<String>(4)?,
                metadata,
                created_at: parse_timestamp(&row.get::<String>(6)?),
                score: row.get::<f64>(7)? as f32,
            });
        }

        Ok(hits)
    }

    pub async fn get_point(
        conn: &Connection,
        collection: &str,
        id: Uuid,
    ) -> Result<Option<ScrolledPoint>> {
        let mut rows = conn
            .query(
                r#"
                SELECT id, tenant_key, text, metadata, created_at
                FROM vector_points
                WHERE collection = ?1 AND id = ?2
                "#,
                params![collection, id.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => {
                let metadata = row
                    .get::<Option<String>>(3)?
                    .and_then(|raw| serde_json::from_str(&raw).ok());
                Ok(Some(ScrolledPoint {
                    id: parse_uuid(&row.get::<String>(0)?)?,
                    tenant_key: row.get::<String>(1)?,
                    text: row.get::<String>(2)?,
                    metadata,
                    created_at: parse_timestamp(&row.get::<String>(4)?),
                }))
            }
            None => Ok(None),
        }
    }

    pub async fn delete_points(conn: &Connection, collection: &str, ids: &[Uuid]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let marks = placeholders(2, ids.len());
        let query =
            format!("DELETE FROM vector_points WHERE collection = ?1 AND id IN ({marks})");
        let mut values: Vec<libsql::Value> = vec![libsql::Value::from(collection.to_string())];
        values.extend(ids.iter().map(|id| libsql::Value::from(id.to_string())));

        Ok(conn.execute(&query, libsql::params_from_iter(values)).await?)
    }

    pub async fn delete_by_document(
        conn: &Connection,
        collection: &str,
        document_id: Uuid,
    ) -> Result<u64> {
        Ok(conn
            .execute(
                "DELETE FROM vector_points WHERE collection = ?1 AND document_id = ?2",
                params![collection, document_id.to_string()],
            )
            .await?)
    }

    pub async fn scroll(
        conn: &Connection,
        collection: &str,
        tenant_key: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ScrolledPoint>> {
        let mut rows = conn
            .query(
                r#"
                SELECT id, tenant_key, text, metadata, created_at
                FROM vector_points
                WHERE collection = ?1 AND tenant_key = ?2
                ORDER BY created_at DESC, id
                LIMIT ?3 OFFSET ?4
                "#,
                params![collection, tenant_key, limit, offset],
            )
            .await?;

        let mut points = Vec::new();
        while let Some(row) = rows.next().await? {
            let metadata = row
                .get::<Option<String>>(3)?
                .and_then(|raw| serde_json::from_str(&raw).ok());
            points.push(ScrolledPoint {
                id: parse_uuid(&row.get::<String>(0)?)?,
                tenant_key: row.get::<String>(1)?,
                text: row.get::<String>(2)?,
                metadata,
                created_at: parse_timestamp(&row.get::<String>(4)?),
            });
        }
        Ok(points)
    }

    pub async fn scroll_ids(
        conn: &Connection,
        collection: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Uuid>> {
        let mut rows = conn
            .query(
                r#"
                SELECT id FROM vector_points
                WHERE collection = ?1
                ORDER BY id
                LIMIT ?2 OFFSET ?3
                "#,
                params![collection, limit, offset],
            )
            .await?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            ids.push(parse_uuid(&row.get::<String>(0)?)?);
        }
        Ok(ids)
    }

    pub async fn migrate_tenant(
        conn: &Connection,
        collection: &str,
        from: &str,
        to: &str,
    ) -> Result<u64> {
        Ok(conn
            .execute(
                "UPDATE vector_points SET tenant_key = ?3 WHERE collection = ?1 AND tenant_key = ?2",
                params![collection, from, to],
            )
            .await?)
    }

    pub async fn count_by_tenant(
        conn: &Connection,
        collection: &str,
        tenant_key: &str,
    ) -> Result<u64> {
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM vector_points WHERE collection = ?1 AND tenant_key = ?2",
                params![collection, tenant_key],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)? as u64),
            None => Ok(0),
        }
    }

    pub async fn reap_expired(
        conn: &Connection,
        collection: &str,
        prefix: &str,
        cutoff: DateTime<Utc>,
        batch: u32,
    ) -> Result<u64> {
        let pattern = format!("{prefix}%");
        Ok(conn
            .execute(
                r#"
                DELETE FROM vector_points
                WHERE rowid IN (
                    SELECT rowid FROM vector_points
                    WHERE collection = ?1 AND tenant_key LIKE ?2 AND created_at < ?3
                    LIMIT ?4
                )
                "#,
                params![collection, pattern, cutoff.to_rfc3339(), batch],
            )
            .await?)
    }
}
