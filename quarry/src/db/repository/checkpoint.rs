use chrono::Utc;
use libsql::{params, Connection};

use crate::error::Result;
use crate::models::ComparisonState;

pub struct CheckpointRepository;

impl CheckpointRepository {
    pub async fn save(conn: &Connection, thread_id: &str, state: &ComparisonState) -> Result<()> {
        let node = state
            .completed_node
            .map(|n| serde_json::to_string(&n))
            .transpose()?
            .unwrap_or_else(|| "null".to_string());

        conn.execute(
            r#"
            INSERT INTO checkpoints (thread_id, node, state, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (thread_id) DO UPDATE SET
                node = excluded.node,
                state = excluded.state,
                updated_at = excluded.updated_at
            "#,
            params![
                thread_id,
                node,
                serde_json::to_string(state)?,
                Utc::now().to_rfc3339(),
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn load(conn: &Connection, thread_id: &str) -> Result<Option<ComparisonState>> {
        let mut rows = conn
            .query(
                "SELECT state FROM checkpoints WHERE thread_id = ?1",
                params![thread_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => {
                let state: ComparisonState = serde_json::from_str(&row.get::<String>(0)?)?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    pub async fn delete(conn: &Connection, thread_id: &str) -> Result<bool> {
        let affected = conn
            .execute(
                "DELETE FROM checkpoints WHERE thread_id = ?1",
                params![thread_id],
            )
            .await?;
        Ok(affected > 0)
    }
}
