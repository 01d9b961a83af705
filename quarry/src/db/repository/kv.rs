use chrono::{Duration, Utc};
use libsql::{params, Connection};

use crate::error::Result;

pub struct KvRepository;

impl KvRepository {
    pub async fn set(conn: &Connection, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let expires_at = (Utc::now() + Duration::seconds(ttl_secs as i64)).to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO kv_entries (key, value, expires_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at
            "#,
            params![key, value, expires_at],
        )
        .await?;
        Ok(())
    }

    pub async fn get(conn: &Connection, key: &str) -> Result<Option<String>> {
        let mut rows = conn
            .query(
                "SELECT value FROM kv_entries WHERE key = ?1 AND expires_at > ?2",
                params![key, Utc::now().to_rfc3339()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get::<String>(0)?)),
            None => Ok(None),
        }
    }

    pub async fn delete(conn: &Connection, key: &str) -> Result<bool> {
        let affected = conn
            .execute("DELETE FROM kv_entries WHERE key = ?1", params![key])
            .await?;
        Ok(affected > 0)
    }

    /// Read-and-delete. The DELETE's affected-row count is the arbiter: with
    /// N concurrent takers only one observes `affected = 1` and receives the
    /// value, which is exactly the single-use refresh guarantee.
    pub async fn take(conn: &Connection, key: &str) -> Result<Option<String>> {
        let value = match Self::get(conn, key).await? {
            Some(value) => value,
            None => return Ok(None),
        };

        let affected = conn
            .execute(
                "DELETE FROM kv_entries WHERE key = ?1 AND expires_at > ?2",
                params![key, Utc::now().to_rfc3339()],
            )
            .await?;

        if affected == 1 {
            Ok(Some(value))
        } else {
            Ok(None)
        }
    }

    pub async fn purge_expired(conn: &Connection) -> Result<u64> {
        Ok(conn
            .execute(
                "DELETE FROM kv_entries WHERE expires_at <= ?1",
                params![Utc::now().to_rfc3339()],
            )
            .await?)
    }
}
