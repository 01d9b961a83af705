use chrono::{DateTime, Utc};
use libsql::{params, Connection, Row};
use uuid::Uuid;

use crate::error::{QuarryError, Result};
use crate::models::User;

pub struct UserRepository;

impl UserRepository {
    fn from_row(row: &Row) -> Result<User> {
        let id = Uuid::parse_str(&row.get::<String>(0)?)
            .map_err(|e| QuarryError::Internal(format!("Bad UUID in store: {e}")))?;
        let role = row
            .get::<String>(3)?
            .parse()
            .map_err(QuarryError::Internal)?;
        let created_at = DateTime::parse_from_rfc3339(&row.get::<String>(4)?)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(User {
            id,
            email: row.get::<String>(1)?,
            password_hash: row.get::<String>(2)?,
            role,
            created_at,
        })
    }

    pub async fn create(conn: &Connection, user: &User) -> Result<()> {
        let affected = conn
            .execute(
                r#"
                INSERT OR IGNORE INTO users (id, email, password_hash, role, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    user.id.to_string(),
                    user.email.clone(),
                    user.password_hash.clone(),
                    user.role.to_string(),
                    user.created_at.to_rfc3339(),
                ],
            )
            .await?;

        if affected == 0 {
            return Err(QuarryError::Conflict(format!(
                "Account already exists for {}",
                user.email
            )));
        }
        Ok(())
    }

    pub async fn get_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
        let mut rows = conn
            .query(
                "SELECT id, email, password_hash, role, created_at FROM users WHERE email = ?1",
                params![email],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn get_by_id(conn: &Connection, id: Uuid) -> Result<Option<User>> {
        let mut rows = conn
            .query(
                "SELECT id, email, password_hash, role, created_at FROM users WHERE id = ?1",
                params![id.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::from_row(&row)?)),
            None => Ok(None),
        }
    }
}
