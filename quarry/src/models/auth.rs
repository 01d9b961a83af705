use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Role;

/// A registered account. Password hashing is delegated to the auth module;
/// only the hash is ever stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Claims carried by both access and refresh tokens. Refresh tokens add
/// `token_type: "refresh"`; access tokens omit the field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the account email.
    pub sub: String,
    pub user_id: Uuid,
    pub role: Role,
    /// Unique token id; blocklisting and refresh records key on it.
    pub jti: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl Claims {
    pub fn is_refresh(&self) -> bool {
        self.token_type.as_deref() == Some("refresh")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Per-section counts reported after an anonymous session is promoted.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrationStats {
    pub documents: u64,
    pub chunks: u64,
    pub vectors: u64,
    pub memories: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_claims_are_tagged() {
        let claims = Claims {
            sub: "a@b.c".into(),
            user_id: Uuid::new_v4(),
            role: Role::User,
            jti: "x".into(),
            exp: 0,
            iat: 0,
            token_type: Some("refresh".into()),
        };
        assert!(claims.is_refresh());
    }

    #[test]
    fn access_claims_omit_token_type() {
        let claims = Claims {
            sub: "a@b.c".into(),
            user_id: Uuid::new_v4(),
            role: Role::User,
            jti: "x".into(),
            exp: 0,
            iat: 0,
            token_type: None,
        };
        assert!(!claims.is_refresh());
        let json = serde_json::to_value(&claims).unwrap();
        assert!(json.get("token_type").is_none());
    }
}
