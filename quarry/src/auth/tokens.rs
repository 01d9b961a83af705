use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::db::{DatabaseBackend, BLOCKLIST_PREFIX, REFRESH_PREFIX};
use crate::error::{QuarryError, Result};
use crate::models::{Claims, TokenPair, User};

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Issues, verifies and rotates HS256 token pairs. Refresh tokens are
/// single-use: the stored hash is consumed atomically on rotation, so a
/// replayed token finds nothing and is treated as theft.
#[derive(Clone)]
pub struct TokenService {
    db: Arc<dyn DatabaseBackend>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_lifetime_secs: u64,
    refresh_lifetime_secs: u64,
}

impl TokenService {
    pub fn new(config: &AuthConfig, db: Arc<dyn DatabaseBackend>) -> Result<Self> {
        if config.jwt_secret.len() < 32 {
            return Err(QuarryError::Validation(
                "JWT_SECRET must be at least 32 bytes".into(),
            ));
        }

        Ok(Self {
            db,
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            access_lifetime_secs: config.access_lifetime_secs,
            refresh_lifetime_secs: config.refresh_lifetime_secs,
        })
    }

    fn claims_for(&self, user: &User, lifetime_secs: u64, refresh: bool) -> Claims {
        let now = Utc::now().timestamp();
        Claims {
            sub: user.email.clone(),
            user_id: user.id,
            role: user.role,
            jti: Uuid::new_v4().to_string(),
            exp: now + lifetime_secs as i64,
            iat: now,
            token_type: refresh.then(|| "refresh".to_string()),
        }
    }

    fn encode_claims(&self, claims: &Claims) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| QuarryError::Internal(format!("Token encoding failed: {e}")))
    }

    fn decode_claims(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| QuarryError::Unauthorized)
    }

    /// Issue a fresh access/refresh pair and persist the refresh hash.
    pub async fn issue_pair(&self, user: &User) -> Result<TokenPair> {
        let access_claims = self.claims_for(user, self.access_lifetime_secs, false);
        let refresh_claims = self.claims_for(user, self.refresh_lifetime_secs, true);

        let access = self.encode_claims(&access_claims)?;
        let refresh = self.encode_claims(&refresh_claims)?;

        let key = format!("{REFRESH_PREFIX}{}:{}", user.id, refresh_claims.jti);
        self.db
            .set(&key, &sha256_hex(&refresh), self.refresh_lifetime_secs)
            .await?;

        Ok(TokenPair { access, refresh })
    }

    /// Verify an access token: signature, expiry, type, blocklist.
    pub async fn verify_access(&self, token: &str) -> Result<Claims> {
        let claims = self.decode_claims(token)?;
        if claims.is_refresh() {
            return Err(QuarryError::Unauthorized);
        }

        let key = format!("{BLOCKLIST_PREFIX}{}", claims.jti);
        if self.db.get(&key).await?.is_some() {
            return Err(QuarryError::Unauthorized);
        }

        Ok(claims)
    }

    /// Single-use rotation. Consuming the stored hash is the only way a
    /// refresh token is spent; a second presentation finds no record.
    pub async fn rotate_refresh(&self, token: &str) -> Result<TokenPair> {
        let claims = self.decode_claims(token)?;
        if !claims.is_refresh() {
            return Err(QuarryError::Unauthorized);
        }

        let key = format!("{REFRESH_PREFIX}{}:{}", claims.user_id, claims.jti);
        let stored = match self.db.take(&key).await? {
            Some(stored) => stored,
            // Absent record: already spent or never issued. Theft signal.
            None => return Err(QuarryError::Unauthorized),
        };

        if stored != sha256_hex(token) {
            return Err(QuarryError::Unauthorized);
        }

        let user = self
            .db
            .get_user_by_id(claims.user_id)
            .await?
            .ok_or(QuarryError::Unauthorized)?;

        self.issue_pair(&user).await
    }

    /// Blocklist an access token for its remaining lifetime.
    pub async fn blocklist(&self, claims: &Claims) -> Result<()> {
        let remaining = claims.exp - Utc::now().timestamp();
        if remaining <= 0 {
            return Ok(());
        }

        let key = format!("{BLOCKLIST_PREFIX}{}", claims.jti);
        self.db.set(&key, "revoked", remaining as u64).await
    }
}
