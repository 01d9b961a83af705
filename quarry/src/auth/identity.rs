use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;

use crate::config::ANON_PREFIX;
use crate::error::Result;
use crate::models::{is_valid_anon_id, Principal};

use super::tokens::TokenService;

/// Name of the anonymous session cookie.
pub const SESSION_COOKIE: &str = "session_id";

/// Outcome of identity resolution: the principal, the verified claims when a
/// bearer token was presented, plus a cookie value to set when a fresh
/// anonymous session was minted.
#[derive(Debug, Clone)]
pub struct ResolvedIdentity {
    pub principal: Principal,
    pub claims: Option<crate::models::Claims>,
    pub set_cookie: Option<String>,
}

/// Produces a `Principal` for every inbound request.
///
/// Resolution order: valid bearer token wins; then a well-formed anonymous
/// cookie; otherwise a fresh anonymous session is minted. An invalid bearer
/// token is a hard `Unauthorized`, never a silent downgrade to anonymous.
#[derive(Clone)]
pub struct IdentityGateway {
    tokens: TokenService,
}

impl IdentityGateway {
    pub fn new(tokens: TokenService) -> Self {
        Self { tokens }
    }

    pub async fn resolve(
        &self,
        bearer: Option<&str>,
        cookie: Option<&str>,
    ) -> Result<ResolvedIdentity> {
        if let Some(token) = bearer {
            let claims = self.tokens.verify_access(token).await?;
            return Ok(ResolvedIdentity {
                principal: Principal::Authenticated {
                    user_id: claims.user_id,
                    email: claims.sub.clone(),
                    role: claims.role,
                },
                claims: Some(claims),
                set_cookie: None,
            });
        }

        if let Some(value) = cookie.filter(|v| is_valid_anon_id(v)) {
            return Ok(ResolvedIdentity {
                principal: Principal::Anonymous {
                    session_id: value.to_string(),
                },
                claims: None,
                set_cookie: None,
            });
        }

        let session_id = mint_anon_id();
        Ok(ResolvedIdentity {
            principal: Principal::Anonymous {
                session_id: session_id.clone(),
            },
            claims: None,
            set_cookie: Some(session_id),
        })
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }
}

/// Mint an anonymous session id: `anon_` plus 192 bits of CSPRNG entropy,
/// base64url without padding.
pub fn mint_anon_id() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{ANON_PREFIX}{}", URL_SAFE_NO_PAD.encode(bytes))
}
