use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ANON_PREFIX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// The acting identity of a request. Created once by the identity gateway
/// and immutable for the request's lifetime. Every store call derives its
/// tenant filter from this value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Principal {
    Authenticated {
        user_id: Uuid,
        email: String,
        role: Role,
    },
    Anonymous {
        session_id: String,
    },
}

impl Principal {
    /// The string every store access is filtered by.
    pub fn tenant_key(&self) -> String {
        match self {
            Self::Authenticated { user_id, .. } => user_id.to_string(),
            Self::Anonymous { session_id } => session_id.clone(),
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            Self::Authenticated {
                role: Role::Admin,
                ..
            }
        )
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }

    /// Shared-sentinel data is readable by any authenticated principal,
    /// never by anonymous sessions.
    pub fn can_read_shared(&self) -> bool {
        self.is_authenticated()
    }

    /// Tenant keys this principal may see in retrieval filters.
    pub fn visible_tenant_keys(&self, shared_sentinel: &str) -> Vec<String> {
        let mut keys = vec![self.tenant_key()];
        if self.can_read_shared() {
            keys.push(shared_sentinel.to_string());
        }
        keys
    }
}

/// Well-formedness check for anonymous session ids arriving via cookie.
pub fn is_valid_anon_id(value: &str) -> bool {
    value.starts_with(ANON_PREFIX)
        && value.len() > ANON_PREFIX.len() + 16
        && value[ANON_PREFIX.len()..]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
