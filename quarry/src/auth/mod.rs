mod identity;
mod password;
mod tokens;

pub use identity::{mint_anon_id, IdentityGateway, ResolvedIdentity, SESSION_COOKIE};
pub use password::{hash_password, verify_password};
pub use tokens::TokenService;
