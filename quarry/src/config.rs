use serde::Deserialize;
use std::env;

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

fn parse_env_bool(var: &str, default: bool) -> bool {
    match env::var(var) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                tracing::warn!("Invalid boolean '{}' for {}. Using default.", raw, var);
                default
            }
        },
        Err(_) => default,
    }
}

/// Tenant key under which company-wide knowledge is stored. Admins write it,
/// any authenticated principal reads it. The default cannot collide with real
/// tenant keys: user ids are UUIDs and anonymous ids carry the `anon_` prefix.
pub const DEFAULT_SHARED_SENTINEL: &str = "__shared__";

/// Prefix of every anonymous session id (and therefore anonymous tenant key).
pub const ANON_PREFIX: &str = "anon_";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub embeddings: EmbeddingsConfig,
    pub processing: ProcessingConfig,
    pub retrieval: RetrievalConfig,
    pub generation: GenerationConfig,
    pub memory: MemoryConfig,
    pub reaper: ReaperConfig,
    pub llm: Option<LlmConfig>,
    pub shared_sentinel: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Sets the `Secure` attribute on the anonymous session cookie.
    pub cookie_secure: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub auth_token: Option<String>,
    pub local_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC signing secret for access and refresh tokens (HS256).
    pub jwt_secret: String,
    pub access_lifetime_secs: u64,
    pub refresh_lifetime_secs: u64,
    /// Anonymous sessions and their data expire after this many days.
    pub anonymous_ttl_days: i64,
    /// Accounts registered with these emails receive the admin role.
    pub admin_emails: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsConfig {
    pub model: String,
    pub dimensions: usize,
    pub batch_size: usize,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessingConfig {
    /// Target chunk size in estimated tokens.
    pub chunk_target_tokens: usize,
    /// Overlap between consecutive chunks, as a percentage of the target.
    pub chunk_overlap_percent: usize,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    pub default_k: usize,
    /// Time budget for the LLM entity extraction on the graph path.
    pub graph_budget_ms: u64,
    /// Score multiplier for chunks found by both vector and graph lookup.
    pub hybrid_boost: f32,
    /// Base score assigned to graph-only hits.
    pub graph_base_score: f32,
    /// Max edge records returned per chunk during multi-hop expansion.
    pub max_edges_per_chunk: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerationConfig {
    /// Deterministic output when the context cannot support an answer.
    pub refusal_phrase: String,
    pub excerpt_max_chars: usize,
    pub confidence_high: f32,
    pub confidence_medium: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    /// Estimated token budget for one tenant's memories.
    pub max_context_tokens: usize,
    /// Summarization starts when usage crosses this fraction of the budget.
    pub summarize_watermark: f32,
    /// The N most recent entries are never folded into a summary.
    pub keep_recent: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReaperConfig {
    /// Local hour (0-23) of the daily sweep.
    pub hour: u32,
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Whether the provider returns token log-probabilities.
    pub supports_logprobs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: env::var("QUARRY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_env_or("QUARRY_PORT", 3000),
                cookie_secure: parse_env_bool("COOKIE_SECURE", false),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "file:quarry.db".to_string()),
                auth_token: env::var("DATABASE_AUTH_TOKEN").ok(),
                local_path: env::var("DATABASE_LOCAL_PATH").ok(),
            },
            auth: AuthConfig {
                jwt_secret: env::var("JWT_SECRET").unwrap_or_default(),
                access_lifetime_secs: parse_env_or("ACCESS_LIFETIME_SECS", 900),
                refresh_lifetime_secs: parse_env_or("REFRESH_LIFETIME_SECS", 604_800),
                anonymous_ttl_days: parse_env_or("ANONYMOUS_TTL_DAYS", 7),
                admin_emails: env::var("ADMIN_EMAILS")
                    .map(|raw| {
                        raw.split(',')
                            .map(|s| s.trim().to_lowercase())
                            .filter(|s| !s.is_empty())
                            .collect()
                    })
                    .unwrap_or_default(),
            },
            embeddings: EmbeddingsConfig {
                model: env::var("EMBEDDING_MODEL")
                    .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
                dimensions: parse_env_or("EMBEDDING_DIMENSIONS", 1536),
                batch_size: parse_env_or("EMBEDDING_BATCH_SIZE", 64),
                api_key: env::var("EMBEDDING_API_KEY").ok(),
                base_url: env::var("EMBEDDING_BASE_URL").ok(),
                timeout_secs: parse_env_or("EMBEDDING_TIMEOUT", 30),
                max_retries: parse_env_or("EMBEDDING_MAX_RETRIES", 3),
            },
            processing: ProcessingConfig {
                chunk_target_tokens: parse_env_or("CHUNK_TARGET_TOKENS", 750),
                chunk_overlap_percent: parse_env_or("CHUNK_OVERLAP_PERCENT", 10),
                max_upload_bytes: parse_env_or("MAX_UPLOAD_BYTES", 25 * 1024 * 1024),
            },
            retrieval: RetrievalConfig {
                default_k: parse_env_or("RETRIEVAL_DEFAULT_K", 8),
                graph_budget_ms: parse_env_or("GRAPH_BUDGET_MS", 2000),
                hybrid_boost: parse_env_or("HYBRID_BOOST", 1.2),
                graph_base_score: parse_env_or("GRAPH_BASE_SCORE", 0.7),
                max_edges_per_chunk: parse_env_or("MAX_EDGES_PER_CHUNK", 15),
            },
            generation: GenerationConfig {
                refusal_phrase: env::var("REFUSAL_PHRASE").unwrap_or_else(|_| {
                    "I don't know based on the provided documents.".to_string()
                }),
                excerpt_max_chars: parse_env_or("EXCERPT_MAX_CHARS", 300),
                confidence_high: parse_env_or("CONFIDENCE_HIGH", 0.75),
                confidence_medium: parse_env_or("CONFIDENCE_MEDIUM", 0.5),
            },
            memory: MemoryConfig {
                max_context_tokens: parse_env_or("MEMORY_MAX_CONTEXT_TOKENS", 4000),
                summarize_watermark: parse_env_or("MEMORY_SUMMARIZE_WATERMARK", 0.75),
                keep_recent: parse_env_or("MEMORY_KEEP_RECENT", 5),
            },
            reaper: ReaperConfig {
                hour: parse_env_or("REAPER_HOUR", 3),
                batch_size: parse_env_or("REAPER_BATCH_SIZE", 500),
            },
            llm: env::var("LLM_MODEL").ok().map(|model| LlmConfig {
                model,
                api_key: env::var("LLM_API_KEY").ok(),
                base_url: env::var("LLM_BASE_URL").ok(),
                timeout_secs: parse_env_or("LLM_TIMEOUT", 60),
                max_retries: parse_env_or("LLM_MAX_RETRIES", 3),
                supports_logprobs: parse_env_bool("LLM_SUPPORTS_LOGPROBS", true),
            }),
            shared_sentinel: env::var("SHARED_SENTINEL")
                .unwrap_or_else(|_| DEFAULT_SHARED_SENTINEL.to_string()),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }
}
