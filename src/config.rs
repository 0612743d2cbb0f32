use std::time::Duration;

/// Runtime configuration, read once at startup from the environment.
///
/// Defaults mirror the reference deployment; every value can be overridden
/// without a rebuild.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub redis_url: String,
    pub ollama_host: String,
    pub qdrant_url: String,
    pub reranker_url: Option<String>,

    pub recent_messages_window: usize,
    pub session_ttl_days: i64,

    pub semantic_cache_namespace: String,
    pub semantic_cache_similarity_threshold: f32,
    pub semantic_cache_top_k: usize,

    pub session_summary_min_messages: u32,
    pub session_summary_history_limit: usize,
    pub session_summary_max_chars: usize,

    pub doc_retrieval_top_k: usize,
    pub doc_retrieval_top_n: usize,
    pub embedding_dimension: usize,

    pub chat_model: String,

    pub notification_webhook_url: Option<String>,
    pub notification_bot_token: Option<String>,
    pub notification_channel_id: Option<String>,

    pub admin_email: Option<String>,
    pub admin_passcode: Option<String>,

    pub embed_timeout: Duration,
    pub vector_timeout: Duration,
    pub llm_timeout: Duration,
    pub db_timeout: Duration,
    pub session_store_timeout: Duration,
    pub notification_timeout: Duration,
}

impl Config {
    /// Load configuration from the process environment, falling back to the
    /// reference defaults for anything unset. Never panics: a missing
    /// `DATABASE_URL` simply disables SQL retrieval and archival persistence,
    /// per the router's "no relational DB configured" downgrade path.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").ok(),
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            ollama_host: std::env::var("OLLAMA_HOST")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            qdrant_url: std::env::var("QDRANT_URL")
                .unwrap_or_else(|_| "http://localhost:6333".to_string()),
            reranker_url: std::env::var("RERANKER_URL").ok(),

            recent_messages_window: env_usize("RECENT_MESSAGES_WINDOW", 12),
            session_ttl_days: env_i64("SESSION_TTL_DAYS", 7),

            semantic_cache_namespace: std::env::var("SEMANTIC_CACHE_NAMESPACE")
                .unwrap_or_else(|_| "support_answers".to_string()),
            semantic_cache_similarity_threshold: env_f32("SEMANTIC_CACHE_SIMILARITY_THRESHOLD", 0.9),
            semantic_cache_top_k: env_usize("SEMANTIC_CACHE_TOP_K", 3),

            session_summary_min_messages: env_u32("SESSION_SUMMARY_MIN_MESSAGES", 12),
            session_summary_history_limit: env_usize("SESSION_SUMMARY_HISTORY_LIMIT", 40),
            session_summary_max_chars: env_usize("SESSION_SUMMARY_MAX_CHARS", 256),

            doc_retrieval_top_k: env_usize("DOC_RETRIEVAL_TOP_K", 10),
            doc_retrieval_top_n: env_usize("DOC_RETRIEVAL_TOP_N", 3),
            embedding_dimension: env_usize("EMBEDDING_DIMENSION", 768),

            chat_model: std::env::var("CHAT_MODEL").unwrap_or_else(|_| "llama3.1".to_string()),

            notification_webhook_url: std::env::var("NOTIFICATION_WEBHOOK_URL").ok(),
            notification_bot_token: std::env::var("NOTIFICATION_BOT_TOKEN").ok(),
            notification_channel_id: std::env::var("NOTIFICATION_CHANNEL_ID").ok(),

            admin_email: std::env::var("ADMIN_EMAIL").ok(),
            admin_passcode: std::env::var("ADMIN_PASSCODE").ok(),

            embed_timeout: Duration::from_secs(env_u64("EMBED_TIMEOUT_SECS", 10)),
            vector_timeout: Duration::from_secs(env_u64("VECTOR_TIMEOUT_SECS", 10)),
            llm_timeout: Duration::from_secs(env_u64("LLM_TIMEOUT_SECS", 30)),
            db_timeout: Duration::from_secs(env_u64("DB_TIMEOUT_SECS", 5)),
            session_store_timeout: Duration::from_secs(env_u64("SESSION_STORE_TIMEOUT_SECS", 2)),
            notification_timeout: Duration::from_secs(env_u64("NOTIFICATION_TIMEOUT_SECS", 10)),
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
