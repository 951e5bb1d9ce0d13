use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Server Args ---
    /// Host address and port for the HTTP server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:8787")]
    pub server_addr: String,

    /// Seconds to wait on shutdown for transcripts that are still being persisted.
    #[arg(long, env = "SHUTDOWN_GRACE_SECS", default_value = "30")]
    pub shutdown_grace_secs: u64,

    // --- History Store Args ---
    /// History chat store type (redis, memory)
    #[arg(long, env = "HISTORY_TYPE", default_value = "redis")]
    pub history_type: String,

    /// History chat store host endpoint (e.g., redis://127.0.0.1:6379)
    #[arg(long, env = "HISTORY_HOST", default_value = "redis://127.0.0.1:6379")]
    pub history_host: String,

    /// Prefix for history keys.
    #[arg(long, env = "HISTORY_REDIS_PREFIX", default_value = "chat:")]
    pub history_redis_prefix: String,

    /// Time-to-live in seconds for stored conversations. 0 means no expiry.
    #[arg(long, env = "HISTORY_TTL", default_value = "0")]
    pub history_ttl: u64,

    // --- Chat LLM Provider Args ---
    /// Type of LLM provider for chat completion (openai, ollama)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "openai")]
    pub chat_llm_type: String,

    /// Base URL for the Chat LLM provider API (e.g., http://localhost:11434 for Ollama)
    #[arg(long, env = "CHAT_BASE_URL")] // No default, let adapters handle defaults if None
    pub chat_base_url: Option<String>,

    /// API Key for the Chat LLM provider
    #[arg(long, env = "CHAT_API_KEY", default_value = "")]
    pub chat_api_key: String,

    /// Model name used when a request does not pick one (e.g., gpt-4o-mini, llama3.1)
    #[arg(long, env = "CHAT_MODEL")] // No default, rely on adapter defaults if None
    pub chat_model: Option<String>,

    // --- Generation Defaults ---
    #[arg(long, env = "DEFAULT_TEMPERATURE", default_value = "0.7")]
    pub default_temperature: f32,

    /// Output token limit applied when a request does not set `max_tokens`.
    #[arg(long, env = "DEFAULT_MAX_TOKENS", default_value = "1024")]
    pub default_max_tokens: u32,

    /// Upper bound for any requested `max_tokens`.
    #[arg(long, env = "MAX_OUTPUT_TOKENS", default_value = "4096")]
    pub max_output_tokens: u32,

    /// Estimated prompt budget; older turns are dropped to fit.
    #[arg(long, env = "MAX_CONTEXT_TOKENS", default_value = "6000")]
    pub max_context_tokens: usize,

    /// System instruction placed at the head of every prompt.
    #[arg(
        long,
        env = "SYSTEM_PROMPT",
        default_value = "You are a helpful, concise assistant. Answer accurately and say so when you are unsure."
    )]
    pub system_prompt: String,

    /// Appended to the system instruction when a request sets `webSearchEnabled`.
    #[arg(
        long,
        env = "WEB_SEARCH_PROMPT",
        default_value = "Web search is enabled for this conversation. When an answer depends on recent events, point out which facts should be checked against current sources."
    )]
    pub web_search_prompt: String,

    // --- Rate Limiting Args ---
    #[arg(long, env = "RATE_LIMIT_WINDOW_SECS", default_value = "60")]
    pub rate_limit_window_secs: u64,

    /// Requests allowed per client within one window.
    #[arg(long, env = "RATE_LIMIT_MAX_REQUESTS", default_value = "20")]
    pub rate_limit_max_requests: u32,

    /// Header identifying the client for rate limiting. Requests without it share one bucket.
    #[arg(long, env = "RATE_LIMIT_HEADER", default_value = "x-forwarded-for")]
    pub rate_limit_header: String,

    // --- TLS Args ---
    /// Optional path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}
