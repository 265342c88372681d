use clap::{ Parser, ValueEnum };

/// What to do when the conversation store fails mid-request.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFailurePolicy {
    /// Log the failure and continue with fallback values.
    BestEffort,
    /// Reject the request with 503.
    Strict,
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- History Store Args ---
    /// Conversation store type (redis, memory)
    #[arg(long, env = "HISTORY_TYPE", default_value = "redis")]
    pub history_type: String,

    /// Conversation store connection string (e.g., redis://127.0.0.1:6379)
    #[arg(long, env = "HISTORY_HOST", default_value = "redis://127.0.0.1:6379")]
    pub history_host: String,

    /// Prefix for Redis conversation keys.
    #[arg(long, env = "HISTORY_REDIS_PREFIX", default_value = "conversation:")]
    pub history_redis_prefix: String,

    /// Whether store failures are swallowed (best-effort) or returned to the caller (strict).
    #[arg(long, env = "STORE_FAILURE_POLICY", value_enum, default_value = "best-effort")]
    pub store_failure_policy: StoreFailurePolicy,

    /// Run chat and clear requests for the same session one at a time.
    #[arg(
        long,
        env = "SERIALIZE_SESSIONS",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub serialize_sessions: bool,

    // --- Chat LLM Provider Args ---
    /// Type of LLM provider for chat completion (gemini, openai, anthropic, ollama, deepseek, xai, groq)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "gemini")]
    pub chat_llm_type: String,

    /// Base URL for the Chat LLM provider API. Adapters fall back to their public endpoint.
    #[arg(long, env = "CHAT_BASE_URL")]
    pub chat_base_url: Option<String>,

    /// API Key for the Chat LLM provider
    #[arg(long, env = "CHAT_API_KEY", default_value = "")]
    pub chat_api_key: String,

    /// Model name for chat completion
    #[arg(long, env = "CHAT_MODEL", default_value = "gemini-1.5-flash")]
    pub chat_model: String,

    /// Sampling temperature for chat completion
    #[arg(long, env = "CHAT_TEMPERATURE", default_value = "0.7")]
    pub chat_temperature: f32,

    /// Optional timeout in seconds for a single model call. Unset means wait for the provider.
    #[arg(long, env = "CHAT_TIMEOUT_SECS")]
    pub chat_timeout_secs: Option<u64>,

    /// Optional JSON file overriding the identity preamble, greeting and apology texts.
    #[arg(long, env = "PROMPTS_PATH")]
    pub prompts_path: Option<String>,

    // --- Auth Args ---
    /// Base URL of the identity service used to introspect bearer tokens.
    #[arg(long, env = "AUTH_BACKEND_URL", default_value = "http://localhost:5001")]
    pub auth_backend_url: String,

    /// Timeout in seconds for a token introspection call.
    #[arg(long, env = "AUTH_TIMEOUT_SECS", default_value = "5")]
    pub auth_timeout_secs: u64,

    /// Session secret. Kept for parity with the identity service configuration; no cookies are issued.
    #[arg(long, env = "SECRET_KEY", default_value = "your-secret-key-change-this")]
    pub secret_key: String,

    // --- Server Args ---
    /// Address to bind the HTTP server to.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port for the HTTP server.
    #[arg(long, env = "PORT", default_value = "5000")]
    pub port: u16,

    /// Comma-separated list of browser origins allowed by CORS.
    #[arg(
        long,
        env = "ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:3000,http://localhost:3001,http://127.0.0.1:3000,http://127.0.0.1:3001"
    )]
    pub allowed_origins: Vec<String>,

    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,

    /// Optional path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

impl Args {
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_local_development() {
        let args = Args::try_parse_from(["conversation-gateway"]).unwrap();
        assert_eq!(args.port, 5000);
        assert_eq!(args.auth_backend_url, "http://localhost:5001");
        assert_eq!(args.auth_timeout_secs, 5);
        assert_eq!(args.chat_model, "gemini-1.5-flash");
        assert_eq!(args.store_failure_policy, StoreFailurePolicy::BestEffort);
        assert!(args.serialize_sessions);
        assert_eq!(args.allowed_origins.len(), 4);
        assert_eq!(args.server_addr(), "0.0.0.0:5000");
    }

    #[test]
    fn parses_policy_and_origins() {
        let args = Args::try_parse_from([
            "conversation-gateway",
            "--store-failure-policy",
            "strict",
            "--serialize-sessions",
            "false",
            "--allowed-origins",
            "https://a.example,https://b.example",
        ]).unwrap();
        assert_eq!(args.store_failure_policy, StoreFailurePolicy::Strict);
        assert!(!args.serialize_sessions);
        assert_eq!(args.allowed_origins, vec!["https://a.example", "https://b.example"]);
    }
}
