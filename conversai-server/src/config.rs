//! Server configuration, loaded from environment variables at startup.

use std::time::Duration;

use crate::context::window::DEFAULT_MAX_CONTEXT_TOKENS;
use crate::providers::llm::gemini;
use crate::providers::memory::mem0;
use crate::providers::storage::cloudinary::{self, CloudinaryCredentials};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are ConversAI, a friendly and knowledgeable assistant. \
Answer clearly and concisely, use Markdown when it helps readability, and say so when you are unsure. \
When the user shares files, base your answer on their contents.";

/// Runtime configuration for conversai-server.
///
/// Every field has a sensible default so the server works out-of-the-box
/// without any environment variables set.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:3000"`).
    pub bind_address: String,

    /// sqlx SQLite URL (default: `"sqlite://conversai.db"`).  The file is
    /// created when missing.
    pub database_url: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Directory for daily-rolling log files; stdout when unset.
    pub log_dir: Option<String>,

    /// Serve `/swagger-ui` and `/api-docs/openapi.json`.
    pub enable_swagger: bool,

    /// Allowed CORS origins; any origin when empty.
    pub cors_allowed_origins: Vec<String>,

    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,

    pub mem0_api_key: Option<String>,
    pub mem0_base_url: String,

    /// Present only when cloud name, API key and secret are all set.
    pub cloudinary: Option<CloudinaryCredentials>,
    pub cloudinary_base_url: String,

    /// Estimated-token budget of the context window sent to the model.
    pub max_context_tokens: usize,
    pub max_output_tokens: u32,
    pub temperature: Option<f32>,

    /// Upper bound on a whole streamed completion.
    pub stream_timeout: Duration,
    /// Upper bound on the memory lookup that precedes each completion.
    pub memory_timeout: Duration,

    pub system_prompt: String,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build [`Config`] from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_or = |key: &str, default: &str| non_empty(lookup(key)).unwrap_or_else(|| default.to_owned());
        let optional = |key: &str| non_empty(lookup(key));

        let cloudinary = match (
            optional("CONVERSAI_CLOUDINARY_CLOUD_NAME"),
            optional("CONVERSAI_CLOUDINARY_API_KEY"),
            optional("CONVERSAI_CLOUDINARY_API_SECRET"),
        ) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(CloudinaryCredentials {
                cloud_name,
                api_key,
                api_secret,
            }),
            _ => None,
        };

        Self {
            bind_address: env_or("CONVERSAI_BIND", "0.0.0.0:3000"),
            database_url: env_or("CONVERSAI_DATABASE_URL", "sqlite://conversai.db"),
            log_level: env_or("CONVERSAI_LOG", "info"),
            log_json: parse_bool(lookup("CONVERSAI_LOG_JSON"), false),
            log_dir: optional("CONVERSAI_LOG_DIR"),
            enable_swagger: parse_bool(lookup("CONVERSAI_ENABLE_SWAGGER"), true),
            cors_allowed_origins: optional("CONVERSAI_CORS_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|origin| !origin.is_empty())
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or_default(),
            gemini_api_key: optional("CONVERSAI_GEMINI_API_KEY"),
            gemini_model: env_or("CONVERSAI_GEMINI_MODEL", gemini::DEFAULT_MODEL),
            gemini_base_url: env_or("CONVERSAI_GEMINI_BASE_URL", gemini::DEFAULT_BASE_URL),
            mem0_api_key: optional("CONVERSAI_MEM0_API_KEY"),
            mem0_base_url: env_or("CONVERSAI_MEM0_BASE_URL", mem0::DEFAULT_BASE_URL),
            cloudinary,
            cloudinary_base_url: env_or("CONVERSAI_CLOUDINARY_BASE_URL", cloudinary::DEFAULT_BASE_URL),
            max_context_tokens: parse_or(lookup("CONVERSAI_MAX_CONTEXT_TOKENS"), DEFAULT_MAX_CONTEXT_TOKENS),
            max_output_tokens: parse_or(lookup("CONVERSAI_MAX_OUTPUT_TOKENS"), 4096),
            temperature: lookup("CONVERSAI_TEMPERATURE").and_then(|v| v.trim().parse().ok()),
            stream_timeout: Duration::from_secs(parse_or(lookup("CONVERSAI_STREAM_TIMEOUT_SECS"), 30)),
            memory_timeout: Duration::from_secs(parse_or(lookup("CONVERSAI_MEMORY_TIMEOUT_SECS"), 5)),
            system_prompt: env_or("CONVERSAI_SYSTEM_PROMPT", DEFAULT_SYSTEM_PROMPT),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_bool(value: Option<String>, default: bool) -> bool {
    match value.as_deref().map(str::trim) {
        Some(v) if v == "1" || v.eq_ignore_ascii_case("true") => true,
        Some(v) if v == "0" || v.eq_ignore_ascii_case("false") => false,
        _ => default,
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
