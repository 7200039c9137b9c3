use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
    pub cors_allowed_origin: String,
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
            cors_allowed_origin: "https://alicanteabout.com".to_string(),
            max_body_bytes: 64 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    pub chunks_path: String,
    pub cache_path: String,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            chunks_path: "./out/alicanteabout_chunks.json".to_string(),
            cache_path: "./out/embeddings_cache.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingsConfig {
    /// `openai` or `ollama`
    pub provider: String,
    pub model: String,
    pub endpoint: String,
    pub api_key: String,
    /// Query embeddings kept in memory; 0 disables the cache.
    pub cache_max_entries: usize,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "text-embedding-3-small".to_string(),
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            cache_max_entries: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_endpoint")]
    pub llm_endpoint: String,
    #[serde(default)]
    pub llm_key: String,
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_llm_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

const fn default_temperature() -> f32 {
    0.2
}

const fn default_timeout_secs() -> u64 {
    30
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            llm_endpoint: default_llm_endpoint(),
            llm_key: String::new(),
            llm_model: default_llm_model(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub max_sources: usize,
    pub min_score: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            max_sources: 2,
            min_score: 0.25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub site_name: String,
    pub site_description: String,
    /// Answer given to questions outside the target language.
    pub language_fallback: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            site_name: "AlicanteAbout".to_string(),
            site_description: "a tourism guide for Alicante, Spain".to_string(),
            language_fallback: "Sorry, English only for now.".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests: u32,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests: 30,
            window_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub issuer: String,
    pub audience: String,
    pub leeway_secs: u64,
    pub token_ttl_secs: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            issuer: "alicanteabout.com".to_string(),
            audience: "alicanteabout-chat".to_string(),
            leeway_secs: 10,
            token_ttl_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatLogConfig {
    pub enabled: bool,
    pub buffer: usize,
    pub batch_size: usize,
    pub flush_every_ms: u64,
    pub report_every_secs: u64,
}

impl Default for ChatLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            buffer: 1000,
            batch_size: 100,
            flush_every_ms: 500,
            report_every_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Empty disables persistence of chat logs.
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 5,
            min_connections: 1,
            connection_timeout: 30,
            run_migrations: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub backtrace: bool,
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            backtrace: false,
            directory: "logs".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub chat_log: ChatLogConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from the default file locations, then apply
    /// environment overrides.
    ///
    /// Tries `config.toml`, then `config.example.toml`, then built-in defaults.
    pub fn load() -> crate::Result<Self> {
        let mut config = if Path::new("config.toml").exists() {
            Self::from_file("config.toml")?
        } else if Path::new("config.example.toml").exists() {
            eprintln!(
                "Warning: Using config.example.toml. Please create config.toml for production use."
            );
            Self::from_file("config.example.toml")?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Secrets and deployment-specific values may come from the environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub(crate) fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("OPENAI_API_KEY") {
            if self.embeddings.api_key.is_empty() {
                self.embeddings.api_key.clone_from(&key);
            }
            if self.llm.llm_key.is_empty() {
                self.llm.llm_key = key;
            }
        }
        if let Some(secret) = non_empty("CHAT_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Some(issuer) = non_empty("CHAT_JWT_ISSUER") {
            self.auth.issuer = issuer;
        }
        if let Some(audience) = non_empty("CHAT_JWT_AUDIENCE") {
            self.auth.audience = audience;
        }
        if let Some(dsn) = non_empty("CHAT_DB_DSN") {
            self.database.url = dsn;
        }
        if let Some(origin) = non_empty("CORS_ALLOWED_ORIGIN") {
            self.server.cors_allowed_origin = origin;
        }
        if let Some(flag) = non_empty("RUN_MIGRATIONS") {
            self.database.run_migrations = parse_flag(&flag);
        }
        if let Some(flag) = non_empty("CHAT_LOG_DISABLE") {
            if parse_flag(&flag) {
                self.chat_log.enabled = false;
            }
        }

        if let Some(addr) = non_empty("ADDR") {
            self.server.addr = addr;
        }
        if let Some(path) = non_empty("CHUNKS_PATH") {
            self.corpus.chunks_path = path;
        }
        if let Some(path) = non_empty("CACHE_PATH") {
            self.corpus.cache_path = path;
        }
        if let Some(provider) = non_empty("EMBED_PROVIDER") {
            self.embeddings.provider = provider;
        }
        if let Some(model) = non_empty("EMBED_MODEL") {
            self.embeddings.model = model;
        }
        if let Some(model) = non_empty("CHAT_MODEL") {
            self.llm.llm_model = model;
        }

        // Unparseable numbers keep the current value.
        let number = |key: &str| non_empty(key).map(|v| v.trim().to_string());
        let duration = |key: &str| non_empty(key).and_then(|v| parse_duration(&v));

        if let Some(n) = number("TOP_K").and_then(|v| v.parse().ok()) {
            self.retrieval.top_k = n;
        }
        if let Some(n) = number("MAX_SOURCES").and_then(|v| v.parse().ok()) {
            self.retrieval.max_sources = n;
        }
        if let Some(score) = number("MIN_SCORE").and_then(|v| v.parse().ok()) {
            self.retrieval.min_score = score;
        }
        if let Some(n) = number("RATE_LIMIT").and_then(|v| v.parse().ok()) {
            self.rate_limit.requests = n;
        }
        if let Some(window) = duration("RATE_WINDOW") {
            self.rate_limit.window_secs = window.as_secs();
        }
        if let Some(timeout) = duration("TIMEOUT") {
            self.llm.timeout_secs = timeout.as_secs();
        }
        if let Some(n) = number("EMBED_CACHE_MAX").and_then(|v| v.parse().ok()) {
            self.embeddings.cache_max_entries = n;
        }
        if let Some(leeway) = duration("CHAT_JWT_LEEWAY") {
            self.auth.leeway_secs = leeway.as_secs();
        }
        if let Some(n) = number("CHAT_LOG_BUFFER").and_then(|v| v.parse().ok()) {
            self.chat_log.buffer = n;
        }
        if let Some(n) = number("CHAT_LOG_BATCH_SIZE").and_then(|v| v.parse().ok()) {
            self.chat_log.batch_size = n;
        }
        if let Some(every) = duration("CHAT_LOG_FLUSH_EVERY") {
            self.chat_log.flush_every_ms = u64::try_from(every.as_millis()).unwrap_or(u64::MAX);
        }
        if let Some(every) = duration("CHAT_LOG_REPORT_EVERY") {
            self.chat_log.report_every_secs = every.as_secs();
        }
    }

    /// Cache keys and embedding calls use the provider name in lowercase.
    pub fn embedding_provider(&self) -> String {
        self.embeddings.provider.trim().to_ascii_lowercase()
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_secs.max(1))
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit.window_secs.max(1))
    }

    pub fn auth_leeway(&self) -> Duration {
        Duration::from_secs(self.auth.leeway_secs)
    }

    /// Chat logs are persisted only when enabled and a database is configured.
    pub fn chat_log_persistence_enabled(&self) -> bool {
        self.chat_log.enabled && !self.database.url.trim().is_empty()
    }

    /// The phrase returned when the corpus cannot support an answer.
    pub fn fallback_answer(&self) -> String {
        format!(
            "I don't know based on {} content.",
            self.assistant.site_name
        )
    }
}

/// Parse a duration such as `90s`, `1m30s`, `500ms` or `2h`.
/// A bare integer is taken as seconds.
pub(crate) fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = value;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .filter(|&end| end > 0)?;
        let amount: u64 = rest[..digits].parse().ok()?;
        rest = &rest[digits..];
        let unit_len = rest
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len());
        let part = match &rest[..unit_len] {
            "ms" => Duration::from_millis(amount),
            "s" => Duration::from_secs(amount),
            "m" => Duration::from_secs(amount.checked_mul(60)?),
            "h" => Duration::from_secs(amount.checked_mul(3600)?),
            _ => return None,
        };
        total = total.checked_add(part)?;
        rest = &rest[unit_len..];
    }
    Some(total)
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
