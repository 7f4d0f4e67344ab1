use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the PaperStream server.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Base URL of the OpenAI-compatible model provider.
    pub openai_url: String,
    /// API key sent to the model provider via the `api-key` header.
    pub openai_api_key: String,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Chat-completion model used for streamed summaries.
    pub chat_model: String,
    /// Base URL of the document store holding chunk status records.
    pub status_store_url: String,
    /// Optional API key required to access the status store.
    pub status_store_api_key: Option<String>,
    /// PostgreSQL connection string for the pgvector-backed store.
    pub database_url: String,
    /// Table holding vector rows.
    pub vector_table_name: String,
    /// Storage account hosting the original PDF blobs.
    pub blob_account_name: String,
    /// Blob container holding uploaded files.
    pub blob_container_name: String,
    /// Maximum characters per chunk before a page is split.
    pub max_chunk_length: usize,
    /// Number of embedding attempts before a chunk is abandoned.
    pub embed_retry_limit: u32,
    /// Seconds to wait between failed embedding attempts.
    pub embed_retry_backoff_secs: u64,
    /// Milliseconds to wait after every successful embedding call.
    pub embed_pacing_ms: u64,
    /// Milliseconds to wait between fully processed chunks.
    pub chunk_pacing_ms: u64,
    /// Milliseconds to wait around each emitted stream event.
    pub event_pacing_ms: u64,
    /// Number of nearest matches returned per query.
    pub search_result_limit: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            openai_url: load_env("OPENAI_URL")?,
            openai_api_key: load_env("OPENAI_API_KEY")?,
            embedding_model: load_env_or("EMBEDDING_MODEL", "text-embedding-ada-002"),
            chat_model: load_env_or("CHAT_MODEL", "gpt-4"),
            status_store_url: load_env("STATUS_STORE_URL")?,
            status_store_api_key: load_env_optional("STATUS_STORE_API_KEY"),
            database_url: load_env("DATABASE_URL")?,
            vector_table_name: load_env_or("VECTOR_TABLE_NAME", "documents"),
            blob_account_name: load_env("BLOB_ACCOUNT_NAME")?,
            blob_container_name: load_env("BLOB_CONTAINER_NAME")?,
            max_chunk_length: load_parsed_or("MAX_CHUNK_LENGTH", 7500)?,
            embed_retry_limit: load_parsed_or("EMBED_RETRY_LIMIT", 3)?,
            embed_retry_backoff_secs: load_parsed_or("EMBED_RETRY_BACKOFF_SECS", 10)?,
            embed_pacing_ms: load_parsed_or("EMBED_PACING_MS", 20)?,
            chunk_pacing_ms: load_parsed_or("CHUNK_PACING_MS", 20)?,
            event_pacing_ms: load_parsed_or("EVENT_PACING_MS", 10)?,
            search_result_limit: load_parsed_or("SEARCH_RESULT_LIMIT", 5)?,
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn load_env_or(key: &str, default: &str) -> String {
    load_env_optional(key).unwrap_or_else(|| default.to_string())
}

fn load_parsed_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match load_env_optional(key) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        openai_url = %config.openai_url,
        status_store_url = %config.status_store_url,
        vector_table = %config.vector_table_name,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
