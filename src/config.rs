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

/// Runtime configuration for the cortex-rag server.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Base URL of the Qdrant instance that stores embeddings.
    pub qdrant_url: String,
    /// Name of the Qdrant collection used for document chunks.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Base URL of the embedding/generation model provider.
    pub model_api_url: String,
    /// Optional API key for the model provider.
    pub model_api_key: Option<String>,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Maximum number of texts submitted per embedding request.
    pub embedding_batch_size: usize,
    /// Generation model identifier passed to the provider.
    pub generation_model: String,
    /// Character budget for each document chunk.
    pub chunk_size: usize,
    /// Character overlap shared by adjacent chunks.
    pub chunk_overlap: usize,
    /// Number of contexts retrieved per question.
    pub search_top_k: usize,
    /// Root directory for the filesystem blob store.
    pub blob_root: String,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            qdrant_url: load_env("QDRANT_URL")?,
            qdrant_collection_name: load_env_or("QDRANT_COLLECTION_NAME", "doc"),
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            model_api_url: load_env("MODEL_API_URL")?,
            model_api_key: load_env_optional("MODEL_API_KEY"),
            embedding_model: load_env("EMBEDDING_MODEL")?,
            embedding_dimension: parse_env_or("EMBEDDING_DIMENSION", 3072)?,
            embedding_batch_size: parse_env_or("EMBEDDING_BATCH_SIZE", 50)?,
            generation_model: load_env("GENERATION_MODEL")?,
            chunk_size: parse_env_or("CHUNK_SIZE", 1000)?,
            chunk_overlap: parse_env_or("CHUNK_OVERLAP", 200)?,
            search_top_k: parse_env_or("SEARCH_TOP_K", 5)?,
            blob_root: load_env_or("BLOB_ROOT", "uploads"),
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

fn parse_env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
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
        qdrant_url = %config.qdrant_url,
        collection = %config.qdrant_collection_name,
        model_api_url = %config.model_api_url,
        embedding_model = %config.embedding_model,
        dimension = config.embedding_dimension,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_env_or_uses_default_when_unset() {
        let value: usize = parse_env_or("CORTEX_RAG_TEST_UNSET", 42).expect("default");
        assert_eq!(value, 42);
    }

    #[test]
    fn load_env_or_falls_back() {
        assert_eq!(load_env_or("CORTEX_RAG_TEST_UNSET_2", "doc"), "doc");
    }
}
