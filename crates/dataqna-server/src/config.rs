//! Configuration system for the dataqna server
//!
//! Loads configuration from:
//! 1. config.yaml - operational settings (port, storage, models, pipeline, logging)
//! 2. .env file - secrets (API keys, database URLs)
//!
//! Environment variables always override config.yaml values.

use dataqna_pipeline::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Where metadata, audit rows and queried data live
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// DuckDB file holding embeddings, examples and the audit log
    pub metadata_db: String,

    /// DuckDB file queried for `duckdb` data sources
    pub duckdb_path: Option<String>,

    /// Connection URL for `postgres` data sources
    pub postgres_url: Option<String>,

    pub postgres_max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            metadata_db: "./data/metadata.duckdb".to_string(),
            duckdb_path: None,
            postgres_url: None,
            postgres_max_connections: 5,
        }
    }
}

/// Model identifiers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub embedding_model: String,
    pub chat_model: String,
    pub temperature: f32,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            embedding_model: "text-embedding-3-small".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or module-specific
    pub level: String,

    /// Output format: pretty, json, compact
    pub format: String,

    /// Output destination: stdout, file, both
    pub output: String,

    /// Directory for log files
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            output: "stdout".to_string(),
            directory: "./logs".to_string(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub models: ModelsConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from YAML file with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&contents)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(host) = std::env::var("DATAQNA_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("DATAQNA_SERVER_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                name: "DATAQNA_SERVER_PORT".to_string(),
                value: port.clone(),
            })?;
        }

        if let Ok(path) = std::env::var("DATAQNA_METADATA_DB") {
            self.storage.metadata_db = path;
        }
        if let Ok(path) = std::env::var("DATAQNA_DUCKDB_PATH") {
            self.storage.duckdb_path = Some(path);
        }
        if let Ok(url) = std::env::var("DATAQNA_POSTGRES_URL") {
            self.storage.postgres_url = Some(url);
        }

        if let Ok(flag) = std::env::var("DATAQNA_EXECUTE_FINAL_SQL") {
            self.pipeline.execute_final_sql = parse_flag(&flag).ok_or(ConfigError::InvalidValue {
                name: "DATAQNA_EXECUTE_FINAL_SQL".to_string(),
                value: flag.clone(),
            })?;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Ok(output) = std::env::var("LOG_OUTPUT") {
            self.logging.output = output;
        }
        if let Ok(dir) = std::env::var("LOG_DIR") {
            self.logging.directory = dir;
        }

        Ok(())
    }

    /// Get OpenAI API key from environment (must be in .env)
    pub fn get_openai_api_key() -> Result<String, ConfigError> {
        std::env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
