//! Error types raised by pipeline collaborators

use thiserror::Error;

use crate::types::SourceType;

/// Vector store, metadata catalog and audit sink failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("No source type recorded for data source '{0}'")]
    SourceNotFound(String),

    #[error("Data source '{database}' has conflicting source types: {found}")]
    AmbiguousSource { database: String, found: String },

    #[error("{0}")]
    UnknownSourceType(String),

    #[error("Malformed embedding: {0}")]
    MalformedEmbedding(String),

    #[error("Blocking store task failed: {0}")]
    Task(String),
}

/// Embedder and LLM agent failures
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Model request failed: {0}")]
    Request(String),

    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("Could not parse model response: {0}")]
    Parse(String),
}

/// Query execution failures
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("No backend registered for source type '{0}'")]
    NoBackend(SourceType),

    #[error("Blocking query task failed: {0}")]
    Task(String),
}
