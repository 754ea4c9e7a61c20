//! Pipeline failures

use dataqna_core::{AgentError, ExecError, Stage, StoreError};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// A request failed. Unanswerable questions are outcomes, not errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Could not resolve data source: {0}")]
    Source(StoreError),

    #[error("Retrieval failed: {0}")]
    Retrieval(StoreError),

    #[error("Embedding failed: {0}")]
    Embedding(AgentError),

    #[error("SQL generation failed: {0}")]
    Build(AgentError),

    #[error("SQL validation failed: {0}")]
    Validation(AgentError),

    #[error("Execution failed: {0}")]
    Execution(ExecError),

    #[error("Summarization failed: {0}")]
    Summarization(AgentError),

    #[error("{stage} stage timed out after {secs}s")]
    Timeout { stage: Stage, secs: u64 },
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Source(_) => Stage::SourceResolution,
            PipelineError::Retrieval(_) => Stage::Retrieval,
            PipelineError::Embedding(_) => Stage::Embedding,
            PipelineError::Build(_) => Stage::Build,
            PipelineError::Validation(_) => Stage::Validation,
            PipelineError::Execution(_) => Stage::Execution,
            PipelineError::Summarization(_) => Stage::Summarization,
            PipelineError::Timeout { stage, .. } => *stage,
        }
    }
}

/// Await an external call under `limit`, mapping its error into the pipeline taxonomy
pub(crate) async fn within<T, E, F>(
    limit: Duration,
    stage: Stage,
    call: F,
    wrap: fn(E) -> PipelineError,
) -> Result<T, PipelineError>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(wrap),
        Err(_) => Err(PipelineError::Timeout {
            stage,
            secs: limit.as_secs(),
        }),
    }
}
