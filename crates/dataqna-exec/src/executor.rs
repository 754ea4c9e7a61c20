//! Routing of statements to the backend for a source type

use dataqna_core::{ExecError, SourceType, SqlBackend, TabularResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Rows kept from any executed statement
pub const MAX_RESULT_ROWS: usize = 10;

#[derive(Clone, Default)]
pub struct QueryExecutor {
    backends: HashMap<SourceType, Arc<dyn SqlBackend>>,
}

impl QueryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `backend` for its source type, replacing any earlier one
    pub fn with_backend(mut self, backend: Arc<dyn SqlBackend>) -> Self {
        info!(source_type = %backend.source_type(), "Registered SQL backend");
        self.backends.insert(backend.source_type(), backend);
        self
    }

    pub fn supports(&self, source_type: SourceType) -> bool {
        self.backends.contains_key(&source_type)
    }

    fn backend(&self, source_type: SourceType) -> Result<&Arc<dyn SqlBackend>, ExecError> {
        self.backends
            .get(&source_type)
            .ok_or(ExecError::NoBackend(source_type))
    }

    /// Run `sql` and return at most [`MAX_RESULT_ROWS`] rows in backend order
    pub async fn execute(
        &self,
        source_type: SourceType,
        sql: &str,
    ) -> Result<TabularResult, ExecError> {
        let mut result = self.backend(source_type)?.query(sql).await?;
        let total = result.row_count();
        if result.truncate(MAX_RESULT_ROWS) {
            debug!(total, kept = MAX_RESULT_ROWS, "Truncated query result");
        }
        Ok(result)
    }

    pub async fn dry_run(&self, source_type: SourceType, sql: &str) -> Result<(), ExecError> {
        self.backend(source_type)?.dry_run(sql).await
    }
}
