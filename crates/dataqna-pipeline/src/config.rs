//! Immutable pipeline settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Table descriptions retrieved per question
    pub num_table_matches: usize,
    /// Column descriptions retrieved per question
    pub num_column_matches: usize,
    /// Question/SQL examples retrieved per question
    pub num_sql_matches: usize,
    /// Minimum cosine similarity for a retrieval match to count
    pub similarity_threshold: f32,
    /// Upper bound on validator calls per request; 0 behaves as 1
    pub max_debug_rounds: usize,
    /// Adopt validator corrections. When off the first verdict is final.
    pub debugger_enabled: bool,
    /// Run generated SQL in `natural_response`
    pub execute_final_sql: bool,
    /// Limit for every external call made while serving a request
    pub call_timeout_secs: u64,
    /// Examples returned by `/get_known_sql`
    pub known_sql_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            num_table_matches: 5,
            num_column_matches: 10,
            num_sql_matches: 3,
            similarity_threshold: 0.3,
            max_debug_rounds: 3,
            debugger_enabled: true,
            execute_final_sql: true,
            call_timeout_secs: 60,
            known_sql_limit: 5,
        }
    }
}

impl PipelineConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn debug_rounds(&self) -> usize {
        self.max_debug_rounds.max(1)
    }
}
