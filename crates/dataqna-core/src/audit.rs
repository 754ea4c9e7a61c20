//! Per-request audit record
//!
//! An [`AuditEntry`] is opened when a request arrives, collects one
//! [`StageEvent`] per stage transition and is handed to an `AuditSink`
//! exactly once when the request finishes, whatever the outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::types::{Question, SourceType};

/// Pipeline stage, recorded as the process step when a request fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    SourceResolution,
    ExactMatch,
    Embedding,
    Retrieval,
    Build,
    Validation,
    Execution,
    Summarization,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::SourceResolution => "source_resolution",
            Stage::ExactMatch => "exact_match",
            Stage::Embedding => "embedding",
            Stage::Retrieval => "retrieval",
            Stage::Build => "build",
            Stage::Validation => "validation",
            Stage::Execution => "execution",
            Stage::Summarization => "summarization",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEvent {
    pub stage: Stage,
    pub at: DateTime<Utc>,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub request_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub database: String,
    pub question: String,
    pub source_type: Option<SourceType>,
    /// Model identifiers consulted for this request
    pub models: Vec<String>,
    pub final_sql: Option<String>,
    pub cache_hit: bool,
    /// Stage the request was in when it finished or failed
    pub process_step: Stage,
    pub error: Option<String>,
    pub events: Vec<StageEvent>,
}

impl AuditEntry {
    pub fn open(question: &Question, models: Vec<String>) -> Self {
        let mut entry = Self {
            request_id: Uuid::new_v4(),
            started_at: Utc::now(),
            database: question.database().to_string(),
            question: question.text().to_string(),
            source_type: None,
            models,
            final_sql: None,
            cache_hit: false,
            process_step: Stage::Received,
            error: None,
            events: Vec::new(),
        };
        entry.record(format!(
            "User question: {} | data source: {}",
            entry.question, entry.database
        ));
        entry
    }

    /// Move to `stage`; later events and failures are attributed to it
    pub fn enter(&mut self, stage: Stage) {
        self.process_step = stage;
    }

    pub fn record(&mut self, detail: impl Into<String>) {
        self.events.push(StageEvent {
            stage: self.process_step,
            at: Utc::now(),
            detail: detail.into(),
        });
    }

    pub fn fail(&mut self, error: impl fmt::Display) {
        let message = error.to_string();
        self.record(format!("Failed: {}", message));
        self.error = Some(message);
    }

    /// Stage at which the request failed, if it failed
    pub fn failed_step(&self) -> Option<Stage> {
        self.error.as_ref().map(|_| self.process_step)
    }

    /// Flatten the event log into the free-text narrative stored with the entry
    pub fn narrative(&self) -> String {
        let mut text = String::new();
        let mut current: Option<Stage> = None;
        for event in &self.events {
            if current != Some(event.stage) {
                if current.is_some() {
                    text.push('\n');
                }
                text.push_str(&format!("[{}]\n", event.stage));
                current = Some(event.stage);
            }
            text.push_str(&event.detail);
            text.push('\n');
        }
        text
    }
}
