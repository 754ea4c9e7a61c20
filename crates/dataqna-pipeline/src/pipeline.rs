//! Request orchestration
//!
//! Both entry points share [`Pipeline::resolve_sql`] for source resolution,
//! cache lookup, retrieval, build and validation, so the audit narrative of a
//! question reads the same whichever endpoint asked it.

use dataqna_core::{
    AuditEntry, AuditSink, BuildContext, CandidateSql, MatchKind, Question, QuestionEmbedder,
    ResponseSummarizer, RetrievalMatch, SourceCatalog, SourceType, SqlBuilder, SqlValidator, Stage,
    SummaryInput, TabularResult, VectorStore, APOLOGY,
};
use dataqna_exec::QueryExecutor;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::debug::DebugLoop;
use crate::error::{within, PipelineError};

/// Text summarized when execution of generated SQL is switched off
pub const EXECUTION_DISABLED: &str =
    "Please enable the Execution of the final SQL so I can provide an answer";

/// Outcome of `generate_sql`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GeneratedSql {
    Sql { sql: String, from_cache: bool },
    /// No valid SQL; `message` is the summarized apology
    Unanswerable { message: String },
}

/// Outcome of `natural_response`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NaturalResponse {
    Answered {
        sql: String,
        summary: String,
        results: TabularResult,
    },
    /// Rows were fetched but the summarizer produced nothing
    SummaryUnavailable { sql: String },
    Unanswerable { message: String },
    ExecutionDisabled { sql: String, message: String },
}

/// Where a request ended up after validation
#[derive(Debug)]
enum Resolution {
    Cached(String),
    Validated(String),
    Invalid,
}

/// Shared collaborators handed to [`Pipeline::new`]
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn SourceCatalog>,
    pub store: Arc<dyn VectorStore>,
    pub embedder: Arc<dyn QuestionEmbedder>,
    pub builder: Arc<dyn SqlBuilder>,
    pub validator: Arc<dyn SqlValidator>,
    pub summarizer: Arc<dyn ResponseSummarizer>,
    pub executor: QueryExecutor,
    pub audit: Arc<dyn AuditSink>,
}

pub struct Pipeline {
    config: PipelineConfig,
    parts: Collaborators,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, parts: Collaborators) -> Self {
        Self { config, parts }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.parts.executor
    }

    pub fn summarizer(&self) -> &dyn ResponseSummarizer {
        self.parts.summarizer.as_ref()
    }

    /// Model identifiers recorded on every audit entry
    fn models(&self) -> Vec<String> {
        let mut models: Vec<String> = Vec::new();
        for model in [
            self.parts.embedder.model(),
            self.parts.builder.model(),
            self.parts.validator.model(),
            self.parts.summarizer.model(),
        ] {
            if !models.iter().any(|m| m == model) {
                models.push(model.to_string());
            }
        }
        models
    }

    /// Produce validated SQL for `question` without executing it
    pub async fn generate_sql(&self, question: &Question) -> Result<GeneratedSql, PipelineError> {
        let mut audit = AuditEntry::open(question, self.models());
        let result = self.generate_sql_inner(question, &mut audit).await;
        self.close(audit, result.as_ref().err()).await;
        result
    }

    async fn generate_sql_inner(
        &self,
        question: &Question,
        audit: &mut AuditEntry,
    ) -> Result<GeneratedSql, PipelineError> {
        let (_, resolution) = self.resolve_sql(question, audit).await?;
        match resolution {
            Resolution::Cached(sql) => Ok(GeneratedSql::Sql {
                sql,
                from_cache: true,
            }),
            Resolution::Validated(sql) => Ok(GeneratedSql::Sql {
                sql,
                from_cache: false,
            }),
            Resolution::Invalid => {
                let message = self.apologize(question, APOLOGY, audit).await?;
                Ok(GeneratedSql::Unanswerable { message })
            }
        }
    }

    /// Produce validated SQL, run it and summarize the rows
    pub async fn natural_response(
        &self,
        question: &Question,
    ) -> Result<NaturalResponse, PipelineError> {
        let mut audit = AuditEntry::open(question, self.models());
        let result = self.natural_response_inner(question, &mut audit).await;
        self.close(audit, result.as_ref().err()).await;
        result
    }

    async fn natural_response_inner(
        &self,
        question: &Question,
        audit: &mut AuditEntry,
    ) -> Result<NaturalResponse, PipelineError> {
        let (source_type, resolution) = self.resolve_sql(question, audit).await?;
        let sql = match resolution {
            Resolution::Cached(sql) | Resolution::Validated(sql) => sql,
            Resolution::Invalid => {
                let message = self.apologize(question, APOLOGY, audit).await?;
                return Ok(NaturalResponse::Unanswerable { message });
            }
        };

        if !self.config.execute_final_sql {
            audit.record("Execution of the final SQL is disabled");
            let message = self.apologize(question, EXECUTION_DISABLED, audit).await?;
            return Ok(NaturalResponse::ExecutionDisabled { sql, message });
        }

        audit.enter(Stage::Execution);
        let results = within(
            self.config.call_timeout(),
            Stage::Execution,
            self.parts.executor.execute(source_type, &sql),
            PipelineError::Execution,
        )
        .await?;
        audit.record(format!("Fetched {} rows", results.row_count()));

        audit.enter(Stage::Summarization);
        let records = serde_json::Value::Array(results.to_records());
        let summary = within(
            self.config.call_timeout(),
            Stage::Summarization,
            self.parts
                .summarizer
                .summarize(question.text(), SummaryInput::Results(&records)),
            PipelineError::Summarization,
        )
        .await?;

        match summary {
            Some(summary) => {
                audit.record(format!("Model says {}", summary));
                Ok(NaturalResponse::Answered {
                    sql,
                    summary,
                    results,
                })
            }
            None => {
                audit.record("Summarizer returned no usable text");
                Ok(NaturalResponse::SummaryUnavailable { sql })
            }
        }
    }

    /// Summarize a fixed message; falls back to the message itself
    async fn apologize(
        &self,
        question: &Question,
        message: &str,
        audit: &mut AuditEntry,
    ) -> Result<String, PipelineError> {
        audit.enter(Stage::Summarization);
        let reply = within(
            self.config.call_timeout(),
            Stage::Summarization,
            self.parts
                .summarizer
                .summarize(question.text(), SummaryInput::Apology(message)),
            PipelineError::Summarization,
        )
        .await?;
        let reply = reply.unwrap_or_else(|| message.to_string());
        audit.record(format!("Model says {}", reply));
        Ok(reply)
    }

    /// Source resolution through validation
    async fn resolve_sql(
        &self,
        question: &Question,
        audit: &mut AuditEntry,
    ) -> Result<(SourceType, Resolution), PipelineError> {
        let limit = self.config.call_timeout();
        let database = question.database();

        audit.enter(Stage::SourceResolution);
        let source_type = within(
            limit,
            Stage::SourceResolution,
            self.parts.catalog.source_type(database),
            PipelineError::Source,
        )
        .await?;
        audit.source_type = Some(source_type);
        audit.record(format!("Source type: {}", source_type));

        audit.enter(Stage::ExactMatch);
        let cached = within(
            limit,
            Stage::ExactMatch,
            self.parts.store.exact_match(question.text(), database),
            PipelineError::Retrieval,
        )
        .await?;
        if let Some(sql) = cached {
            info!(request_id = %audit.request_id, database, "Exact match served from cache");
            audit.cache_hit = true;
            audit.record(format!("Exact match found in cache\n{}", sql));
            audit.final_sql = Some(sql.clone());
            return Ok((source_type, Resolution::Cached(sql)));
        }
        audit.record("No exact match, retrieving schema and examples");

        audit.enter(Stage::Embedding);
        let embedding = within(
            limit,
            Stage::Embedding,
            self.parts.embedder.embed(question.text()),
            PipelineError::Embedding,
        )
        .await?;
        audit.record(format!("Embedded question ({} dimensions)", embedding.len()));

        audit.enter(Stage::Retrieval);
        let tables = self
            .search(MatchKind::Table, database, &embedding, self.config.num_table_matches)
            .await?;
        let columns = self
            .search(MatchKind::Column, database, &embedding, self.config.num_column_matches)
            .await?;
        let examples = self
            .search(MatchKind::Example, database, &embedding, self.config.num_sql_matches)
            .await?;
        audit.record(format!(
            "Retrieved tables:\n{}\nRetrieved columns:\n{}\nRetrieved examples:\n{}",
            dataqna_core::render_matches(&tables),
            dataqna_core::render_matches(&columns),
            dataqna_core::render_matches(&examples)
        ));

        if tables.is_empty() && columns.is_empty() {
            warn!(request_id = %audit.request_id, database, "No schema matched the question");
            audit.record("No tables or columns matched; the question cannot be answered from this data source");
            return Ok((source_type, Resolution::Invalid));
        }

        let ctx = BuildContext {
            source_type,
            question: question.text(),
            tables: &tables,
            columns: &columns,
            examples: &examples,
        };

        audit.enter(Stage::Build);
        let candidate = within(
            limit,
            Stage::Build,
            self.parts.builder.build(&ctx),
            PipelineError::Build,
        )
        .await?;
        let sql = match candidate {
            CandidateSql::Unrelated => {
                audit.record("Builder reports the question is unrelated to the data source");
                return Ok((source_type, Resolution::Invalid));
            }
            CandidateSql::Candidate(sql) => sql,
        };
        audit.record(format!("Generated SQL\n{}", sql));

        audit.enter(Stage::Validation);
        let outcome = DebugLoop::new(self.parts.validator.as_ref(), &self.config)
            .run(&ctx, sql, audit)
            .await?;
        debug!(
            request_id = %audit.request_id,
            valid = outcome.valid,
            rounds = outcome.rounds,
            corrections = outcome.corrections,
            "Validation finished"
        );
        audit.record(format!("Final SQL after debugger\n{}", outcome.sql));
        audit.final_sql = Some(outcome.sql.clone());

        if outcome.valid {
            Ok((source_type, Resolution::Validated(outcome.sql)))
        } else {
            Ok((source_type, Resolution::Invalid))
        }
    }

    async fn search(
        &self,
        kind: MatchKind,
        database: &str,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievalMatch>, PipelineError> {
        within(
            self.config.call_timeout(),
            Stage::Retrieval,
            self.parts.store.similarity_search(
                kind,
                database,
                embedding,
                k,
                self.config.similarity_threshold,
            ),
            PipelineError::Retrieval,
        )
        .await
    }

    /// Persist the audit entry; failures here are logged, never returned
    async fn close(&self, mut audit: AuditEntry, failure: Option<&PipelineError>) {
        if let Some(err) = failure {
            warn!(
                request_id = %audit.request_id,
                stage = %audit.process_step,
                error = %err,
                "Request failed"
            );
            audit.fail(err);
        }

        let persisted = tokio::time::timeout(
            self.config.call_timeout(),
            self.parts.audit.persist(&audit),
        )
        .await;
        match persisted {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(request_id = %audit.request_id, error = %e, "Failed to persist audit entry")
            }
            Err(_) => error!(request_id = %audit.request_id, "Timed out persisting audit entry"),
        }
    }
}
