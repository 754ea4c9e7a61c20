//! Collaborator contracts
//!
//! The pipeline only talks to these traits. Every operation is async, including
//! those whose backing store is synchronous; such stores wrap the call.

use async_trait::async_trait;

use crate::audit::AuditEntry;
use crate::error::{AgentError, ExecError, StoreError};
use crate::types::{
    CandidateSql, Embedding, KnownSql, MatchKind, RetrievalMatch, SourceType, SummaryInput,
    TabularResult, ValidationVerdict,
};

#[async_trait]
pub trait QuestionEmbedder: Send + Sync {
    fn model(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Embedding, AgentError>;
}

/// Read side of the schema/example vector store
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Cached SQL for a previously seen question, after case/quote normalization
    async fn exact_match(&self, question: &str, database: &str)
        -> Result<Option<String>, StoreError>;

    /// At most `k` matches with similarity >= `threshold`, most similar first
    async fn similarity_search(
        &self,
        kind: MatchKind,
        database: &str,
        embedding: &[f32],
        k: usize,
        threshold: f32,
    ) -> Result<Vec<RetrievalMatch>, StoreError>;
}

/// Ingestion of new question/SQL examples
#[async_trait]
pub trait ExampleSink: Send + Sync {
    async fn add_example(
        &self,
        database: &str,
        question: &str,
        sql: &str,
        embedding: Embedding,
    ) -> Result<(), StoreError>;
}

/// Stored metadata about the known data sources
#[async_trait]
pub trait SourceCatalog: Send + Sync {
    /// Backend kind for a data source. Fails when nothing is recorded.
    async fn source_type(&self, database: &str) -> Result<SourceType, StoreError>;

    /// Known sources as `{schema}-{source_type}` identifiers
    async fn available_databases(&self) -> Result<Vec<String>, StoreError>;

    async fn known_sql(&self, database: &str, limit: usize) -> Result<Vec<KnownSql>, StoreError>;
}

/// Everything the builder and validator see about a request
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    pub source_type: SourceType,
    pub question: &'a str,
    pub tables: &'a [RetrievalMatch],
    pub columns: &'a [RetrievalMatch],
    pub examples: &'a [RetrievalMatch],
}

#[async_trait]
pub trait SqlBuilder: Send + Sync {
    fn model(&self) -> &str;

    async fn build(&self, ctx: &BuildContext<'_>) -> Result<CandidateSql, AgentError>;
}

#[async_trait]
pub trait SqlValidator: Send + Sync {
    fn model(&self) -> &str;

    async fn validate(
        &self,
        ctx: &BuildContext<'_>,
        sql: &str,
    ) -> Result<ValidationVerdict, AgentError>;
}

#[async_trait]
pub trait ResponseSummarizer: Send + Sync {
    fn model(&self) -> &str;

    /// `Ok(None)` means the model produced nothing usable
    async fn summarize(
        &self,
        question: &str,
        input: SummaryInput<'_>,
    ) -> Result<Option<String>, AgentError>;
}

#[async_trait]
pub trait ChartGenerator: Send + Sync {
    async fn generate_charts(
        &self,
        question: &str,
        sql: &str,
        results: &serde_json::Value,
    ) -> Result<serde_json::Value, AgentError>;
}

/// Append-only destination for audit entries
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn persist(&self, entry: &AuditEntry) -> Result<(), StoreError>;
}

/// One execution engine
#[async_trait]
pub trait SqlBackend: Send + Sync {
    fn source_type(&self) -> SourceType;

    async fn query(&self, sql: &str) -> Result<TabularResult, ExecError>;

    /// Plan the statement without running it
    async fn dry_run(&self, sql: &str) -> Result<(), ExecError>;
}
