//! Mock collaborators and a seeded harness for pipeline tests
#![allow(dead_code)]

use async_trait::async_trait;
use dataqna_core::{
    AgentError, AuditEntry, AuditSink, BuildContext, CandidateSql, Embedding, ExecError, MatchKind,
    QuestionEmbedder, ResponseSummarizer, RetrievalMatch, SourceType, SqlBackend, SqlBuilder,
    SqlValidator, StoreError, SummaryInput, TabularResult, ValidationVerdict, VectorStore,
    ExampleSink,
};
use dataqna_exec::{DuckBackend, QueryExecutor};
use dataqna_pipeline::{Collaborators, Pipeline, PipelineConfig};
use dataqna_store::DuckMetadataStore;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TOP_CUSTOMERS_SQL: &str = "SELECT name FROM customers ORDER BY revenue DESC LIMIT 10";

pub struct MockEmbedder {
    pub calls: AtomicUsize,
    vector: Embedding,
}

impl MockEmbedder {
    pub fn new(vector: Embedding) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            vector,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuestionEmbedder for MockEmbedder {
    fn model(&self) -> &str {
        "mock-embedding"
    }

    async fn embed(&self, _text: &str) -> Result<Embedding, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector.clone())
    }
}

pub struct MockBuilder {
    pub calls: AtomicUsize,
    reply: CandidateSql,
    delay: Option<Duration>,
}

impl MockBuilder {
    pub fn returning(sql: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            reply: CandidateSql::Candidate(sql.to_string()),
            delay: None,
        }
    }

    pub fn unrelated() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            reply: CandidateSql::Unrelated,
            delay: None,
        }
    }

    pub fn slow(sql: &str, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::returning(sql)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SqlBuilder for MockBuilder {
    fn model(&self) -> &str {
        "mock-chat"
    }

    async fn build(&self, ctx: &BuildContext<'_>) -> Result<CandidateSql, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(!ctx.tables.is_empty() || !ctx.columns.is_empty());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.reply.clone())
    }
}

/// Replays scripted verdicts, repeating the last one
pub struct MockValidator {
    pub calls: AtomicUsize,
    script: Vec<ValidationVerdict>,
}

impl MockValidator {
    pub fn always_valid() -> Self {
        Self::scripted(vec![ValidationVerdict::valid()])
    }

    pub fn scripted(script: Vec<ValidationVerdict>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            script,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SqlValidator for MockValidator {
    fn model(&self) -> &str {
        "mock-chat"
    }

    async fn validate(
        &self,
        _ctx: &BuildContext<'_>,
        _sql: &str,
    ) -> Result<ValidationVerdict, AgentError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let idx = call.min(self.script.len() - 1);
        Ok(self.script[idx].clone())
    }
}

pub struct MockSummarizer {
    reply: Option<String>,
    pub inputs: Mutex<Vec<String>>,
}

impl MockSummarizer {
    pub fn replying(reply: Option<&str>) -> Self {
        Self {
            reply: reply.map(str::to_string),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResponseSummarizer for MockSummarizer {
    fn model(&self) -> &str {
        "mock-chat"
    }

    async fn summarize(
        &self,
        _question: &str,
        input: SummaryInput<'_>,
    ) -> Result<Option<String>, AgentError> {
        let seen = match input {
            SummaryInput::Results(rows) => rows.to_string(),
            SummaryInput::Apology(text) => text.to_string(),
        };
        self.inputs.lock().unwrap().push(seen);
        Ok(self.reply.clone())
    }
}

#[derive(Default)]
pub struct RecordingAudit {
    pub entries: Mutex<Vec<AuditEntry>>,
    pub broken: bool,
}

impl RecordingAudit {
    pub fn broken() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            broken: true,
        }
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for RecordingAudit {
    async fn persist(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        self.entries.lock().unwrap().push(entry.clone());
        if self.broken {
            return Err(StoreError::Database("audit table is read-only".to_string()));
        }
        Ok(())
    }
}

/// Vector store whose similarity search is unreachable
pub struct UnreachableStore;

#[async_trait]
impl VectorStore for UnreachableStore {
    async fn exact_match(&self, _q: &str, _db: &str) -> Result<Option<String>, StoreError> {
        Ok(None)
    }

    async fn similarity_search(
        &self,
        _kind: MatchKind,
        _database: &str,
        _embedding: &[f32],
        _k: usize,
        _threshold: f32,
    ) -> Result<Vec<RetrievalMatch>, StoreError> {
        Err(StoreError::Database("connection refused".to_string()))
    }
}

/// DuckDB backend that counts statements sent to it
pub struct CountingBackend {
    inner: DuckBackend,
    pub calls: AtomicUsize,
}

impl CountingBackend {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SqlBackend for CountingBackend {
    fn source_type(&self) -> SourceType {
        self.inner.source_type()
    }

    async fn query(&self, sql: &str) -> Result<TabularResult, ExecError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.query(sql).await
    }

    async fn dry_run(&self, sql: &str) -> Result<(), ExecError> {
        self.inner.dry_run(sql).await
    }
}

/// Metadata store seeded with a `sales` source (customers table) and an
/// `hr` source whose schema is unrelated to the mock question embedding
pub struct Harness {
    pub store: DuckMetadataStore,
    pub vectors: Arc<dyn VectorStore>,
    pub embedder: Arc<MockEmbedder>,
    pub builder: Arc<MockBuilder>,
    pub validator: Arc<MockValidator>,
    pub summarizer: Arc<MockSummarizer>,
    pub backend: Arc<CountingBackend>,
    pub audit: Arc<RecordingAudit>,
}

impl Harness {
    pub async fn new() -> Self {
        let store = DuckMetadataStore::open_in_memory().unwrap();
        store
            .add_table(
                SourceType::DuckDb,
                "sales",
                "customers",
                "Customers with their lifetime revenue",
                vec![1.0, 0.0],
            )
            .await
            .unwrap();
        store
            .add_column(
                SourceType::DuckDb,
                "sales",
                "customers",
                "revenue",
                "Lifetime revenue in USD",
                vec![0.9, 0.1],
            )
            .await
            .unwrap();
        store
            .add_example("sales", "show top 10 customers", TOP_CUSTOMERS_SQL, vec![1.0, 0.0])
            .await
            .unwrap();
        store
            .add_table(SourceType::DuckDb, "hr", "employees", "Employee roster", vec![0.0, 1.0])
            .await
            .unwrap();

        let data = DuckBackend::open_in_memory().unwrap();
        data.execute_batch(
            "CREATE TABLE customers AS \
             SELECT range AS id, 'customer ' || range AS name, (100 - range) * 10 AS revenue \
             FROM range(15);",
        )
        .await
        .unwrap();

        Self {
            vectors: Arc::new(store.clone()),
            store,
            embedder: Arc::new(MockEmbedder::new(vec![1.0, 0.0])),
            builder: Arc::new(MockBuilder::returning(
                "SELECT name, revenue FROM customers ORDER BY revenue DESC",
            )),
            validator: Arc::new(MockValidator::always_valid()),
            summarizer: Arc::new(MockSummarizer::replying(Some("Here is what I found."))),
            backend: Arc::new(CountingBackend {
                inner: data,
                calls: AtomicUsize::new(0),
            }),
            audit: Arc::new(RecordingAudit::default()),
        }
    }

    pub fn pipeline(&self, config: PipelineConfig) -> Pipeline {
        Pipeline::new(
            config,
            Collaborators {
                catalog: Arc::new(self.store.clone()),
                store: self.vectors.clone(),
                embedder: self.embedder.clone(),
                builder: self.builder.clone(),
                validator: self.validator.clone(),
                summarizer: self.summarizer.clone(),
                executor: QueryExecutor::new().with_backend(self.backend.clone()),
                audit: self.audit.clone(),
            },
        )
    }
}
