//! HTTP endpoints
//!
//! Every endpoint answers with HTTP 200 and a JSON envelope
//! `{"ResponseCode": <200|201|500>, "<payload key>": ..., "Error": "..."}`.
//! Clients read the outcome from `ResponseCode`, not from the transport status.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, Method},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use dataqna_core::{
    ChartGenerator, ExampleSink, Question, QuestionEmbedder, SourceCatalog, SummaryInput,
};
use dataqna_pipeline::{GeneratedSql, NaturalResponse, Pipeline};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub catalog: Arc<dyn SourceCatalog>,
    pub examples: Arc<dyn ExampleSink>,
    pub embedder: Arc<dyn QuestionEmbedder>,
    pub charts: Arc<dyn ChartGenerator>,
    pub metrics: Arc<Metrics>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/available_databases", get(available_databases))
        .route("/embed_sql", post(embed_sql))
        .route("/run_query", post(run_query))
        .route("/get_known_sql", post(get_known_sql))
        .route("/generate_sql", post(generate_sql))
        .route("/generate_viz", post(generate_viz))
        .route("/summarize_results", post(summarize_results))
        .route("/natural_response", post(natural_response))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        // The web frontend is served from a different origin
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Response envelope
struct Reply {
    code: u16,
    key: &'static str,
    payload: Value,
    error: String,
}

impl Reply {
    fn ok(key: &'static str, payload: Value) -> Self {
        Self::with_code(200, key, payload)
    }

    fn with_code(code: u16, key: &'static str, payload: Value) -> Self {
        Self {
            code,
            key,
            payload,
            error: String::new(),
        }
    }

    fn failed(key: &'static str, payload: Value, error: impl Into<String>) -> Self {
        Self {
            code: 500,
            key,
            payload,
            error: error.into(),
        }
    }

    /// Count the reply under `endpoint` and render it
    fn finish(self, state: &AppState, endpoint: &str) -> Json<Value> {
        state.metrics.observe(endpoint, self.code);
        if self.code >= 500 {
            warn!(endpoint, error = %self.error, "Request failed");
        }
        let mut body = Map::new();
        body.insert("ResponseCode".to_string(), json!(self.code));
        body.insert(self.key.to_string(), self.payload);
        body.insert("Error".to_string(), Value::String(self.error));
        Json(Value::Object(body))
    }
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, String> {
    serde_json::from_slice(body).map_err(|e| format!("Invalid request body: {}", e))
}

/// `sql_results` may arrive as JSON or as a JSON-encoded string
fn results_value(raw: Value) -> Value {
    match raw {
        Value::String(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        other => other,
    }
}

#[derive(Debug, Deserialize)]
struct DatabaseRequest {
    user_database: String,
}

#[derive(Debug, Deserialize)]
struct QuestionRequest {
    user_question: String,
    user_database: String,
}

#[derive(Debug, Deserialize)]
struct EmbedSqlRequest {
    user_database: String,
    generated_sql: String,
    user_question: String,
}

#[derive(Debug, Deserialize)]
struct RunQueryRequest {
    user_database: String,
    generated_sql: String,
}

#[derive(Debug, Deserialize)]
struct VizRequest {
    user_question: String,
    generated_sql: String,
    sql_results: Value,
}

#[derive(Debug, Deserialize)]
struct SummarizeRequest {
    user_question: String,
    sql_results: Value,
}

async fn available_databases(State(state): State<AppState>) -> Json<Value> {
    let reply = match state.catalog.available_databases().await {
        Ok(names) => Reply::ok("KnownDB", json!(names)),
        Err(e) => Reply::failed(
            "KnownDB",
            json!(""),
            format!("Issue was encountered while listing data sources: {}", e),
        ),
    };
    reply.finish(&state, "available_databases")
}

async fn embed_sql(State(state): State<AppState>, body: Bytes) -> Json<Value> {
    let reply = match parse_body::<EmbedSqlRequest>(&body) {
        Ok(req) => match embed_example(&state, &req).await {
            Ok(()) => {
                info!(database = %req.user_database, "Stored new example SQL");
                Reply::with_code(
                    201,
                    "Message",
                    json!("Example SQL has been accepted for embedding"),
                )
            }
            Err(e) => Reply::failed(
                "Message",
                json!(""),
                format!("Issue was encountered while embedding the SQL as example: {}", e),
            ),
        },
        Err(e) => Reply::failed("Message", json!(""), e),
    };
    reply.finish(&state, "embed_sql")
}

async fn embed_example(state: &AppState, req: &EmbedSqlRequest) -> Result<(), String> {
    let embedding = state
        .embedder
        .embed(&req.user_question)
        .await
        .map_err(|e| e.to_string())?;
    state
        .examples
        .add_example(&req.user_database, &req.user_question, &req.generated_sql, embedding)
        .await
        .map_err(|e| e.to_string())
}

async fn run_query(State(state): State<AppState>, body: Bytes) -> Json<Value> {
    let reply = match parse_body::<RunQueryRequest>(&body) {
        Ok(req) => match execute(&state, &req).await {
            Ok(records) => Reply::ok("KnownDB", records),
            Err(e) => Reply::failed(
                "KnownDB",
                json!(""),
                format!(
                    "Issue was encountered while running the generated SQL, please check the logs! {}",
                    e
                ),
            ),
        },
        Err(e) => Reply::failed("KnownDB", json!(""), e),
    };
    reply.finish(&state, "run_query")
}

async fn execute(state: &AppState, req: &RunQueryRequest) -> Result<Value, String> {
    let source_type = state
        .catalog
        .source_type(&req.user_database)
        .await
        .map_err(|e| e.to_string())?;
    let result = state
        .pipeline
        .executor()
        .execute(source_type, &req.generated_sql)
        .await
        .map_err(|e| e.to_string())?;
    Ok(Value::Array(result.to_records()))
}

async fn get_known_sql(State(state): State<AppState>, body: Bytes) -> Json<Value> {
    let reply = match parse_body::<DatabaseRequest>(&body) {
        Ok(req) => {
            let limit = state.pipeline.config().known_sql_limit;
            match state.catalog.known_sql(&req.user_database, limit).await {
                Ok(known) => Reply::ok("KnownSQL", json!(known)),
                Err(e) => Reply::failed(
                    "KnownSQL",
                    json!(""),
                    format!("Issue was encountered while fetching known SQL: {}", e),
                ),
            }
        }
        Err(e) => Reply::failed("KnownSQL", json!(""), e),
    };
    reply.finish(&state, "get_known_sql")
}

async fn generate_sql(State(state): State<AppState>, body: Bytes) -> Json<Value> {
    let reply = match parse_body::<QuestionRequest>(&body) {
        Ok(req) => {
            let question = Question::new(req.user_question, req.user_database);
            match state.pipeline.generate_sql(&question).await {
                Ok(GeneratedSql::Sql { sql, .. }) => Reply::ok("GeneratedSQL", json!(sql)),
                Ok(GeneratedSql::Unanswerable { message }) => {
                    Reply::ok("GeneratedSQL", json!(message))
                }
                Err(e) => {
                    state.metrics.failure(e.stage());
                    Reply::failed(
                        "GeneratedSQL",
                        json!(""),
                        format!(
                            "Issue was encountered while generating the SQL, please check the logs! {}",
                            e
                        ),
                    )
                }
            }
        }
        Err(e) => Reply::failed("GeneratedSQL", json!(""), e),
    };
    reply.finish(&state, "generate_sql")
}

async fn generate_viz(State(state): State<AppState>, body: Bytes) -> Json<Value> {
    let reply = match parse_body::<VizRequest>(&body) {
        Ok(req) => {
            let results = results_value(req.sql_results);
            match state
                .charts
                .generate_charts(&req.user_question, &req.generated_sql, &results)
                .await
            {
                Ok(charts) => Reply::ok("GeneratedChartjs", charts),
                Err(e) => Reply::failed(
                    "GeneratedChartjs",
                    json!(""),
                    format!("Issue was encountered while generating the chart: {}", e),
                ),
            }
        }
        Err(e) => Reply::failed("GeneratedChartjs", json!(""), e),
    };
    reply.finish(&state, "generate_viz")
}

async fn summarize_results(State(state): State<AppState>, body: Bytes) -> Json<Value> {
    let reply = match parse_body::<SummarizeRequest>(&body) {
        Ok(req) => {
            let results = results_value(req.sql_results);
            match state
                .pipeline
                .summarizer()
                .summarize(&req.user_question, SummaryInput::Results(&results))
                .await
            {
                Ok(Some(summary)) => Reply::ok("summary_response", json!(summary)),
                Ok(None) => Reply::failed(
                    "summary_response",
                    json!(""),
                    "Cannot generate the summary",
                ),
                Err(e) => Reply::failed(
                    "summary_response",
                    json!(""),
                    format!("Issue was encountered while summarizing the results: {}", e),
                ),
            }
        }
        Err(e) => Reply::failed("summary_response", json!(""), e),
    };
    reply.finish(&state, "summarize_results")
}

async fn natural_response(State(state): State<AppState>, body: Bytes) -> Json<Value> {
    let reply = match parse_body::<QuestionRequest>(&body) {
        Ok(req) => {
            let question = Question::new(req.user_question, req.user_database);
            match state.pipeline.natural_response(&question).await {
                Ok(NaturalResponse::Answered { summary, .. }) => {
                    Reply::ok("summary_response", json!(summary))
                }
                Ok(NaturalResponse::SummaryUnavailable { .. }) => Reply::failed(
                    "summary_response",
                    json!(""),
                    "Cannot generate the summary",
                ),
                // No valid SQL is an answer on /generate_sql but a failure here
                Ok(NaturalResponse::Unanswerable { message }) => Reply::failed(
                    "summary_response",
                    json!(message),
                    "Could not generate a valid SQL for the question",
                ),
                Ok(NaturalResponse::ExecutionDisabled { message, .. }) => Reply::failed(
                    "summary_response",
                    json!(message),
                    "Execution of the final SQL is disabled",
                ),
                Err(e) => {
                    state.metrics.failure(e.stage());
                    Reply::failed(
                        "summary_response",
                        json!(""),
                        format!("Issue was encountered while answering the question: {}", e),
                    )
                }
            }
        }
        Err(e) => Reply::failed("summary_response", json!(""), e),
    };
    reply.finish(&state, "natural_response")
}

async fn health_check() -> &'static str {
    "OK"
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = state.metrics.render().unwrap_or_else(|e| {
        error!(error = %e, "Failed to render metrics");
        String::new()
    });
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}
