//! OpenAI-backed embedder and agents
//!
//! The builder, debugger, responder and visualizer share one chat client and
//! differ only in their prompts and in how the reply is interpreted.

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
        CreateEmbeddingRequestArgs, EmbeddingInput,
    },
    Client,
};
use async_trait::async_trait;
use dataqna_core::{
    render_matches, AgentError, BuildContext, CandidateSql, ChartGenerator, Embedding,
    QuestionEmbedder, ResponseSummarizer, SqlBuilder, SqlValidator, SummaryInput,
    ValidationVerdict,
};
use dataqna_exec::QueryExecutor;
use serde_json::Value;
use tracing::{debug, info};

/// Marker the builder prompt asks for when the question cannot be answered
pub const UNRELATED_MARKER: &str = "unrelated_answer";

const BUILDER_PROMPT: &str = r#"You are an expert SQL developer. Write one {dialect} query that answers the user's question.

Use only the tables and columns listed below. Qualify table names with their schema.
Return ONLY the SQL statement, with no explanation and no markdown.
If the question cannot be answered from these tables, return exactly: unrelated_answer

## Tables
{tables}

## Columns
{columns}

## Known good question/SQL pairs
{examples}"#;

const DEBUGGER_PROMPT: &str = r#"You are an expert SQL developer fixing a {dialect} query that failed to plan.

Return ONLY the corrected SQL statement, with no explanation and no markdown.
Use only the tables and columns listed below. If the query cannot be fixed, return exactly: unrelated_answer

## Tables
{tables}

## Columns
{columns}

## Known good question/SQL pairs
{examples}"#;

const RESPONDER_PROMPT: &str = "You answer business questions in plain English. \
Given the user's question and the data returned for it, reply with a short, direct \
answer. If you are given a message instead of data, rephrase that message politely \
for the user. Do not mention SQL.";

const VISUALIZER_PROMPT: &str = r#"You design Chart.js charts. Given a question, the SQL that answered it and its results, return a JSON object with two keys, "chart_div" and "chart_div_1", each holding a complete Chart.js configuration object (type, data, options) for a useful chart of the results.
Return ONLY JSON, with no explanation and no markdown."#;

pub fn client(api_key: String) -> Client<OpenAIConfig> {
    Client::with_config(OpenAIConfig::new().with_api_key(api_key))
}

fn request_err(e: impl std::fmt::Display) -> AgentError {
    AgentError::Request(e.to_string())
}

/// Strip a surrounding markdown code fence (```sql, ```json, ```) if present
pub fn strip_code_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match body.find('\n') {
        Some(newline) => &body[newline + 1..],
        None => strip_fence_tag(body),
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Drop the language tag of a one-line fence such as "```sql SELECT 1```"
fn strip_fence_tag(body: &str) -> &str {
    let body = body.trim_start();
    match body.split_once(char::is_whitespace) {
        Some((tag, rest)) if FENCE_TAGS.iter().any(|t| t.eq_ignore_ascii_case(tag)) => rest,
        _ => body,
    }
}

const FENCE_TAGS: &[&str] = &["sql", "json", "postgresql", "duckdb"];

/// Interpret a builder or debugger reply
pub fn parse_candidate(reply: &str) -> Result<CandidateSql, AgentError> {
    let sql = strip_code_fences(reply);
    if sql.contains(UNRELATED_MARKER) {
        return Ok(CandidateSql::Unrelated);
    }
    if sql.is_empty() {
        return Err(AgentError::EmptyResponse);
    }
    Ok(CandidateSql::Candidate(sql.to_string()))
}

fn render_prompt(template: &str, ctx: &BuildContext<'_>) -> String {
    template
        .replace("{dialect}", ctx.source_type.dialect())
        .replace("{tables}", &render_matches(ctx.tables))
        .replace("{columns}", &render_matches(ctx.columns))
        .replace("{examples}", &render_matches(ctx.examples))
}

pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(client: Client<OpenAIConfig>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl QuestionEmbedder for OpenAiEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Embedding, AgentError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(self.model.as_str())
            .input(EmbeddingInput::String(text.to_string()))
            .build()
            .map_err(request_err)?;
        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(request_err)?;
        response
            .data
            .into_iter()
            .next()
            .map(|e| e.embedding)
            .ok_or(AgentError::EmptyResponse)
    }
}

/// One system prompt plus one user message against a chat model
#[derive(Clone)]
pub struct ChatAgent {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
}

impl ChatAgent {
    pub fn new(client: Client<OpenAIConfig>, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            client,
            model: model.into(),
            temperature,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn complete(&self, system: &str, user: String) -> Result<String, AgentError> {
        let messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system)
                    .build()
                    .map_err(request_err)?,
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(user)
                    .build()
                    .map_err(request_err)?,
            ),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.as_str())
            .messages(messages)
            .temperature(self.temperature)
            .build()
            .map_err(request_err)?;

        let response = self.client.chat().create(request).await.map_err(request_err)?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(AgentError::EmptyResponse)?;

        debug!(model = %self.model, reply = %content, "LLM response");
        Ok(content)
    }
}

pub struct BuildAgent {
    chat: ChatAgent,
}

impl BuildAgent {
    pub fn new(chat: ChatAgent) -> Self {
        Self { chat }
    }
}

#[async_trait]
impl SqlBuilder for BuildAgent {
    fn model(&self) -> &str {
        self.chat.model()
    }

    async fn build(&self, ctx: &BuildContext<'_>) -> Result<CandidateSql, AgentError> {
        let system = render_prompt(BUILDER_PROMPT, ctx);
        let reply = self
            .chat
            .complete(&system, format!("Question: {}", ctx.question))
            .await?;
        parse_candidate(&reply)
    }
}

/// Validator that plans the statement on its backend and asks the model for
/// a fix when planning fails
pub struct DebugAgent {
    chat: ChatAgent,
    executor: QueryExecutor,
}

impl DebugAgent {
    pub fn new(chat: ChatAgent, executor: QueryExecutor) -> Self {
        Self { chat, executor }
    }
}

#[async_trait]
impl SqlValidator for DebugAgent {
    fn model(&self) -> &str {
        self.chat.model()
    }

    async fn validate(
        &self,
        ctx: &BuildContext<'_>,
        sql: &str,
    ) -> Result<ValidationVerdict, AgentError> {
        let diagnostic = match self.executor.dry_run(ctx.source_type, sql).await {
            Ok(()) => return Ok(ValidationVerdict::valid()),
            Err(e) => e.to_string(),
        };
        info!(error = %diagnostic, "Dry run rejected SQL, asking for a correction");

        let system = render_prompt(DEBUGGER_PROMPT, ctx);
        let user = format!(
            "Question: {}\n\nQuery:\n{}\n\nError:\n{}",
            ctx.question, sql, diagnostic
        );
        let reply = self.chat.complete(&system, user).await?;

        let verdict = ValidationVerdict::invalid(diagnostic);
        match parse_candidate(&reply) {
            Ok(CandidateSql::Candidate(corrected)) => Ok(verdict.with_correction(corrected)),
            Ok(CandidateSql::Unrelated) | Err(AgentError::EmptyResponse) => Ok(verdict),
            Err(e) => Err(e),
        }
    }
}

pub struct ResponderAgent {
    chat: ChatAgent,
}

impl ResponderAgent {
    pub fn new(chat: ChatAgent) -> Self {
        Self { chat }
    }
}

#[async_trait]
impl ResponseSummarizer for ResponderAgent {
    fn model(&self) -> &str {
        self.chat.model()
    }

    async fn summarize(
        &self,
        question: &str,
        input: SummaryInput<'_>,
    ) -> Result<Option<String>, AgentError> {
        let user = match input {
            SummaryInput::Results(rows) => format!("Question: {}\n\nData:\n{}", question, rows),
            SummaryInput::Apology(message) => {
                format!("Question: {}\n\nMessage:\n{}", question, message)
            }
        };
        let reply = match self.chat.complete(RESPONDER_PROMPT, user).await {
            Ok(reply) => reply,
            Err(AgentError::EmptyResponse) => return Ok(None),
            Err(e) => return Err(e),
        };
        let reply = reply.trim();
        Ok((!reply.is_empty()).then(|| reply.to_string()))
    }
}

pub struct VisualizeAgent {
    chat: ChatAgent,
}

impl VisualizeAgent {
    pub fn new(chat: ChatAgent) -> Self {
        Self { chat }
    }
}

#[async_trait]
impl ChartGenerator for VisualizeAgent {
    async fn generate_charts(
        &self,
        question: &str,
        sql: &str,
        results: &Value,
    ) -> Result<Value, AgentError> {
        let user = format!(
            "Question: {}\n\nSQL:\n{}\n\nResults:\n{}",
            question, sql, results
        );
        let reply = self.chat.complete(VISUALIZER_PROMPT, user).await?;
        Ok(parse_chart(&reply))
    }
}

/// Chart replies are JSON when the model behaves; otherwise pass the text through
pub fn parse_chart(reply: &str) -> Value {
    let body = strip_code_fences(reply);
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataqna_core::{MatchSource, RetrievalMatch, SourceType};
    use serde_json::json;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```sql\nSELECT 1\n```"), "SELECT 1");
        assert_eq!(strip_code_fences("  SELECT 1  "), "SELECT 1");
        assert_eq!(strip_code_fences("```\nSELECT 2\n```\n"), "SELECT 2");
        assert_eq!(strip_code_fences("```sql SELECT 1```"), "SELECT 1");
        assert_eq!(strip_code_fences("```json {\"a\": 1}```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```SELECT 3```"), "SELECT 3");
    }

    #[test]
    fn test_parse_candidate() {
        assert_eq!(
            parse_candidate("```sql\nSELECT name FROM sales.customers\n```").unwrap(),
            CandidateSql::Candidate("SELECT name FROM sales.customers".to_string())
        );
        assert_eq!(parse_candidate("unrelated_answer").unwrap(), CandidateSql::Unrelated);
        assert!(matches!(parse_candidate("   "), Err(AgentError::EmptyResponse)));
    }

    #[test]
    fn test_render_prompt_includes_context() {
        let tables = vec![RetrievalMatch {
            source: MatchSource::Table {
                schema: "sales".to_string(),
                table: "customers".to_string(),
                description: "Customer master".to_string(),
            },
            similarity: 0.91,
        }];
        let ctx = BuildContext {
            source_type: SourceType::Postgres,
            question: "top customers",
            tables: &tables,
            columns: &[],
            examples: &[],
        };

        let prompt = render_prompt(BUILDER_PROMPT, &ctx);
        assert!(prompt.contains("PostgreSQL"));
        assert!(prompt.contains("customers"));
        assert!(prompt.contains("(none)"));
        assert!(!prompt.contains("{tables}"));
    }

    #[test]
    fn test_parse_chart() {
        assert_eq!(
            parse_chart("```json\n{\"chart_div\": {\"type\": \"bar\"}}\n```"),
            json!({"chart_div": {"type": "bar"}})
        );
        assert_eq!(parse_chart("no chart today"), json!("no chart today"));
    }
}
