//! Request-scoped value types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Text the summarizer receives when no valid SQL could be produced
pub const APOLOGY: &str = "I am sorry, I could not come up with a valid SQL.";

/// A natural-language question asked against one data source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    text: String,
    database: String,
}

impl Question {
    pub fn new(text: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            database: database.into(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn database(&self) -> &str {
        &self.database
    }
}

/// Fixed-dimension vector produced by a question embedder
pub type Embedding = Vec<f32>;

/// Execution engine behind a data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    DuckDb,
    Postgres,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::DuckDb => "duckdb",
            SourceType::Postgres => "postgres",
        }
    }

    /// SQL dialect name handed to the builder prompt
    pub fn dialect(&self) -> &'static str {
        match self {
            SourceType::DuckDb => "DuckDB",
            SourceType::Postgres => "PostgreSQL",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "duckdb" => Ok(SourceType::DuckDb),
            "postgres" | "postgresql" | "cloudsql-pg" => Ok(SourceType::Postgres),
            other => Err(format!("Unknown source type: {}", other)),
        }
    }
}

/// Which embedded collection a similarity search runs over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Table,
    Column,
    Example,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::Table => "table",
            MatchKind::Column => "column",
            MatchKind::Example => "example",
        }
    }
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The stored entity a retrieval match points at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MatchSource {
    Table {
        schema: String,
        table: String,
        description: String,
    },
    Column {
        schema: String,
        table: String,
        column: String,
        description: String,
    },
    Example {
        question: String,
        sql: String,
    },
}

/// One similarity-search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalMatch {
    pub source: MatchSource,
    pub similarity: f32,
}

impl RetrievalMatch {
    pub fn kind(&self) -> MatchKind {
        match self.source {
            MatchSource::Table { .. } => MatchKind::Table,
            MatchSource::Column { .. } => MatchKind::Column,
            MatchSource::Example { .. } => MatchKind::Example,
        }
    }
}

impl fmt::Display for RetrievalMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            MatchSource::Table {
                schema,
                table,
                description,
            } => write!(
                f,
                "Table {}.{} (similarity {:.3}): {}",
                schema, table, self.similarity, description
            ),
            MatchSource::Column {
                schema,
                table,
                column,
                description,
            } => write!(
                f,
                "Column {}.{}.{} (similarity {:.3}): {}",
                schema, table, column, self.similarity, description
            ),
            MatchSource::Example { question, sql } => write!(
                f,
                "Example (similarity {:.3}): question: {} | sql: {}",
                self.similarity, question, sql
            ),
        }
    }
}

/// Render matches one per line for prompts and audit narratives
pub fn render_matches(matches: &[RetrievalMatch]) -> String {
    if matches.is_empty() {
        return "(none)".to_string();
    }
    matches
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Builder output: either a statement or an explicit "cannot answer"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "sql")]
pub enum CandidateSql {
    Unrelated,
    Candidate(String),
}

impl CandidateSql {
    pub fn sql(&self) -> Option<&str> {
        match self {
            CandidateSql::Unrelated => None,
            CandidateSql::Candidate(sql) => Some(sql),
        }
    }
}

/// Validator verdict for one candidate statement
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corrected_sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl ValidationVerdict {
    pub fn valid() -> Self {
        Self {
            valid: true,
            ..Self::default()
        }
    }

    pub fn invalid(diagnostic: impl Into<String>) -> Self {
        Self {
            valid: false,
            corrected_sql: None,
            diagnostic: Some(diagnostic.into()),
        }
    }

    pub fn with_correction(mut self, sql: impl Into<String>) -> Self {
        self.corrected_sql = Some(sql.into());
        self
    }
}

/// Rows returned by a backend, in result order
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TabularResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl TabularResult {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Keep the first `max_rows` rows. Returns true when rows were dropped.
    pub fn truncate(&mut self, max_rows: usize) -> bool {
        let truncated = self.rows.len() > max_rows;
        self.rows.truncate(max_rows);
        truncated
    }

    /// Rows as JSON objects keyed by column name
    pub fn to_records(&self) -> Vec<serde_json::Value> {
        self.rows
            .iter()
            .map(|row| {
                let mut record = serde_json::Map::new();
                for (col, value) in self.columns.iter().zip(row.iter()) {
                    record.insert(col.clone(), value.clone());
                }
                serde_json::Value::Object(record)
            })
            .collect()
    }
}

/// What the summarizer is asked to describe
#[derive(Debug, Clone, Copy)]
pub enum SummaryInput<'a> {
    Results(&'a serde_json::Value),
    Apology(&'a str),
}

/// A cached question/SQL example pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownSql {
    pub example_user_question: String,
    pub example_generated_sql: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_source_type_aliases() {
        assert_eq!("duckdb".parse::<SourceType>().unwrap(), SourceType::DuckDb);
        assert_eq!("cloudsql-pg".parse::<SourceType>().unwrap(), SourceType::Postgres);
        assert_eq!(" Postgres ".parse::<SourceType>().unwrap(), SourceType::Postgres);
        assert!("bigtable".parse::<SourceType>().is_err());
    }

    #[test]
    fn test_truncate_keeps_leading_rows() {
        let mut result = TabularResult {
            columns: vec!["n".to_string()],
            rows: (0..15).map(|i| vec![json!(i)]).collect(),
        };

        assert!(result.truncate(10));
        assert_eq!(result.row_count(), 10);
        assert_eq!(result.rows[0][0], json!(0));
        assert_eq!(result.rows[9][0], json!(9));

        assert!(!result.truncate(10));
    }

    #[test]
    fn test_records_keep_column_order() {
        let result = TabularResult {
            columns: vec!["region".to_string(), "revenue".to_string()],
            rows: vec![vec![json!("EMEA"), json!(120.5)]],
        };

        let records = result.to_records();
        let keys: Vec<&String> = records[0].as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["region", "revenue"]);
    }

    #[test]
    fn test_match_kind_follows_source() {
        let m = RetrievalMatch {
            source: MatchSource::Example {
                question: "q".to_string(),
                sql: "select 1".to_string(),
            },
            similarity: 0.9,
        };
        assert_eq!(m.kind(), MatchKind::Example);
        assert!(m.to_string().contains("select 1"));
        assert_eq!(render_matches(&[]), "(none)");
    }
}
