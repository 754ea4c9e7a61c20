//! PostgreSQL execution backend

use async_trait::async_trait;
use dataqna_core::{ExecError, SourceType, SqlBackend, TabularResult};
use serde_json::{Map, Value};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::debug;

use crate::trim_statement;

pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    /// Build a lazily connecting pool; no connection is opened until first use
    pub fn connect_lazy(url: &str, max_connections: u32) -> Result<Self, ExecError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_lazy(url)
            .map_err(db_err)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SqlBackend for PgBackend {
    fn source_type(&self) -> SourceType {
        SourceType::Postgres
    }

    async fn query(&self, sql: &str) -> Result<TabularResult, ExecError> {
        let records: Vec<String> = sqlx::query_scalar(&wrap_as_json(sql))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        debug!(rows = records.len(), "Postgres query finished");
        records_to_table(&records)
    }

    async fn dry_run(&self, sql: &str) -> Result<(), ExecError> {
        sqlx::query(&format!("EXPLAIN {}", trim_statement(sql)))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

fn db_err(e: sqlx::Error) -> ExecError {
    ExecError::Database(e.to_string())
}

/// Wrap a statement so every row comes back as one JSON object with
/// columns in select-list order. The closing parenthesis goes on its own
/// line so a trailing `--` comment cannot swallow it.
fn wrap_as_json(sql: &str) -> String {
    format!(
        "SELECT row_to_json(q)::text FROM ({}\n) q",
        trim_statement(sql)
    )
}

fn records_to_table(records: &[String]) -> Result<TabularResult, ExecError> {
    let mut result = TabularResult::default();
    for raw in records {
        let record: Map<String, Value> = serde_json::from_str(raw)
            .map_err(|e| ExecError::Database(format!("unreadable row: {}", e)))?;
        if result.columns.is_empty() {
            result.columns = record.keys().cloned().collect();
        }
        result.rows.push(record.into_iter().map(|(_, v)| v).collect());
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wrap_strips_terminator() {
        assert_eq!(
            wrap_as_json("SELECT name, salary FROM employees;  "),
            "SELECT row_to_json(q)::text FROM (SELECT name, salary FROM employees\n) q"
        );
        assert_eq!(
            wrap_as_json("SELECT name FROM employees -- highest paid first"),
            "SELECT row_to_json(q)::text FROM (SELECT name FROM employees -- highest paid first\n) q"
        );
    }

    #[test]
    fn test_records_keep_column_order() {
        let records = vec![
            r#"{"name":"Ada","salary":120,"dept":null}"#.to_string(),
            r#"{"name":"Linus","salary":95,"dept":"eng"}"#.to_string(),
        ];
        let table = records_to_table(&records).unwrap();
        assert_eq!(table.columns, vec!["name", "salary", "dept"]);
        assert_eq!(table.rows[0], vec![json!("Ada"), json!(120), Value::Null]);
        assert_eq!(table.rows[1][2], json!("eng"));
    }

    #[test]
    fn test_empty_result() {
        let table = records_to_table(&[]).unwrap();
        assert!(table.columns.is_empty());
        assert_eq!(table.row_count(), 0);
    }

    #[tokio::test]
    async fn test_lazy_pool_does_not_connect() {
        let backend = PgBackend::connect_lazy("postgres://nobody@127.0.0.1:1/none", 1).unwrap();
        assert_eq!(backend.source_type(), SourceType::Postgres);
    }
}
