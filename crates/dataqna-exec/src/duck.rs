//! DuckDB execution backend

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use dataqna_core::{ExecError, SourceType, SqlBackend, TabularResult};
use duckdb::types::{TimeUnit, ValueRef};
use duckdb::{Connection, Row};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use crate::trim_statement;

/// Days between 0001-01-01 and 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

pub struct DuckBackend {
    conn: Arc<Mutex<Connection>>,
}

impl DuckBackend {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ExecError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, ExecError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run setup statements (DDL, seed data)
    pub async fn execute_batch(&self, sql: &str) -> Result<(), ExecError> {
        let sql = sql.to_string();
        self.blocking(move |conn| conn.execute_batch(&sql).map_err(db_err))
            .await
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T, ExecError>
    where
        F: FnOnce(&Connection) -> Result<T, ExecError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            // A panic in an earlier statement leaves the connection itself usable
            let guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&guard)
        })
        .await
        .map_err(|e| ExecError::Task(e.to_string()))?
    }
}

#[async_trait]
impl SqlBackend for DuckBackend {
    fn source_type(&self) -> SourceType {
        SourceType::DuckDb
    }

    async fn query(&self, sql: &str) -> Result<TabularResult, ExecError> {
        let sql = trim_statement(sql).to_string();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&sql).map_err(db_err)?;
            let mut rows = stmt.query([]).map_err(db_err)?;

            let mut result = TabularResult::default();
            while let Some(row) = rows.next().map_err(db_err)? {
                if result.columns.is_empty() {
                    let statement = row.as_ref();
                    for i in 0..statement.column_count() {
                        result
                            .columns
                            .push(statement.column_name(i).map_err(db_err)?.to_string());
                    }
                }
                let mut values = Vec::with_capacity(result.columns.len());
                for i in 0..result.columns.len() {
                    values.push(duckdb_value_to_json(row, i)?);
                }
                result.rows.push(values);
            }
            Ok(result)
        })
        .await
    }

    async fn dry_run(&self, sql: &str) -> Result<(), ExecError> {
        let explain = format!("EXPLAIN {}", trim_statement(sql));
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&explain).map_err(db_err)?;
            let mut rows = stmt.query([]).map_err(db_err)?;
            while rows.next().map_err(db_err)?.is_some() {}
            Ok(())
        })
        .await
    }
}

fn db_err(e: duckdb::Error) -> ExecError {
    ExecError::Database(e.to_string())
}

/// Convert one DuckDB cell to JSON
fn duckdb_value_to_json(row: &Row, idx: usize) -> Result<Value, ExecError> {
    let value = match row.get_ref(idx).map_err(db_err)? {
        ValueRef::Null => Value::Null,
        ValueRef::Boolean(b) => Value::Bool(b),
        ValueRef::TinyInt(i) => json!(i),
        ValueRef::SmallInt(i) => json!(i),
        ValueRef::Int(i) => json!(i),
        ValueRef::BigInt(i) => json!(i),
        ValueRef::HugeInt(i) => match i64::try_from(i) {
            Ok(small) => json!(small),
            Err(_) => Value::String(i.to_string()),
        },
        ValueRef::UTinyInt(i) => json!(i),
        ValueRef::USmallInt(i) => json!(i),
        ValueRef::UInt(i) => json!(i),
        ValueRef::UBigInt(i) => json!(i),
        ValueRef::Float(f) => json!(f),
        ValueRef::Double(f) => json!(f),
        ValueRef::Decimal(d) => d
            .to_string()
            .parse::<f64>()
            .map(|f| json!(f))
            .unwrap_or_else(|_| Value::String(d.to_string())),
        // +/-infinity dates sit at the ends of the i32 range
        ValueRef::Date32(days) => days
            .checked_add(UNIX_EPOCH_DAYS_FROM_CE)
            .and_then(NaiveDate::from_num_days_from_ce_opt)
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null),
        ValueRef::Timestamp(unit, v) => {
            let micros = match unit {
                TimeUnit::Second => v.saturating_mul(1_000_000),
                TimeUnit::Millisecond => v.saturating_mul(1_000),
                TimeUnit::Microsecond => v,
                TimeUnit::Nanosecond => v / 1_000,
            };
            DateTime::from_timestamp_micros(micros)
                .map(|ts| Value::String(ts.to_rfc3339()))
                .unwrap_or(Value::Null)
        }
        ValueRef::Text(s) => Value::String(String::from_utf8_lossy(s).to_string()),
        ValueRef::Blob(b) => Value::String(format!("<blob {} bytes>", b.len())),
        _ => Value::String("<unsupported>".to_string()),
    };
    Ok(value)
}
