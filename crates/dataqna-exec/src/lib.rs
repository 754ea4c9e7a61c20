//! SQL execution backends
//!
//! Each data source is served by exactly one backend kind. [`QueryExecutor`]
//! routes a statement to the backend registered for the source type and caps
//! the returned rows.

mod duck;
mod executor;
mod postgres;

pub use duck::DuckBackend;
pub use executor::{QueryExecutor, MAX_RESULT_ROWS};
pub use postgres::PgBackend;

/// Statement text without surrounding whitespace or trailing semicolons
pub(crate) fn trim_statement(sql: &str) -> &str {
    sql.trim().trim_end_matches(';').trim_end()
}
