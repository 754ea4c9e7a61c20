//! DuckDB-backed metadata store
//!
//! One DuckDB database holds the embedded table/column descriptions, the cached
//! question→SQL examples and the audit log. [`DuckMetadataStore`] implements the
//! `VectorStore`, `ExampleSink`, `SourceCatalog` and `AuditSink` contracts over it.

mod audit;
mod catalog;
pub mod schema;
mod store;
pub mod vector;

pub use store::DuckMetadataStore;
pub use vector::{cosine_similarity, normalize_question, rank_matches};
