//! Connection handling and seeding for the metadata database

use dataqna_core::{Embedding, SourceType, StoreError};
use duckdb::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

use crate::schema::ALL_TABLE_CREATION_SQL;

/// Metadata store over a single DuckDB connection
///
/// DuckDB connections are `Send` but not `Sync`, so the connection sits behind a
/// mutex and every call runs on the blocking thread pool.
#[derive(Clone)]
pub struct DuckMetadataStore {
    conn: Arc<Mutex<Connection>>,
}

impl DuckMetadataStore {
    /// Open (or create) the metadata database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(&path).map_err(db_err)?;
        info!(path = %path.as_ref().display(), "Opened metadata store");
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory().map_err(db_err)?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        for ddl in ALL_TABLE_CREATION_SQL {
            conn.execute_batch(ddl).map_err(db_err)?;
        }
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool
    pub(crate) async fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// Register an embedded table description
    pub async fn add_table(
        &self,
        source_type: SourceType,
        schema: &str,
        table: &str,
        description: &str,
        embedding: Embedding,
    ) -> Result<(), StoreError> {
        let values = (
            source_type.as_str().to_string(),
            schema.to_string(),
            table.to_string(),
            description.to_string(),
            encode_embedding(&embedding)?,
        );
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO table_details_embeddings \
                 (source_type, table_schema, table_name, content, embedding) \
                 VALUES (?, ?, ?, ?, ?)",
                params![values.0, values.1, values.2, values.3, values.4],
            )
            .map_err(db_err)?;
            Ok(())
        })
        .await
    }

    /// Register an embedded column description
    pub async fn add_column(
        &self,
        source_type: SourceType,
        schema: &str,
        table: &str,
        column: &str,
        description: &str,
        embedding: Embedding,
    ) -> Result<(), StoreError> {
        let values = (
            source_type.as_str().to_string(),
            schema.to_string(),
            table.to_string(),
            column.to_string(),
            description.to_string(),
            encode_embedding(&embedding)?,
        );
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO tablecolumn_details_embeddings \
                 (source_type, table_schema, table_name, column_name, content, embedding) \
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![values.0, values.1, values.2, values.3, values.4, values.5],
            )
            .map_err(db_err)?;
            Ok(())
        })
        .await
    }
}

pub(crate) fn db_err(e: duckdb::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

pub(crate) fn encode_embedding(embedding: &[f32]) -> Result<String, StoreError> {
    serde_json::to_string(embedding).map_err(|e| StoreError::MalformedEmbedding(e.to_string()))
}

pub(crate) fn decode_embedding(raw: &str) -> Result<Embedding, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::MalformedEmbedding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataqna_core::SourceCatalog;

    #[tokio::test]
    async fn test_store_usable_after_panicked_task() {
        let store = DuckMetadataStore::open_in_memory().unwrap();
        let err = store
            .with_conn(|_conn| -> Result<(), StoreError> { panic!("decode failed") })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Task(_)));

        store
            .add_table(SourceType::DuckDb, "sales", "orders", "orders", vec![1.0])
            .await
            .unwrap();
        assert_eq!(store.source_type("sales").await.unwrap(), SourceType::DuckDb);
    }
}
