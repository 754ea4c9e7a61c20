//! Data source metadata lookups

use async_trait::async_trait;
use dataqna_core::{KnownSql, SourceCatalog, SourceType, StoreError};

use crate::store::{db_err, DuckMetadataStore};

#[async_trait]
impl SourceCatalog for DuckMetadataStore {
    async fn source_type(&self, database: &str) -> Result<SourceType, StoreError> {
        let database = database.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT DISTINCT source_type FROM table_details_embeddings \
                     WHERE table_schema = ? ORDER BY source_type",
                )
                .map_err(db_err)?;
            let found: Vec<String> = stmt
                .query_map([database.as_str()], |row| row.get(0))
                .map_err(db_err)?
                .collect::<duckdb::Result<Vec<_>>>()
                .map_err(db_err)?;

            match found.as_slice() {
                [] => Err(StoreError::SourceNotFound(database)),
                [single] => single
                    .parse::<SourceType>()
                    .map_err(StoreError::UnknownSourceType),
                many => Err(StoreError::AmbiguousSource {
                    found: many.join(", "),
                    database,
                }),
            }
        })
        .await
    }

    async fn available_databases(&self) -> Result<Vec<String>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT DISTINCT concat(table_schema, '-', source_type) AS source_id \
                     FROM table_details_embeddings ORDER BY source_id",
                )
                .map_err(db_err)?;
            let names = stmt
                .query_map([], |row| row.get(0))
                .map_err(db_err)?
                .collect::<duckdb::Result<Vec<String>>>()
                .map_err(db_err)?;
            Ok(names)
        })
        .await
    }

    async fn known_sql(&self, database: &str, limit: usize) -> Result<Vec<KnownSql>, StoreError> {
        let database = database.to_string();
        let sql = format!(
            "SELECT DISTINCT example_user_question, example_generated_sql \
             FROM example_prompt_sql_embeddings WHERE table_schema = ? \
             ORDER BY example_user_question LIMIT {}",
            limit
        );
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql).map_err(db_err)?;
            let examples = stmt
                .query_map([database.as_str()], |row| {
                    Ok(KnownSql {
                        example_user_question: row.get(0)?,
                        example_generated_sql: row.get(1)?,
                    })
                })
                .map_err(db_err)?
                .collect::<duckdb::Result<Vec<_>>>()
                .map_err(db_err)?;
            Ok(examples)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataqna_core::ExampleSink;

    async fn seeded() -> DuckMetadataStore {
        let store = DuckMetadataStore::open_in_memory().unwrap();
        store
            .add_table(SourceType::DuckDb, "sales", "orders", "orders", vec![1.0])
            .await
            .unwrap();
        store
            .add_table(SourceType::DuckDb, "sales", "customers", "customers", vec![1.0])
            .await
            .unwrap();
        store
            .add_table(SourceType::Postgres, "hr", "employees", "staff", vec![1.0])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_source_type_lookup() {
        let store = seeded().await;
        assert_eq!(store.source_type("sales").await.unwrap(), SourceType::DuckDb);
        assert_eq!(store.source_type("hr").await.unwrap(), SourceType::Postgres);
    }

    #[tokio::test]
    async fn test_missing_source_fails_loudly() {
        let store = seeded().await;
        let err = store.source_type("finance").await.unwrap_err();
        assert!(matches!(err, StoreError::SourceNotFound(ref db) if db == "finance"));
    }

    #[tokio::test]
    async fn test_conflicting_source_types() {
        let store = seeded().await;
        store
            .add_table(SourceType::Postgres, "sales", "returns", "returns", vec![1.0])
            .await
            .unwrap();
        let err = store.source_type("sales").await.unwrap_err();
        assert!(matches!(err, StoreError::AmbiguousSource { .. }));
    }

    #[tokio::test]
    async fn test_available_databases() {
        let store = seeded().await;
        assert_eq!(
            store.available_databases().await.unwrap(),
            vec!["hr-postgres".to_string(), "sales-duckdb".to_string()]
        );
    }

    #[tokio::test]
    async fn test_known_sql_is_limited_and_distinct() {
        let store = seeded().await;
        for i in 0..7 {
            store
                .add_example("sales", &format!("question {}", i), "SELECT 1", vec![1.0])
                .await
                .unwrap();
        }
        store
            .add_example("sales", "question 0", "SELECT 1", vec![1.0])
            .await
            .unwrap();

        let known = store.known_sql("sales", 5).await.unwrap();
        assert_eq!(known.len(), 5);
        assert_eq!(known[0].example_user_question, "question 0");
        assert_eq!(known[1].example_user_question, "question 1");
    }
}
