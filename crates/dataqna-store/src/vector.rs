//! Exact-match cache and cosine-similarity retrieval

use async_trait::async_trait;
use dataqna_core::{
    Embedding, ExampleSink, MatchKind, MatchSource, RetrievalMatch, StoreError, VectorStore,
};
use duckdb::{params, Connection};
use std::cmp::Ordering;
use tracing::debug;

use crate::store::{db_err, decode_embedding, encode_embedding, DuckMetadataStore};

/// Canonical form used for exact question lookups
///
/// Case, surrounding/internal whitespace, typographic quotes and SQL-escaped
/// (doubled) single quotes do not distinguish two questions.
pub fn normalize_question(text: &str) -> String {
    let folded = text
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace("''", "'");
    folded
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Cosine similarity; zero-length vectors score 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Score `candidates` against `query`, keep those at or above `threshold`
/// and return the best `k`
///
/// Candidates must be in store scan order; the sort is stable so equal scores
/// keep that order.
pub fn rank_matches(
    candidates: Vec<(MatchSource, Embedding)>,
    query: &[f32],
    k: usize,
    threshold: f32,
) -> Result<Vec<RetrievalMatch>, StoreError> {
    let mut matches = Vec::new();
    for (source, embedding) in candidates {
        if embedding.len() != query.len() {
            return Err(StoreError::MalformedEmbedding(format!(
                "stored embedding has {} dimensions, question has {}",
                embedding.len(),
                query.len()
            )));
        }
        let similarity = cosine_similarity(&embedding, query);
        if similarity >= threshold {
            matches.push(RetrievalMatch { source, similarity });
        }
    }

    matches.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
    });
    matches.truncate(k);
    Ok(matches)
}

fn scan_candidates(
    conn: &Connection,
    kind: MatchKind,
    database: &str,
) -> Result<Vec<(MatchSource, Embedding)>, StoreError> {
    let sql = match kind {
        MatchKind::Table => {
            "SELECT table_schema, table_name, content, embedding \
             FROM table_details_embeddings WHERE table_schema = ? ORDER BY rowid"
        }
        MatchKind::Column => {
            "SELECT table_schema, table_name, column_name, content, embedding \
             FROM tablecolumn_details_embeddings WHERE table_schema = ? ORDER BY rowid"
        }
        MatchKind::Example => {
            "SELECT example_user_question, example_generated_sql, embedding \
             FROM example_prompt_sql_embeddings WHERE table_schema = ? ORDER BY rowid"
        }
    };

    let mut stmt = conn.prepare(sql).map_err(db_err)?;
    let rows: Vec<(MatchSource, String)> = stmt
        .query_map([database], |row| {
            let entry = match kind {
                MatchKind::Table => (
                    MatchSource::Table {
                        schema: row.get(0)?,
                        table: row.get(1)?,
                        description: row.get(2)?,
                    },
                    row.get::<_, String>(3)?,
                ),
                MatchKind::Column => (
                    MatchSource::Column {
                        schema: row.get(0)?,
                        table: row.get(1)?,
                        column: row.get(2)?,
                        description: row.get(3)?,
                    },
                    row.get::<_, String>(4)?,
                ),
                MatchKind::Example => (
                    MatchSource::Example {
                        question: row.get(0)?,
                        sql: row.get(1)?,
                    },
                    row.get::<_, String>(2)?,
                ),
            };
            Ok(entry)
        })
        .map_err(db_err)?
        .collect::<duckdb::Result<Vec<_>>>()
        .map_err(db_err)?;

    rows.into_iter()
        .map(|(source, raw)| decode_embedding(&raw).map(|embedding| (source, embedding)))
        .collect()
}

#[async_trait]
impl VectorStore for DuckMetadataStore {
    async fn exact_match(
        &self,
        question: &str,
        database: &str,
    ) -> Result<Option<String>, StoreError> {
        let wanted = normalize_question(question);
        let database = database.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT example_user_question, example_generated_sql \
                     FROM example_prompt_sql_embeddings WHERE table_schema = ? ORDER BY rowid",
                )
                .map_err(db_err)?;
            let pairs: Vec<(String, String)> = stmt
                .query_map([database.as_str()], |row| Ok((row.get(0)?, row.get(1)?)))
                .map_err(db_err)?
                .collect::<duckdb::Result<Vec<_>>>()
                .map_err(db_err)?;

            Ok(pairs
                .into_iter()
                .find(|(q, _)| normalize_question(q) == wanted)
                .map(|(_, sql)| sql))
        })
        .await
    }

    async fn similarity_search(
        &self,
        kind: MatchKind,
        database: &str,
        embedding: &[f32],
        k: usize,
        threshold: f32,
    ) -> Result<Vec<RetrievalMatch>, StoreError> {
        let owned_db = database.to_string();
        let candidates = self
            .with_conn(move |conn| scan_candidates(conn, kind, &owned_db))
            .await?;
        let scanned = candidates.len();
        let matches = rank_matches(candidates, embedding, k, threshold)?;
        debug!(
            kind = %kind,
            database,
            scanned,
            kept = matches.len(),
            "Similarity search finished"
        );
        Ok(matches)
    }
}

#[async_trait]
impl ExampleSink for DuckMetadataStore {
    async fn add_example(
        &self,
        database: &str,
        question: &str,
        sql: &str,
        embedding: Embedding,
    ) -> Result<(), StoreError> {
        let values = (
            database.to_string(),
            question.to_string(),
            sql.to_string(),
            encode_embedding(&embedding)?,
        );
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO example_prompt_sql_embeddings \
                 (table_schema, example_user_question, example_generated_sql, embedding) \
                 VALUES (?, ?, ?, ?)",
                params![values.0, values.1, values.2, values.3],
            )
            .map_err(db_err)?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataqna_core::SourceType;

    fn table(name: &str) -> MatchSource {
        MatchSource::Table {
            schema: "sales".to_string(),
            table: name.to_string(),
            description: String::new(),
        }
    }

    #[test]
    fn test_normalize_question() {
        assert_eq!(
            normalize_question("  Show   TOP 10 Customers "),
            "show top 10 customers"
        );
        assert_eq!(
            normalize_question("What''s the customer\u{2019}s region?"),
            "what's the customer's region?"
        );
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_rank_respects_k_and_threshold() {
        let candidates = vec![
            (table("a"), vec![1.0, 0.0]),
            (table("b"), vec![0.0, 1.0]),
            (table("c"), vec![0.9, 0.1]),
            (table("d"), vec![0.7, 0.7]),
        ];

        let matches = rank_matches(candidates, &[1.0, 0.0], 2, 0.3).unwrap();

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].source, table("a"));
        assert_eq!(matches[1].source, table("c"));
        assert!(matches.iter().all(|m| m.similarity >= 0.3));
    }

    #[test]
    fn test_rank_ties_keep_scan_order() {
        let candidates = vec![
            (table("first"), vec![1.0, 1.0]),
            (table("second"), vec![1.0, 1.0]),
            (table("third"), vec![1.0, 1.0]),
        ];

        let matches = rank_matches(candidates, &[1.0, 1.0], 10, 0.0).unwrap();
        let names: Vec<_> = matches
            .iter()
            .map(|m| match &m.source {
                MatchSource::Table { table, .. } => table.as_str(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_rank_rejects_dimension_mismatch() {
        let candidates = vec![(table("a"), vec![1.0, 0.0, 0.0])];
        let err = rank_matches(candidates, &[1.0, 0.0], 5, 0.0).unwrap_err();
        assert!(matches!(err, StoreError::MalformedEmbedding(_)));
    }

    #[tokio::test]
    async fn test_similarity_search_scoped_to_database() {
        let store = DuckMetadataStore::open_in_memory().unwrap();
        store
            .add_table(SourceType::DuckDb, "sales", "orders", "customer orders", vec![1.0, 0.0])
            .await
            .unwrap();
        store
            .add_table(SourceType::DuckDb, "hr", "employees", "staff", vec![1.0, 0.0])
            .await
            .unwrap();
        store
            .add_column(
                SourceType::DuckDb,
                "sales",
                "orders",
                "region",
                "sales region",
                vec![0.8, 0.6],
            )
            .await
            .unwrap();

        let tables = store
            .similarity_search(MatchKind::Table, "sales", &[1.0, 0.0], 5, 0.3)
            .await
            .unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].kind(), MatchKind::Table);

        let columns = store
            .similarity_search(MatchKind::Column, "sales", &[1.0, 0.0], 10, 0.3)
            .await
            .unwrap();
        assert_eq!(columns.len(), 1);
        assert!((columns[0].similarity - 0.8).abs() < 1e-5);

        let none = store
            .similarity_search(MatchKind::Column, "sales", &[0.0, 1.0], 10, 0.9)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_exact_match_normalizes_question() {
        let store = DuckMetadataStore::open_in_memory().unwrap();
        store
            .add_example(
                "sales",
                "show top 10 customers",
                "SELECT * FROM customers ORDER BY revenue DESC LIMIT 10",
                vec![1.0, 0.0],
            )
            .await
            .unwrap();

        let hit = store
            .exact_match("Show top 10  customers", "sales")
            .await
            .unwrap();
        assert_eq!(
            hit.as_deref(),
            Some("SELECT * FROM customers ORDER BY revenue DESC LIMIT 10")
        );

        assert_eq!(store.exact_match("show top 10 customers", "hr").await.unwrap(), None);
        assert_eq!(store.exact_match("show customers", "sales").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_added_example_is_searchable() {
        let store = DuckMetadataStore::open_in_memory().unwrap();
        store
            .add_example("sales", "orders per day", "SELECT 1", vec![0.0, 1.0])
            .await
            .unwrap();

        let examples = store
            .similarity_search(MatchKind::Example, "sales", &[0.0, 1.0], 3, 0.3)
            .await
            .unwrap();
        assert_eq!(examples.len(), 1);
        assert_eq!(
            examples[0].source,
            MatchSource::Example {
                question: "orders per day".to_string(),
                sql: "SELECT 1".to_string(),
            }
        );
    }
}
