//! Audit log persistence

use async_trait::async_trait;
use chrono::Utc;
use dataqna_core::{AuditEntry, AuditSink, StoreError};
use duckdb::params;
use tracing::debug;

use crate::store::{db_err, DuckMetadataStore};

#[async_trait]
impl AuditSink for DuckMetadataStore {
    async fn persist(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        let events = serde_json::to_string(&entry.events)
            .map_err(|e| StoreError::Database(format!("cannot encode audit events: {}", e)))?;
        let row = (
            entry.request_id.to_string(),
            entry.started_at.to_rfc3339(),
            Utc::now().to_rfc3339(),
            entry.source_type.map(|s| s.as_str().to_string()),
            entry.database.clone(),
            entry.models.join(","),
            entry.question.clone(),
            entry.final_sql.clone(),
            if entry.cache_hit { "Y" } else { "N" },
            entry.process_step.as_str(),
            entry.error.clone(),
            entry.narrative(),
            events,
        );
        let request_id = entry.request_id;

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO audit_log (request_id, started_at, logged_at, source_type, \
                 user_database, models, user_question, generated_sql, found_in_vector, \
                 process_step, error_msg, full_log, events) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    row.0, row.1, row.2, row.3, row.4, row.5, row.6, row.7, row.8, row.9,
                    row.10, row.11, row.12
                ],
            )
            .map_err(db_err)?;
            Ok(())
        })
        .await?;

        debug!(request_id = %request_id, "Audit entry persisted");
        Ok(())
    }
}
