use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::db::models::{RelationshipMapping, SyncLog, SyncStatus};
use crate::db::stores::{RecordStore, RelationshipStore, SyncLogStore};
use crate::web::metrics::Metrics;

#[derive(Debug, Clone, Serialize)]
pub struct RelationshipOutcome {
    pub relationship_id: Uuid,
    pub supabase_table: String,
    pub rowid_column: String,
    pub fk_column: String,
    pub rows_updated: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelationshipReport {
    pub log_id: Uuid,
    pub total_rows_updated: usize,
    pub outcomes: Vec<RelationshipOutcome>,
}

/// Backfills declared foreign-key columns from the denormalized
/// `rowid_<table>` columns. Each pass is a sync-log entry of its own,
/// without a mapping id.
pub struct RelationshipMapper {
    relationships: Arc<dyn RelationshipStore>,
    records: Arc<dyn RecordStore>,
    logs: Arc<dyn SyncLogStore>,
}

impl RelationshipMapper {
    pub fn new(
        relationships: Arc<dyn RelationshipStore>,
        records: Arc<dyn RecordStore>,
        logs: Arc<dyn SyncLogStore>,
    ) -> Self {
        Self {
            relationships,
            records,
            logs,
        }
    }

    /// Runs the pass over every enabled declaration, or only those on one
    /// table. A declaration that fails is reported and skipped; the pass
    /// keeps going.
    pub async fn run(&self, table: Option<&str>) -> Result<RelationshipReport, DatabaseError> {
        let declarations = match table {
            Some(name) => self
                .relationships
                .list_relationships_for_table(name)
                .await?
                .into_iter()
                .filter(|r| r.enabled)
                .collect(),
            None => self.relationships.list_enabled_relationships().await?,
        };

        let message = match table {
            Some(name) => format!("relationship pass for {name}"),
            None => "relationship pass".to_string(),
        };
        let log = SyncLog::started(None, Some(message));
        self.logs.create_log(&log).await?;

        let mut outcomes = Vec::with_capacity(declarations.len());
        let mut total = 0usize;
        let mut failures = 0usize;

        for rel in &declarations {
            match self.records.backfill_relationship(rel).await {
                Ok(rows_updated) => {
                    if rows_updated > 0 {
                        info!(
                            "backfilled {rows_updated} rows of {}.{} from {}",
                            rel.supabase_table, rel.fk_column, rel.rowid_column
                        );
                    }
                    total += rows_updated;
                    outcomes.push(outcome(rel, rows_updated, None));
                }
                Err(err) => {
                    warn!(
                        "relationship backfill failed for {}.{}: {err}",
                        rel.supabase_table, rel.fk_column
                    );
                    failures += 1;
                    outcomes.push(outcome(rel, 0, Some(err.to_string())));
                }
            }
        }

        Metrics::relationship_rows_updated(total as u64);

        let status = if !outcomes.is_empty() && failures == outcomes.len() {
            SyncStatus::Failed
        } else {
            SyncStatus::Completed
        };
        let summary = format!(
            "{} declarations, {total} rows updated, {failures} failed",
            outcomes.len()
        );
        self.logs
            .complete_log(log.id, status, Some(&summary), total as i64)
            .await?;

        Ok(RelationshipReport {
            log_id: log.id,
            total_rows_updated: total,
            outcomes,
        })
    }
}

fn outcome(
    rel: &RelationshipMapping,
    rows_updated: usize,
    error: Option<String>,
) -> RelationshipOutcome {
    RelationshipOutcome {
        relationship_id: rel.id,
        supabase_table: rel.supabase_table.clone(),
        rowid_column: rel.rowid_column.clone(),
        fk_column: rel.fk_column.clone(),
        rows_updated,
        error,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::db::testing::{MemoryRecordStore, MemoryRelationshipStore, MemorySyncLogStore};

    fn seeded_records() -> Arc<MemoryRecordStore> {
        let records = Arc::new(MemoryRecordStore::new());
        records.seed_table(
            "clients",
            vec![
                json!({"id": "11111111-1111-4111-8111-111111111111", "glide_row_id": "cA"}),
                json!({"id": "22222222-2222-4222-8222-222222222222", "glide_row_id": "cB"}),
            ],
        );
        records.seed_table(
            "invoices",
            vec![
                json!({"id": "33333333-3333-4333-8333-333333333333", "rowid_clients": "cA", "client_id": null}),
                json!({"id": "44444444-4444-4444-8444-444444444444", "rowid_clients": "cB", "client_id": null}),
                json!({"id": "55555555-5555-4555-8555-555555555555", "rowid_clients": "missing", "client_id": null}),
            ],
        );
        records
    }

    #[tokio::test]
    async fn pass_backfills_and_logs() {
        let records = seeded_records();
        let rel = RelationshipMapping::new(
            "invoices".to_string(),
            "rowid_clients".to_string(),
            "clients".to_string(),
            "client_id".to_string(),
        );
        let relationships = Arc::new(MemoryRelationshipStore::with_relationships(vec![rel]));
        let logs = Arc::new(MemorySyncLogStore::new());
        let mapper = RelationshipMapper::new(relationships, records.clone(), logs.clone());

        let report = mapper.run(None).await.unwrap();
        assert_eq!(report.total_rows_updated, 2);
        assert_eq!(report.outcomes.len(), 1);
        assert!(report.outcomes[0].error.is_none());

        let invoices = records.table_rows("invoices");
        assert_eq!(
            invoices[0]["client_id"],
            json!("11111111-1111-4111-8111-111111111111")
        );
        assert_eq!(invoices[2]["client_id"], json!(null));

        let recorded = logs.snapshot();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].status, SyncStatus::Completed);
        assert_eq!(recorded[0].mapping_id, None);
        assert_eq!(recorded[0].records_processed, 2);
        assert!(recorded[0].completed_at.is_some());
    }

    #[tokio::test]
    async fn second_pass_touches_nothing() {
        let records = seeded_records();
        let rel = RelationshipMapping::new(
            "invoices".to_string(),
            "rowid_clients".to_string(),
            "clients".to_string(),
            "client_id".to_string(),
        );
        let relationships = Arc::new(MemoryRelationshipStore::with_relationships(vec![rel]));
        let logs = Arc::new(MemorySyncLogStore::new());
        let mapper = RelationshipMapper::new(relationships, records, logs);

        let first = mapper.run(None).await.unwrap();
        assert_eq!(first.total_rows_updated, 2);
        let second = mapper.run(None).await.unwrap();
        assert_eq!(second.total_rows_updated, 0);
    }

    #[tokio::test]
    async fn scoped_pass_skips_other_tables_and_disabled_declarations() {
        let records = seeded_records();
        let invoices_rel = RelationshipMapping::new(
            "invoices".to_string(),
            "rowid_clients".to_string(),
            "clients".to_string(),
            "client_id".to_string(),
        );
        let mut disabled = RelationshipMapping::new(
            "invoices".to_string(),
            "rowid_products".to_string(),
            "products".to_string(),
            "product_id".to_string(),
        );
        disabled.enabled = false;
        let other_table = RelationshipMapping::new(
            "expenses".to_string(),
            "rowid_accounts".to_string(),
            "accounts".to_string(),
            "account_id".to_string(),
        );
        let relationships = Arc::new(MemoryRelationshipStore::with_relationships(vec![
            invoices_rel,
            disabled,
            other_table,
        ]));
        let logs = Arc::new(MemorySyncLogStore::new());
        let mapper = RelationshipMapper::new(relationships, records, logs);

        let report = mapper.run(Some("invoices")).await.unwrap();
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].rowid_column, "rowid_clients");
    }
}
