use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use super::DatabaseError;
use super::models::{
    DestinationColumn, RelationshipMapping, SyncErrorRecord, SyncLog, SyncStatus, TableMapping,
};

#[async_trait]
pub trait MappingStore: Send + Sync {
    async fn get_mapping(&self, id: Uuid) -> Result<Option<TableMapping>, DatabaseError>;
    async fn get_mapping_by_supabase_table(
        &self,
        supabase_table: &str,
    ) -> Result<Option<TableMapping>, DatabaseError>;
    async fn list_mappings(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TableMapping>, DatabaseError>;
    async fn list_enabled_mappings(&self) -> Result<Vec<TableMapping>, DatabaseError>;
    async fn count_mappings(&self) -> Result<i64, DatabaseError>;
    async fn create_mapping(&self, mapping: &TableMapping) -> Result<(), DatabaseError>;
    async fn update_mapping(&self, mapping: &TableMapping) -> Result<(), DatabaseError>;
    async fn delete_mapping(&self, id: Uuid) -> Result<(), DatabaseError>;
    async fn set_mapping_enabled(&self, id: Uuid, enabled: bool) -> Result<(), DatabaseError>;
    /// Stamps the outcome of a finished run onto the mapping row.
    async fn record_run_stats(
        &self,
        id: Uuid,
        last_sync_at: DateTime<Utc>,
        records_processed: i64,
        error_count: i64,
    ) -> Result<(), DatabaseError>;
}

#[async_trait]
pub trait SyncLogStore: Send + Sync {
    async fn create_log(&self, log: &SyncLog) -> Result<(), DatabaseError>;
    async fn update_log_progress(
        &self,
        id: Uuid,
        status: SyncStatus,
        records_processed: i64,
    ) -> Result<(), DatabaseError>;
    async fn complete_log(
        &self,
        id: Uuid,
        status: SyncStatus,
        message: Option<&str>,
        records_processed: i64,
    ) -> Result<(), DatabaseError>;
    async fn get_log(&self, id: Uuid) -> Result<Option<SyncLog>, DatabaseError>;
    async fn list_logs(
        &self,
        mapping_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SyncLog>, DatabaseError>;
    async fn latest_log_for_mapping(
        &self,
        mapping_id: Uuid,
    ) -> Result<Option<SyncLog>, DatabaseError>;
}

#[async_trait]
pub trait SyncErrorStore: Send + Sync {
    async fn record_error(&self, error: &SyncErrorRecord) -> Result<(), DatabaseError>;
    async fn list_errors(
        &self,
        mapping_id: Option<Uuid>,
        include_resolved: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SyncErrorRecord>, DatabaseError>;
    async fn resolve_error(&self, id: Uuid, notes: Option<&str>) -> Result<(), DatabaseError>;
    async fn count_unresolved(&self) -> Result<i64, DatabaseError>;
}

#[async_trait]
pub trait RelationshipStore: Send + Sync {
    async fn list_relationships(&self) -> Result<Vec<RelationshipMapping>, DatabaseError>;
    async fn list_enabled_relationships(&self) -> Result<Vec<RelationshipMapping>, DatabaseError>;
    async fn list_relationships_for_table(
        &self,
        supabase_table: &str,
    ) -> Result<Vec<RelationshipMapping>, DatabaseError>;
    async fn create_relationship(&self, rel: &RelationshipMapping) -> Result<(), DatabaseError>;
    async fn delete_relationship(&self, id: Uuid) -> Result<(), DatabaseError>;
}

/// Access to the destination tables themselves. Statements are generated
/// per mapping since the tables and columns are configuration, not schema
/// known at compile time.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Upserts transformed rows keyed on `glide_row_id`; returns how many
    /// rows the statement touched.
    async fn upsert_rows(
        &self,
        table: &str,
        columns: &[DestinationColumn],
        rows: Vec<Value>,
    ) -> Result<usize, DatabaseError>;
    /// Reads a page of rows as jsonb documents, ordered by local id.
    async fn fetch_rows(
        &self,
        table: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Value>, DatabaseError>;
    async fn set_glide_row_id(
        &self,
        table: &str,
        local_id: Uuid,
        glide_row_id: &str,
    ) -> Result<(), DatabaseError>;
    async fn count_rows(&self, table: &str) -> Result<i64, DatabaseError>;
    /// Fills the declared fk column from the denormalized rowid column;
    /// returns the number of rows updated.
    async fn backfill_relationship(
        &self,
        rel: &RelationshipMapping,
    ) -> Result<usize, DatabaseError>;
}
