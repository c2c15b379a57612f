//! In-memory store implementations for exercising the engine without a
//! database. Only compiled for tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use crate::db::error::DatabaseError;
use crate::db::models::{
    DestinationColumn, GLIDE_ROW_ID_COLUMN, RelationshipMapping, SyncErrorRecord, SyncLog,
    SyncStatus, TableMapping,
};
use crate::db::stores::{
    MappingStore, RecordStore, RelationshipStore, SyncErrorStore, SyncLogStore,
};

#[derive(Default)]
pub struct MemoryMappingStore {
    mappings: Mutex<HashMap<Uuid, TableMapping>>,
}

impl MemoryMappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mappings(mappings: Vec<TableMapping>) -> Self {
        let store = Self::new();
        {
            let mut guard = store.mappings.lock();
            for mapping in mappings {
                guard.insert(mapping.id, mapping);
            }
        }
        store
    }
}

#[async_trait]
impl MappingStore for MemoryMappingStore {
    async fn get_mapping(&self, id: Uuid) -> Result<Option<TableMapping>, DatabaseError> {
        Ok(self.mappings.lock().get(&id).cloned())
    }

    async fn get_mapping_by_supabase_table(
        &self,
        supabase_table: &str,
    ) -> Result<Option<TableMapping>, DatabaseError> {
        Ok(self
            .mappings
            .lock()
            .values()
            .find(|m| m.supabase_table == supabase_table)
            .cloned())
    }

    async fn list_mappings(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TableMapping>, DatabaseError> {
        let mut all: Vec<TableMapping> = self.mappings.lock().values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn list_enabled_mappings(&self) -> Result<Vec<TableMapping>, DatabaseError> {
        let mut enabled: Vec<TableMapping> = self
            .mappings
            .lock()
            .values()
            .filter(|m| m.enabled)
            .cloned()
            .collect();
        enabled.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(enabled)
    }

    async fn count_mappings(&self) -> Result<i64, DatabaseError> {
        Ok(self.mappings.lock().len() as i64)
    }

    async fn create_mapping(&self, mapping: &TableMapping) -> Result<(), DatabaseError> {
        let mut guard = self.mappings.lock();
        if guard
            .values()
            .any(|m| m.supabase_table == mapping.supabase_table)
        {
            return Err(DatabaseError::Query(format!(
                "duplicate key value violates unique constraint on supabase_table {:?}",
                mapping.supabase_table
            )));
        }
        guard.insert(mapping.id, mapping.clone());
        Ok(())
    }

    async fn update_mapping(&self, mapping: &TableMapping) -> Result<(), DatabaseError> {
        let mut guard = self.mappings.lock();
        if !guard.contains_key(&mapping.id) {
            return Err(DatabaseError::NotFound(format!("mapping {}", mapping.id)));
        }
        guard.insert(mapping.id, mapping.clone());
        Ok(())
    }

    async fn delete_mapping(&self, id: Uuid) -> Result<(), DatabaseError> {
        if self.mappings.lock().remove(&id).is_none() {
            return Err(DatabaseError::NotFound(format!("mapping {id}")));
        }
        Ok(())
    }

    async fn set_mapping_enabled(&self, id: Uuid, enabled: bool) -> Result<(), DatabaseError> {
        let mut guard = self.mappings.lock();
        match guard.get_mut(&id) {
            Some(mapping) => {
                mapping.enabled = enabled;
                mapping.updated_at = Utc::now();
                Ok(())
            }
            None => Err(DatabaseError::NotFound(format!("mapping {id}"))),
        }
    }

    async fn record_run_stats(
        &self,
        id: Uuid,
        last_sync_at: DateTime<Utc>,
        records_processed: i64,
        error_count: i64,
    ) -> Result<(), DatabaseError> {
        if let Some(mapping) = self.mappings.lock().get_mut(&id) {
            mapping.last_sync_at = Some(last_sync_at);
            mapping.records_processed = records_processed;
            mapping.error_count = error_count;
            mapping.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySyncLogStore {
    logs: Mutex<Vec<SyncLog>>,
}

impl MemorySyncLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<SyncLog> {
        self.logs.lock().clone()
    }
}

#[async_trait]
impl SyncLogStore for MemorySyncLogStore {
    async fn create_log(&self, log: &SyncLog) -> Result<(), DatabaseError> {
        self.logs.lock().push(log.clone());
        Ok(())
    }

    async fn update_log_progress(
        &self,
        id: Uuid,
        status: SyncStatus,
        records_processed: i64,
    ) -> Result<(), DatabaseError> {
        if let Some(log) = self.logs.lock().iter_mut().find(|l| l.id == id) {
            log.status = status;
            log.records_processed = records_processed;
        }
        Ok(())
    }

    async fn complete_log(
        &self,
        id: Uuid,
        status: SyncStatus,
        message: Option<&str>,
        records_processed: i64,
    ) -> Result<(), DatabaseError> {
        if let Some(log) = self.logs.lock().iter_mut().find(|l| l.id == id) {
            log.status = status;
            log.message = message.map(str::to_string);
            log.records_processed = records_processed;
            log.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn get_log(&self, id: Uuid) -> Result<Option<SyncLog>, DatabaseError> {
        Ok(self.logs.lock().iter().find(|l| l.id == id).cloned())
    }

    async fn list_logs(
        &self,
        mapping_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SyncLog>, DatabaseError> {
        let mut matching: Vec<SyncLog> = self
            .logs
            .lock()
            .iter()
            .filter(|l| mapping_id.is_none() || l.mapping_id == mapping_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn latest_log_for_mapping(
        &self,
        mapping_id: Uuid,
    ) -> Result<Option<SyncLog>, DatabaseError> {
        Ok(self
            .logs
            .lock()
            .iter()
            .filter(|l| l.mapping_id == Some(mapping_id))
            .max_by_key(|l| l.started_at)
            .cloned())
    }
}

#[derive(Default)]
pub struct MemorySyncErrorStore {
    errors: Mutex<Vec<SyncErrorRecord>>,
}

impl MemorySyncErrorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<SyncErrorRecord> {
        self.errors.lock().clone()
    }
}

#[async_trait]
impl SyncErrorStore for MemorySyncErrorStore {
    async fn record_error(&self, error: &SyncErrorRecord) -> Result<(), DatabaseError> {
        self.errors.lock().push(error.clone());
        Ok(())
    }

    async fn list_errors(
        &self,
        mapping_id: Option<Uuid>,
        include_resolved: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SyncErrorRecord>, DatabaseError> {
        let mut matching: Vec<SyncErrorRecord> = self
            .errors
            .lock()
            .iter()
            .filter(|e| mapping_id.is_none() || e.mapping_id == mapping_id)
            .filter(|e| include_resolved || !e.resolved)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn resolve_error(&self, id: Uuid, notes: Option<&str>) -> Result<(), DatabaseError> {
        let mut guard = self.errors.lock();
        match guard.iter_mut().find(|e| e.id == id) {
            Some(error) => {
                error.resolved = true;
                error.resolution_notes = notes.map(str::to_string);
                error.resolved_at = Some(Utc::now());
                Ok(())
            }
            None => Err(DatabaseError::NotFound(format!("sync error {id}"))),
        }
    }

    async fn count_unresolved(&self) -> Result<i64, DatabaseError> {
        Ok(self.errors.lock().iter().filter(|e| !e.resolved).count() as i64)
    }
}

#[derive(Default)]
pub struct MemoryRelationshipStore {
    relationships: Mutex<Vec<RelationshipMapping>>,
}

impl MemoryRelationshipStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_relationships(relationships: Vec<RelationshipMapping>) -> Self {
        Self {
            relationships: Mutex::new(relationships),
        }
    }
}

#[async_trait]
impl RelationshipStore for MemoryRelationshipStore {
    async fn list_relationships(&self) -> Result<Vec<RelationshipMapping>, DatabaseError> {
        Ok(self.relationships.lock().clone())
    }

    async fn list_enabled_relationships(&self) -> Result<Vec<RelationshipMapping>, DatabaseError> {
        Ok(self
            .relationships
            .lock()
            .iter()
            .filter(|r| r.enabled)
            .cloned()
            .collect())
    }

    async fn list_relationships_for_table(
        &self,
        supabase_table: &str,
    ) -> Result<Vec<RelationshipMapping>, DatabaseError> {
        Ok(self
            .relationships
            .lock()
            .iter()
            .filter(|r| r.supabase_table == supabase_table)
            .cloned()
            .collect())
    }

    async fn create_relationship(&self, rel: &RelationshipMapping) -> Result<(), DatabaseError> {
        let mut guard = self.relationships.lock();
        if guard
            .iter()
            .any(|r| r.supabase_table == rel.supabase_table && r.rowid_column == rel.rowid_column)
        {
            return Err(DatabaseError::Query(format!(
                "duplicate key value violates unique constraint on ({:?}, {:?})",
                rel.supabase_table, rel.rowid_column
            )));
        }
        guard.push(rel.clone());
        Ok(())
    }

    async fn delete_relationship(&self, id: Uuid) -> Result<(), DatabaseError> {
        let mut guard = self.relationships.lock();
        let before = guard.len();
        guard.retain(|r| r.id != id);
        if guard.len() == before {
            return Err(DatabaseError::NotFound(format!("relationship {id}")));
        }
        Ok(())
    }
}

/// Destination tables held as plain json rows. Mirrors the dynamic-SQL
/// behavior closely enough for engine tests: upserts key on
/// `glide_row_id`, inserts mint a fresh local `id`, backfills join the
/// rowid column against the target table.
#[derive(Default)]
pub struct MemoryRecordStore {
    tables: Mutex<HashMap<String, Vec<Value>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_table(&self, table: &str, rows: Vec<Value>) {
        self.tables.lock().insert(table.to_string(), rows);
    }

    pub fn table_rows(&self, table: &str) -> Vec<Value> {
        self.tables.lock().get(table).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn upsert_rows(
        &self,
        table: &str,
        columns: &[DestinationColumn],
        rows: Vec<Value>,
    ) -> Result<usize, DatabaseError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut guard = self.tables.lock();
        let stored = guard.entry(table.to_string()).or_default();
        let mut touched = 0;

        for row in rows {
            let Some(incoming) = row.as_object() else {
                continue;
            };
            let row_id = incoming
                .get(GLIDE_ROW_ID_COLUMN)
                .and_then(Value::as_str)
                .map(str::to_string);

            let position = row_id.as_deref().and_then(|rid| {
                stored.iter().position(|r| {
                    r.get(GLIDE_ROW_ID_COLUMN).and_then(Value::as_str) == Some(rid)
                })
            });

            match position {
                Some(idx) => {
                    if let Some(target) = stored[idx].as_object_mut() {
                        for column in columns {
                            if column.name == GLIDE_ROW_ID_COLUMN {
                                continue;
                            }
                            let value =
                                incoming.get(&column.name).cloned().unwrap_or(Value::Null);
                            target.insert(column.name.clone(), value);
                        }
                        touched += 1;
                    }
                }
                None => {
                    let mut fresh = serde_json::Map::new();
                    fresh.insert(
                        "id".to_string(),
                        Value::String(Uuid::new_v4().to_string()),
                    );
                    for column in columns {
                        let value = incoming.get(&column.name).cloned().unwrap_or(Value::Null);
                        fresh.insert(column.name.clone(), value);
                    }
                    stored.push(Value::Object(fresh));
                    touched += 1;
                }
            }
        }

        Ok(touched)
    }

    async fn fetch_rows(
        &self,
        table: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Value>, DatabaseError> {
        let guard = self.tables.lock();
        let rows = guard.get(table).cloned().unwrap_or_default();
        Ok(rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn set_glide_row_id(
        &self,
        table: &str,
        local_id: Uuid,
        glide_row_id: &str,
    ) -> Result<(), DatabaseError> {
        let mut guard = self.tables.lock();
        let local = local_id.to_string();
        let row = guard.get_mut(table).and_then(|rows| {
            rows.iter_mut()
                .find(|r| r.get("id").and_then(Value::as_str) == Some(local.as_str()))
        });
        match row {
            Some(Value::Object(target)) => {
                target.insert(
                    GLIDE_ROW_ID_COLUMN.to_string(),
                    Value::String(glide_row_id.to_string()),
                );
                Ok(())
            }
            _ => Err(DatabaseError::NotFound(format!(
                "row {local_id} in {table:?}"
            ))),
        }
    }

    async fn count_rows(&self, table: &str) -> Result<i64, DatabaseError> {
        Ok(self
            .tables
            .lock()
            .get(table)
            .map(|rows| rows.len() as i64)
            .unwrap_or(0))
    }

    async fn backfill_relationship(
        &self,
        rel: &RelationshipMapping,
    ) -> Result<usize, DatabaseError> {
        let mut guard = self.tables.lock();

        let parents: Vec<(String, String)> = guard
            .get(&rel.target_table)
            .map(|rows| {
                rows.iter()
                    .filter_map(|row| {
                        let key = row.get(&rel.target_column).and_then(Value::as_str)?;
                        let id = row.get("id").and_then(Value::as_str)?;
                        Some((key.to_string(), id.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let Some(children) = guard.get_mut(&rel.supabase_table) else {
            return Ok(0);
        };

        let mut updated = 0;
        for child in children.iter_mut() {
            let Some(obj) = child.as_object_mut() else {
                continue;
            };
            let Some(rowid) = obj.get(&rel.rowid_column).and_then(Value::as_str) else {
                continue;
            };
            let Some((_, parent_id)) = parents.iter().find(|(key, _)| key == rowid) else {
                continue;
            };
            let current = obj.get(&rel.fk_column).and_then(Value::as_str);
            if current != Some(parent_id.as_str()) {
                obj.insert(
                    rel.fk_column.clone(),
                    Value::String(parent_id.clone()),
                );
                updated += 1;
            }
        }

        Ok(updated)
    }
}

pub fn memory_stores() -> (
    Arc<MemoryMappingStore>,
    Arc<MemorySyncLogStore>,
    Arc<MemorySyncErrorStore>,
    Arc<MemoryRelationshipStore>,
    Arc<MemoryRecordStore>,
) {
    (
        Arc::new(MemoryMappingStore::new()),
        Arc::new(MemorySyncLogStore::new()),
        Arc::new(MemorySyncErrorStore::new()),
        Arc::new(MemoryRelationshipStore::new()),
        Arc::new(MemoryRecordStore::new()),
    )
}
