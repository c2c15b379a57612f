use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use super::DatabaseError;
use super::models::{
    DestinationColumn, RelationshipMapping, SyncDirection, SyncErrorRecord, SyncErrorType, SyncLog,
    SyncStatus, TableMapping,
};
use super::sql;
use crate::db::manager::Pool;
use crate::db::schema::{gl_mappings, gl_relationship_mappings, gl_sync_errors, gl_sync_logs};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = gl_mappings)]
struct DbTableMapping {
    id: Uuid,
    glide_table: String,
    glide_table_display_name: String,
    supabase_table: String,
    column_mappings: Value,
    sync_direction: String,
    enabled: bool,
    last_sync_at: Option<DateTime<Utc>>,
    records_processed: i64,
    error_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DbTableMapping> for TableMapping {
    type Error = DatabaseError;

    fn try_from(value: DbTableMapping) -> Result<Self, Self::Error> {
        let column_mappings = serde_json::from_value(value.column_mappings).map_err(|e| {
            DatabaseError::Decode(format!("column_mappings for mapping {}: {e}", value.id))
        })?;
        let sync_direction = SyncDirection::parse(&value.sync_direction).ok_or_else(|| {
            DatabaseError::Decode(format!(
                "unknown sync_direction {:?} for mapping {}",
                value.sync_direction, value.id
            ))
        })?;
        Ok(Self {
            id: value.id,
            glide_table: value.glide_table,
            glide_table_display_name: value.glide_table_display_name,
            supabase_table: value.supabase_table,
            column_mappings,
            sync_direction,
            enabled: value.enabled,
            last_sync_at: value.last_sync_at,
            records_processed: value.records_processed,
            error_count: value.error_count,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = gl_mappings)]
struct NewTableMapping<'a> {
    id: Uuid,
    glide_table: &'a str,
    glide_table_display_name: &'a str,
    supabase_table: &'a str,
    column_mappings: Value,
    sync_direction: &'a str,
    enabled: bool,
    last_sync_at: Option<DateTime<Utc>>,
    records_processed: i64,
    error_count: i64,
    created_at: &'a DateTime<Utc>,
    updated_at: &'a DateTime<Utc>,
}

#[derive(AsChangeset)]
#[diesel(table_name = gl_mappings)]
struct UpdateTableMapping<'a> {
    glide_table: &'a str,
    glide_table_display_name: &'a str,
    supabase_table: &'a str,
    column_mappings: Value,
    sync_direction: &'a str,
    enabled: bool,
    updated_at: &'a DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = gl_sync_logs)]
struct DbSyncLog {
    id: Uuid,
    mapping_id: Option<Uuid>,
    status: String,
    message: Option<String>,
    records_processed: i64,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbSyncLog> for SyncLog {
    type Error = DatabaseError;

    fn try_from(value: DbSyncLog) -> Result<Self, Self::Error> {
        let status = SyncStatus::parse(&value.status).ok_or_else(|| {
            DatabaseError::Decode(format!(
                "unknown sync status {:?} for log {}",
                value.status, value.id
            ))
        })?;
        Ok(Self {
            id: value.id,
            mapping_id: value.mapping_id,
            status,
            message: value.message,
            records_processed: value.records_processed,
            started_at: value.started_at,
            completed_at: value.completed_at,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = gl_sync_logs)]
struct NewSyncLog<'a> {
    id: Uuid,
    mapping_id: Option<Uuid>,
    status: &'a str,
    message: Option<&'a str>,
    records_processed: i64,
    started_at: &'a DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = gl_sync_errors)]
struct DbSyncError {
    id: Uuid,
    mapping_id: Option<Uuid>,
    error_type: String,
    error_message: String,
    record_data: Option<Value>,
    retryable: bool,
    resolved: bool,
    resolution_notes: Option<String>,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbSyncError> for SyncErrorRecord {
    type Error = DatabaseError;

    fn try_from(value: DbSyncError) -> Result<Self, Self::Error> {
        let error_type = SyncErrorType::parse(&value.error_type).ok_or_else(|| {
            DatabaseError::Decode(format!(
                "unknown error_type {:?} for error {}",
                value.error_type, value.id
            ))
        })?;
        Ok(Self {
            id: value.id,
            mapping_id: value.mapping_id,
            error_type,
            error_message: value.error_message,
            record_data: value.record_data,
            retryable: value.retryable,
            resolved: value.resolved,
            resolution_notes: value.resolution_notes,
            created_at: value.created_at,
            resolved_at: value.resolved_at,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = gl_sync_errors)]
struct NewSyncError<'a> {
    id: Uuid,
    mapping_id: Option<Uuid>,
    error_type: &'a str,
    error_message: &'a str,
    record_data: Option<Value>,
    retryable: bool,
    resolved: bool,
    resolution_notes: Option<&'a str>,
    created_at: &'a DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = gl_relationship_mappings)]
struct DbRelationshipMapping {
    id: Uuid,
    supabase_table: String,
    rowid_column: String,
    target_table: String,
    target_column: String,
    fk_column: String,
    enabled: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DbRelationshipMapping> for RelationshipMapping {
    fn from(value: DbRelationshipMapping) -> Self {
        Self {
            id: value.id,
            supabase_table: value.supabase_table,
            rowid_column: value.rowid_column,
            target_table: value.target_table,
            target_column: value.target_column,
            fk_column: value.fk_column,
            enabled: value.enabled,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = gl_relationship_mappings)]
struct NewRelationshipMapping<'a> {
    id: Uuid,
    supabase_table: &'a str,
    rowid_column: &'a str,
    target_table: &'a str,
    target_column: &'a str,
    fk_column: &'a str,
    enabled: bool,
    created_at: &'a DateTime<Utc>,
    updated_at: &'a DateTime<Utc>,
}

async fn with_connection<T, F>(pool: Pool, operation: F) -> Result<T, DatabaseError>
where
    T: Send + 'static,
    F: FnOnce(&mut PgConnection) -> Result<T, DatabaseError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;
        operation(&mut conn)
    })
    .await
    .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
}

pub struct PostgresMappingStore {
    pool: Pool,
}

impl PostgresMappingStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl super::MappingStore for PostgresMappingStore {
    async fn get_mapping(&self, mapping_uuid: Uuid) -> Result<Option<TableMapping>, DatabaseError> {
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            use crate::db::schema::gl_mappings::dsl::*;
            gl_mappings
                .filter(id.eq(mapping_uuid))
                .select(DbTableMapping::as_select())
                .first::<DbTableMapping>(conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(TryInto::try_into)
                .transpose()
        })
        .await
    }

    async fn get_mapping_by_supabase_table(
        &self,
        table: &str,
    ) -> Result<Option<TableMapping>, DatabaseError> {
        let pool = self.pool.clone();
        let table = table.to_string();
        with_connection(pool, move |conn| {
            use crate::db::schema::gl_mappings::dsl::*;
            gl_mappings
                .filter(supabase_table.eq(table))
                .select(DbTableMapping::as_select())
                .first::<DbTableMapping>(conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(TryInto::try_into)
                .transpose()
        })
        .await
    }

    async fn list_mappings(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TableMapping>, DatabaseError> {
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            use crate::db::schema::gl_mappings::dsl::*;
            gl_mappings
                .order(created_at.asc())
                .limit(limit)
                .offset(offset)
                .select(DbTableMapping::as_select())
                .load::<DbTableMapping>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .into_iter()
                .map(TryInto::try_into)
                .collect()
        })
        .await
    }

    async fn list_enabled_mappings(&self) -> Result<Vec<TableMapping>, DatabaseError> {
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            use crate::db::schema::gl_mappings::dsl::*;
            gl_mappings
                .filter(enabled.eq(true))
                .order(created_at.asc())
                .select(DbTableMapping::as_select())
                .load::<DbTableMapping>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .into_iter()
                .map(TryInto::try_into)
                .collect()
        })
        .await
    }

    async fn count_mappings(&self) -> Result<i64, DatabaseError> {
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            use crate::db::schema::gl_mappings::dsl::*;
            gl_mappings
                .count()
                .get_result(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn create_mapping(&self, mapping: &TableMapping) -> Result<(), DatabaseError> {
        let pool = self.pool.clone();
        let mapping = mapping.clone();
        with_connection(pool, move |conn| {
            let column_json = serde_json::to_value(&mapping.column_mappings)
                .map_err(|e| DatabaseError::Query(format!("encoding column_mappings: {e}")))?;
            let new_mapping = NewTableMapping {
                id: mapping.id,
                glide_table: &mapping.glide_table,
                glide_table_display_name: &mapping.glide_table_display_name,
                supabase_table: &mapping.supabase_table,
                column_mappings: column_json,
                sync_direction: mapping.sync_direction.as_str(),
                enabled: mapping.enabled,
                last_sync_at: mapping.last_sync_at,
                records_processed: mapping.records_processed,
                error_count: mapping.error_count,
                created_at: &mapping.created_at,
                updated_at: &mapping.updated_at,
            };

            diesel::insert_into(gl_mappings::table)
                .values(new_mapping)
                .execute(conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn update_mapping(&self, mapping: &TableMapping) -> Result<(), DatabaseError> {
        let pool = self.pool.clone();
        let mapping = mapping.clone();
        with_connection(pool, move |conn| {
            let column_json = serde_json::to_value(&mapping.column_mappings)
                .map_err(|e| DatabaseError::Query(format!("encoding column_mappings: {e}")))?;
            let changes = UpdateTableMapping {
                glide_table: &mapping.glide_table,
                glide_table_display_name: &mapping.glide_table_display_name,
                supabase_table: &mapping.supabase_table,
                column_mappings: column_json,
                sync_direction: mapping.sync_direction.as_str(),
                enabled: mapping.enabled,
                updated_at: &mapping.updated_at,
            };

            let affected =
                diesel::update(gl_mappings::table.filter(gl_mappings::id.eq(mapping.id)))
                    .set(changes)
                    .execute(conn)
                    .map_err(|e| DatabaseError::Query(e.to_string()))?;
            if affected == 0 {
                return Err(DatabaseError::NotFound(format!("mapping {}", mapping.id)));
            }
            Ok(())
        })
        .await
    }

    async fn delete_mapping(&self, mapping_uuid: Uuid) -> Result<(), DatabaseError> {
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            let affected =
                diesel::delete(gl_mappings::table.filter(gl_mappings::id.eq(mapping_uuid)))
                    .execute(conn)
                    .map_err(|e| DatabaseError::Query(e.to_string()))?;
            if affected == 0 {
                return Err(DatabaseError::NotFound(format!("mapping {mapping_uuid}")));
            }
            Ok(())
        })
        .await
    }

    async fn set_mapping_enabled(
        &self,
        mapping_uuid: Uuid,
        is_enabled: bool,
    ) -> Result<(), DatabaseError> {
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            use crate::db::schema::gl_mappings::dsl::*;
            let affected = diesel::update(gl_mappings.filter(id.eq(mapping_uuid)))
                .set((enabled.eq(is_enabled), updated_at.eq(Utc::now())))
                .execute(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;
            if affected == 0 {
                return Err(DatabaseError::NotFound(format!("mapping {mapping_uuid}")));
            }
            Ok(())
        })
        .await
    }

    async fn record_run_stats(
        &self,
        mapping_uuid: Uuid,
        synced_at: DateTime<Utc>,
        processed: i64,
        errors: i64,
    ) -> Result<(), DatabaseError> {
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            use crate::db::schema::gl_mappings::dsl::*;
            diesel::update(gl_mappings.filter(id.eq(mapping_uuid)))
                .set((
                    last_sync_at.eq(Some(synced_at)),
                    records_processed.eq(processed),
                    error_count.eq(errors),
                    updated_at.eq(Utc::now()),
                ))
                .execute(conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }
}

pub struct PostgresSyncLogStore {
    pool: Pool,
}

impl PostgresSyncLogStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl super::SyncLogStore for PostgresSyncLogStore {
    async fn create_log(&self, log: &SyncLog) -> Result<(), DatabaseError> {
        let pool = self.pool.clone();
        let log = log.clone();
        with_connection(pool, move |conn| {
            let new_log = NewSyncLog {
                id: log.id,
                mapping_id: log.mapping_id,
                status: log.status.as_str(),
                message: log.message.as_deref(),
                records_processed: log.records_processed,
                started_at: &log.started_at,
                completed_at: log.completed_at,
            };

            diesel::insert_into(gl_sync_logs::table)
                .values(new_log)
                .execute(conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn update_log_progress(
        &self,
        log_uuid: Uuid,
        new_status: SyncStatus,
        processed: i64,
    ) -> Result<(), DatabaseError> {
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            use crate::db::schema::gl_sync_logs::dsl::*;
            diesel::update(gl_sync_logs.filter(id.eq(log_uuid)))
                .set((
                    status.eq(new_status.as_str()),
                    records_processed.eq(processed),
                ))
                .execute(conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn complete_log(
        &self,
        log_uuid: Uuid,
        final_status: SyncStatus,
        final_message: Option<&str>,
        processed: i64,
    ) -> Result<(), DatabaseError> {
        let pool = self.pool.clone();
        let final_message = final_message.map(str::to_string);
        with_connection(pool, move |conn| {
            use crate::db::schema::gl_sync_logs::dsl::*;
            diesel::update(gl_sync_logs.filter(id.eq(log_uuid)))
                .set((
                    status.eq(final_status.as_str()),
                    message.eq(final_message),
                    records_processed.eq(processed),
                    completed_at.eq(Some(Utc::now())),
                ))
                .execute(conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn get_log(&self, log_uuid: Uuid) -> Result<Option<SyncLog>, DatabaseError> {
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            use crate::db::schema::gl_sync_logs::dsl::*;
            gl_sync_logs
                .filter(id.eq(log_uuid))
                .select(DbSyncLog::as_select())
                .first::<DbSyncLog>(conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(TryInto::try_into)
                .transpose()
        })
        .await
    }

    async fn list_logs(
        &self,
        for_mapping: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SyncLog>, DatabaseError> {
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            let mut query = gl_sync_logs::table
                .select(DbSyncLog::as_select())
                .into_boxed();
            if let Some(mapping_uuid) = for_mapping {
                query = query.filter(gl_sync_logs::mapping_id.eq(mapping_uuid));
            }
            query
                .order(gl_sync_logs::started_at.desc())
                .limit(limit)
                .offset(offset)
                .load::<DbSyncLog>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .into_iter()
                .map(TryInto::try_into)
                .collect()
        })
        .await
    }

    async fn latest_log_for_mapping(
        &self,
        mapping_uuid: Uuid,
    ) -> Result<Option<SyncLog>, DatabaseError> {
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            use crate::db::schema::gl_sync_logs::dsl::*;
            gl_sync_logs
                .filter(mapping_id.eq(mapping_uuid))
                .order(started_at.desc())
                .select(DbSyncLog::as_select())
                .first::<DbSyncLog>(conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(TryInto::try_into)
                .transpose()
        })
        .await
    }
}

pub struct PostgresSyncErrorStore {
    pool: Pool,
}

impl PostgresSyncErrorStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl super::SyncErrorStore for PostgresSyncErrorStore {
    async fn record_error(&self, error: &SyncErrorRecord) -> Result<(), DatabaseError> {
        let pool = self.pool.clone();
        let error = error.clone();
        with_connection(pool, move |conn| {
            let new_error = NewSyncError {
                id: error.id,
                mapping_id: error.mapping_id,
                error_type: error.error_type.as_str(),
                error_message: &error.error_message,
                record_data: error.record_data.clone(),
                retryable: error.retryable,
                resolved: error.resolved,
                resolution_notes: error.resolution_notes.as_deref(),
                created_at: &error.created_at,
                resolved_at: error.resolved_at,
            };

            diesel::insert_into(gl_sync_errors::table)
                .values(new_error)
                .execute(conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn list_errors(
        &self,
        for_mapping: Option<Uuid>,
        include_resolved: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SyncErrorRecord>, DatabaseError> {
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            let mut query = gl_sync_errors::table
                .select(DbSyncError::as_select())
                .into_boxed();
            if let Some(mapping_uuid) = for_mapping {
                query = query.filter(gl_sync_errors::mapping_id.eq(mapping_uuid));
            }
            if !include_resolved {
                query = query.filter(gl_sync_errors::resolved.eq(false));
            }
            query
                .order(gl_sync_errors::created_at.desc())
                .limit(limit)
                .offset(offset)
                .load::<DbSyncError>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .into_iter()
                .map(TryInto::try_into)
                .collect()
        })
        .await
    }

    async fn resolve_error(
        &self,
        error_uuid: Uuid,
        notes: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let pool = self.pool.clone();
        let notes = notes.map(str::to_string);
        with_connection(pool, move |conn| {
            use crate::db::schema::gl_sync_errors::dsl::*;
            let affected = diesel::update(gl_sync_errors.filter(id.eq(error_uuid)))
                .set((
                    resolved.eq(true),
                    resolved_at.eq(Some(Utc::now())),
                    resolution_notes.eq(notes),
                ))
                .execute(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;
            if affected == 0 {
                return Err(DatabaseError::NotFound(format!("sync error {error_uuid}")));
            }
            Ok(())
        })
        .await
    }

    async fn count_unresolved(&self) -> Result<i64, DatabaseError> {
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            use crate::db::schema::gl_sync_errors::dsl::*;
            gl_sync_errors
                .filter(resolved.eq(false))
                .count()
                .get_result(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }
}

pub struct PostgresRelationshipStore {
    pool: Pool,
}

impl PostgresRelationshipStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl super::RelationshipStore for PostgresRelationshipStore {
    async fn list_relationships(&self) -> Result<Vec<RelationshipMapping>, DatabaseError> {
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            use crate::db::schema::gl_relationship_mappings::dsl::*;
            gl_relationship_mappings
                .order((supabase_table.asc(), rowid_column.asc()))
                .select(DbRelationshipMapping::as_select())
                .load::<DbRelationshipMapping>(conn)
                .map(|rows| rows.into_iter().map(Into::into).collect())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn list_enabled_relationships(&self) -> Result<Vec<RelationshipMapping>, DatabaseError> {
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            use crate::db::schema::gl_relationship_mappings::dsl::*;
            gl_relationship_mappings
                .filter(enabled.eq(true))
                .order((supabase_table.asc(), rowid_column.asc()))
                .select(DbRelationshipMapping::as_select())
                .load::<DbRelationshipMapping>(conn)
                .map(|rows| rows.into_iter().map(Into::into).collect())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn list_relationships_for_table(
        &self,
        table: &str,
    ) -> Result<Vec<RelationshipMapping>, DatabaseError> {
        let pool = self.pool.clone();
        let table = table.to_string();
        with_connection(pool, move |conn| {
            use crate::db::schema::gl_relationship_mappings::dsl::*;
            gl_relationship_mappings
                .filter(supabase_table.eq(table))
                .order(rowid_column.asc())
                .select(DbRelationshipMapping::as_select())
                .load::<DbRelationshipMapping>(conn)
                .map(|rows| rows.into_iter().map(Into::into).collect())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn create_relationship(&self, rel: &RelationshipMapping) -> Result<(), DatabaseError> {
        let pool = self.pool.clone();
        let rel = rel.clone();
        with_connection(pool, move |conn| {
            let new_rel = NewRelationshipMapping {
                id: rel.id,
                supabase_table: &rel.supabase_table,
                rowid_column: &rel.rowid_column,
                target_table: &rel.target_table,
                target_column: &rel.target_column,
                fk_column: &rel.fk_column,
                enabled: rel.enabled,
                created_at: &rel.created_at,
                updated_at: &rel.updated_at,
            };

            diesel::insert_into(gl_relationship_mappings::table)
                .values(new_rel)
                .execute(conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn delete_relationship(&self, rel_uuid: Uuid) -> Result<(), DatabaseError> {
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            let affected = diesel::delete(
                gl_relationship_mappings::table.filter(gl_relationship_mappings::id.eq(rel_uuid)),
            )
            .execute(conn)
            .map_err(|e| DatabaseError::Query(e.to_string()))?;
            if affected == 0 {
                return Err(DatabaseError::NotFound(format!("relationship {rel_uuid}")));
            }
            Ok(())
        })
        .await
    }
}

pub struct PostgresRecordStore {
    pool: Pool,
}

impl PostgresRecordStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[derive(QueryableByName)]
struct JsonRow {
    #[diesel(sql_type = diesel::sql_types::Jsonb)]
    doc: Value,
}

#[derive(QueryableByName)]
struct CountRow {
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    count: i64,
}

#[async_trait]
impl super::RecordStore for PostgresRecordStore {
    async fn upsert_rows(
        &self,
        table: &str,
        columns: &[DestinationColumn],
        rows: Vec<Value>,
    ) -> Result<usize, DatabaseError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let statement = sql::build_upsert_sql(table, columns)?;
        let payload = Value::Array(rows);
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            diesel::sql_query(statement)
                .bind::<diesel::sql_types::Jsonb, _>(payload)
                .execute(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn fetch_rows(
        &self,
        table: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Value>, DatabaseError> {
        let statement = sql::build_fetch_sql(table)?;
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            diesel::sql_query(statement)
                .bind::<diesel::sql_types::BigInt, _>(limit)
                .bind::<diesel::sql_types::BigInt, _>(offset)
                .load::<JsonRow>(conn)
                .map(|rows| rows.into_iter().map(|row| row.doc).collect())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn set_glide_row_id(
        &self,
        table: &str,
        local_id: Uuid,
        glide_row_id: &str,
    ) -> Result<(), DatabaseError> {
        let statement = sql::build_set_row_id_sql(table)?;
        let pool = self.pool.clone();
        let glide_row_id = glide_row_id.to_string();
        let table = table.to_string();
        with_connection(pool, move |conn| {
            let affected = diesel::sql_query(statement)
                .bind::<diesel::sql_types::Text, _>(glide_row_id)
                .bind::<diesel::sql_types::Uuid, _>(local_id)
                .execute(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;
            if affected == 0 {
                return Err(DatabaseError::NotFound(format!(
                    "row {local_id} in {table}"
                )));
            }
            Ok(())
        })
        .await
    }

    async fn count_rows(&self, table: &str) -> Result<i64, DatabaseError> {
        let statement = sql::build_count_sql(table)?;
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            diesel::sql_query(statement)
                .get_result::<CountRow>(conn)
                .map(|row| row.count)
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn backfill_relationship(
        &self,
        rel: &RelationshipMapping,
    ) -> Result<usize, DatabaseError> {
        let statement = sql::build_backfill_sql(rel)?;
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            diesel::sql_query(statement)
                .execute(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }
}
