use std::sync::Arc;

use diesel::RunQueryDsl;
use diesel::pg::PgConnection;
use diesel::r2d2::{self, ConnectionManager};
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::db::postgres::{
    PostgresMappingStore, PostgresRecordStore, PostgresRelationshipStore, PostgresSyncErrorStore,
    PostgresSyncLogStore,
};
use crate::db::{
    DatabaseError, MappingStore, RecordStore, RelationshipStore, SyncErrorStore, SyncLogStore,
};

pub type Pool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Bookkeeping schema, applied in order on startup. Synced business tables are
/// never created here; they are expected to exist with a `glide_row_id` column.
const MIGRATIONS: [&str; 10] = [
    r#"
    CREATE TABLE IF NOT EXISTS gl_mappings (
        id UUID PRIMARY KEY,
        glide_table TEXT NOT NULL,
        glide_table_display_name TEXT NOT NULL DEFAULT '',
        supabase_table TEXT NOT NULL UNIQUE,
        column_mappings JSONB NOT NULL DEFAULT '{}'::jsonb,
        sync_direction TEXT NOT NULL DEFAULT 'to_supabase',
        enabled BOOLEAN NOT NULL DEFAULT TRUE,
        last_sync_at TIMESTAMP WITH TIME ZONE,
        records_processed BIGINT NOT NULL DEFAULT 0,
        error_count BIGINT NOT NULL DEFAULT 0,
        created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS gl_sync_logs (
        id UUID PRIMARY KEY,
        mapping_id UUID REFERENCES gl_mappings(id) ON DELETE SET NULL,
        status TEXT NOT NULL,
        message TEXT,
        records_processed BIGINT NOT NULL DEFAULT 0,
        started_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
        completed_at TIMESTAMP WITH TIME ZONE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS gl_sync_errors (
        id UUID PRIMARY KEY,
        mapping_id UUID REFERENCES gl_mappings(id) ON DELETE SET NULL,
        error_type TEXT NOT NULL,
        error_message TEXT NOT NULL,
        record_data JSONB,
        retryable BOOLEAN NOT NULL DEFAULT FALSE,
        resolved BOOLEAN NOT NULL DEFAULT FALSE,
        resolution_notes TEXT,
        created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
        resolved_at TIMESTAMP WITH TIME ZONE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS gl_relationship_mappings (
        id UUID PRIMARY KEY,
        supabase_table TEXT NOT NULL,
        rowid_column TEXT NOT NULL,
        target_table TEXT NOT NULL,
        target_column TEXT NOT NULL DEFAULT 'glide_row_id',
        fk_column TEXT NOT NULL,
        enabled BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
        UNIQUE (supabase_table, rowid_column)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_gl_mappings_enabled ON gl_mappings(enabled)",
    "CREATE INDEX IF NOT EXISTS idx_gl_sync_logs_mapping ON gl_sync_logs(mapping_id)",
    "CREATE INDEX IF NOT EXISTS idx_gl_sync_logs_started ON gl_sync_logs(started_at)",
    "CREATE INDEX IF NOT EXISTS idx_gl_sync_errors_mapping ON gl_sync_errors(mapping_id)",
    "CREATE INDEX IF NOT EXISTS idx_gl_sync_errors_resolved ON gl_sync_errors(resolved)",
    "CREATE INDEX IF NOT EXISTS idx_gl_relationship_mappings_table ON gl_relationship_mappings(supabase_table)",
];

#[derive(Clone)]
pub struct DatabaseManager {
    pool: Option<Pool>,
    mapping_store: Arc<dyn MappingStore>,
    log_store: Arc<dyn SyncLogStore>,
    error_store: Arc<dyn SyncErrorStore>,
    relationship_store: Arc<dyn RelationshipStore>,
    record_store: Arc<dyn RecordStore>,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let manager = ConnectionManager::<PgConnection>::new(config.url.clone());

        let builder = r2d2::Pool::builder()
            .max_size(config.max_connections.unwrap_or(10))
            .min_idle(Some(config.min_connections.unwrap_or(1)));

        let pool = builder
            .build(manager)
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        info!("connected to postgres database");

        let mapping_store = Arc::new(PostgresMappingStore::new(pool.clone()));
        let log_store = Arc::new(PostgresSyncLogStore::new(pool.clone()));
        let error_store = Arc::new(PostgresSyncErrorStore::new(pool.clone()));
        let relationship_store = Arc::new(PostgresRelationshipStore::new(pool.clone()));
        let record_store = Arc::new(PostgresRecordStore::new(pool.clone()));

        Ok(Self {
            pool: Some(pool),
            mapping_store,
            log_store,
            error_store,
            relationship_store,
            record_store,
        })
    }

    /// Assembles a manager over preconstructed stores, without a live pool.
    #[cfg(test)]
    pub fn with_stores(
        mapping_store: Arc<dyn MappingStore>,
        log_store: Arc<dyn SyncLogStore>,
        error_store: Arc<dyn SyncErrorStore>,
        relationship_store: Arc<dyn RelationshipStore>,
        record_store: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            pool: None,
            mapping_store,
            log_store,
            error_store,
            relationship_store,
            record_store,
        }
    }

    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        let Some(pool) = self.pool.clone() else {
            return Err(DatabaseError::Migration(
                "no database pool to migrate".to_string(),
            ));
        };

        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| DatabaseError::Connection(e.to_string()))?;

            for statement in MIGRATIONS {
                diesel::sql_query(statement)
                    .execute(&mut conn)
                    .map_err(|e| DatabaseError::Migration(e.to_string()))?;
            }

            Ok(())
        })
        .await
        .map_err(|e| DatabaseError::Migration(format!("migration task failed: {e}")))??;

        debug!("database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> Option<&Pool> {
        self.pool.as_ref()
    }

    pub fn mapping_store(&self) -> Arc<dyn MappingStore> {
        self.mapping_store.clone()
    }

    pub fn log_store(&self) -> Arc<dyn SyncLogStore> {
        self.log_store.clone()
    }

    pub fn error_store(&self) -> Arc<dyn SyncErrorStore> {
        self.error_store.clone()
    }

    pub fn relationship_store(&self) -> Arc<dyn RelationshipStore> {
        self.relationship_store.clone()
    }

    pub fn record_store(&self) -> Arc<dyn RecordStore> {
        self.record_store.clone()
    }
}
