use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cache::AsyncTimedCache;
use crate::config::SyncConfig;
use crate::db::models::{GLIDE_ROW_ID_COLUMN, SyncErrorType, SyncLog, SyncStatus, TableMapping};
use crate::db::stores::{MappingStore, RecordStore, SyncLogStore};
use crate::db::{DatabaseError, DatabaseManager};
use crate::glide::{GlideApi, GlideError, Mutation, MutationResult};
use crate::web::metrics::Metrics;

pub mod recorder;
pub mod relationships;
pub mod transform;
pub mod validation;

pub use self::recorder::ErrorRecorder;
pub use self::relationships::{RelationshipMapper, RelationshipOutcome, RelationshipReport};
pub use self::transform::RowError;

const MAPPING_CACHE_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("mapping {0} not found")]
    MappingNotFound(Uuid),
    #[error("mapping {0} is disabled")]
    MappingDisabled(Uuid),
    #[error("a sync is already running for mapping {0}")]
    RunInProgress(Uuid),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Outcome of one sync run, as returned to the HTTP API and the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub log_id: Uuid,
    pub mapping_id: Uuid,
    pub supabase_table: String,
    pub status: SyncStatus,
    pub records_processed: i64,
    pub records_failed: i64,
    pub message: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship_rows_updated: Option<usize>,
}

/// A failure that ends the run. Per-record failures are recorded and
/// skipped; these are not.
#[derive(Debug, thiserror::Error)]
enum RunFatal {
    #[error(transparent)]
    Database(DatabaseError),
    #[error("{context}: {error}")]
    Glide {
        context: &'static str,
        error: GlideError,
    },
    #[error("{0}")]
    Aborted(String),
}

#[derive(Debug, Default, Clone, Copy)]
struct RunTotals {
    processed: i64,
    failed: i64,
}

struct RunOutcome {
    totals: RunTotals,
    fatal: Option<RunFatal>,
}

struct PushItem {
    mutation: Mutation,
    local_id: Option<Uuid>,
}

/// Executes sync runs for configured mappings: pull from Glide into
/// Postgres, push from Postgres into Glide, or both, with per-record
/// error bookkeeping and a log entry per run.
pub struct SyncEngine {
    mappings: Arc<dyn MappingStore>,
    logs: Arc<dyn SyncLogStore>,
    records: Arc<dyn RecordStore>,
    recorder: ErrorRecorder,
    relationship_mapper: RelationshipMapper,
    glide: Arc<dyn GlideApi>,
    config: SyncConfig,
    mapping_cache: AsyncTimedCache<Uuid, TableMapping>,
    active_runs: Mutex<HashSet<Uuid>>,
}

struct RunGuard<'a> {
    runs: &'a Mutex<HashSet<Uuid>>,
    mapping_id: Uuid,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut runs = self.runs.lock();
        runs.remove(&self.mapping_id);
        Metrics::set_active_runs(runs.len() as u64);
    }
}

impl SyncEngine {
    pub fn new(db: &DatabaseManager, glide: Arc<dyn GlideApi>, config: SyncConfig) -> Self {
        Self {
            mappings: db.mapping_store(),
            logs: db.log_store(),
            records: db.record_store(),
            recorder: ErrorRecorder::new(db.error_store()),
            relationship_mapper: RelationshipMapper::new(
                db.relationship_store(),
                db.record_store(),
                db.log_store(),
            ),
            glide,
            config,
            mapping_cache: AsyncTimedCache::new(MAPPING_CACHE_TTL),
            active_runs: Mutex::new(HashSet::new()),
        }
    }

    /// Runs one sync for the mapping. Concurrent runs of the same mapping
    /// are refused; runs of different mappings may overlap. A run that
    /// fails mid-flight still returns `Ok` with a failed report; `Err` is
    /// reserved for refusals and storage failures.
    pub async fn sync_mapping(&self, mapping_id: Uuid) -> Result<SyncReport, EngineError> {
        let mapping = self
            .mappings
            .get_mapping(mapping_id)
            .await?
            .ok_or(EngineError::MappingNotFound(mapping_id))?;
        if !mapping.enabled {
            return Err(EngineError::MappingDisabled(mapping_id));
        }
        let _guard = self
            .try_begin_run(mapping_id)
            .ok_or(EngineError::RunInProgress(mapping_id))?;

        Metrics::run_started();
        info!(
            "sync run starting for {} ({})",
            mapping.supabase_table,
            mapping.sync_direction.as_str()
        );

        let report = self.run_locked(&mapping).await;
        match &report {
            Ok(r) if r.status == SyncStatus::Completed => Metrics::run_completed(),
            _ => Metrics::run_failed(),
        }
        report
    }

    /// Syncs every enabled mapping in turn. A mapping that is refused or
    /// fails does not stop the others.
    pub async fn sync_all_enabled(&self) -> Result<Vec<SyncReport>, EngineError> {
        let mappings = self.mappings.list_enabled_mappings().await?;
        let mut reports = Vec::with_capacity(mappings.len());
        for mapping in mappings {
            match self.sync_mapping(mapping.id).await {
                Ok(report) => reports.push(report),
                Err(err) => warn!("sync for {} skipped: {err}", mapping.supabase_table),
            }
        }
        Ok(reports)
    }

    /// Runs the relationship backfill pass, optionally scoped to one table.
    pub async fn map_relationships(
        &self,
        table: Option<&str>,
    ) -> Result<RelationshipReport, EngineError> {
        Ok(self.relationship_mapper.run(table).await?)
    }

    /// Cached single-mapping read for the HTTP surface. Writers must call
    /// [`SyncEngine::invalidate_mapping`] after changing a mapping.
    pub async fn get_mapping_cached(
        &self,
        mapping_id: Uuid,
    ) -> Result<Option<TableMapping>, EngineError> {
        if let Some(mapping) = self.mapping_cache.get(&mapping_id).await {
            Metrics::cache_hit();
            return Ok(Some(mapping));
        }
        Metrics::cache_miss();
        let mapping = self.mappings.get_mapping(mapping_id).await?;
        if let Some(found) = &mapping {
            self.mapping_cache.insert(mapping_id, found.clone()).await;
        }
        Ok(mapping)
    }

    pub async fn invalidate_mapping(&self, mapping_id: Uuid) {
        self.mapping_cache.remove(&mapping_id).await;
    }

    pub fn active_run_count(&self) -> usize {
        self.active_runs.lock().len()
    }

    fn try_begin_run(&self, mapping_id: Uuid) -> Option<RunGuard<'_>> {
        let mut runs = self.active_runs.lock();
        if !runs.insert(mapping_id) {
            return None;
        }
        Metrics::set_active_runs(runs.len() as u64);
        Some(RunGuard {
            runs: &self.active_runs,
            mapping_id,
        })
    }

    async fn run_locked(&self, mapping: &TableMapping) -> Result<SyncReport, EngineError> {
        let log = SyncLog::started(
            Some(mapping.id),
            Some(format!(
                "{} sync for {}",
                mapping.sync_direction.as_str(),
                mapping.supabase_table
            )),
        );
        self.logs.create_log(&log).await?;

        let issues = validation::mapping_issues(mapping);
        if !issues.is_empty() {
            let message = issues.join("; ");
            self.recorder
                .record(
                    Some(mapping.id),
                    SyncErrorType::Validation,
                    message.clone(),
                    None,
                    false,
                )
                .await;
            self.logs
                .complete_log(log.id, SyncStatus::Failed, Some(&message), 0)
                .await?;
            self.finish_mapping(mapping.id, 0, 1).await?;
            let totals = RunTotals {
                processed: 0,
                failed: 1,
            };
            return Ok(self.report(mapping, &log, SyncStatus::Failed, totals, message, None));
        }

        self.logs
            .update_log_progress(log.id, SyncStatus::Processing, 0)
            .await?;

        let outcome = self.run_directions(mapping, log.id).await;
        let totals = outcome.totals;

        let (status, message) = match outcome.fatal {
            None => (
                SyncStatus::Completed,
                format!(
                    "{} records processed, {} failed",
                    totals.processed, totals.failed
                ),
            ),
            Some(RunFatal::Database(err)) => {
                // recording an error row needs the same database; log only
                error!("sync run for {} aborted: {err}", mapping.supabase_table);
                (SyncStatus::Failed, err.to_string())
            }
            Some(RunFatal::Glide { context, error }) => {
                self.recorder
                    .record_glide(Some(mapping.id), context, &error)
                    .await;
                (SyncStatus::Failed, format!("{context}: {error}"))
            }
            Some(RunFatal::Aborted(message)) => (SyncStatus::Failed, message),
        };

        Metrics::records_failed(totals.failed as u64);
        self.logs
            .complete_log(log.id, status, Some(&message), totals.processed)
            .await?;
        self.finish_mapping(mapping.id, totals.processed, totals.failed)
            .await?;

        let mut relationship_rows = None;
        if status == SyncStatus::Completed && self.config.map_relationships_after_run {
            match self
                .relationship_mapper
                .run(Some(&mapping.supabase_table))
                .await
            {
                Ok(rel_report) => relationship_rows = Some(rel_report.total_rows_updated),
                Err(err) => warn!(
                    "chained relationship pass for {} failed: {err}",
                    mapping.supabase_table
                ),
            }
        }

        info!(
            "sync run for {} finished: {} ({message})",
            mapping.supabase_table,
            status.as_str()
        );
        Ok(self.report(mapping, &log, status, totals, message, relationship_rows))
    }

    async fn finish_mapping(
        &self,
        mapping_id: Uuid,
        processed: i64,
        failed: i64,
    ) -> Result<(), EngineError> {
        self.mappings
            .record_run_stats(mapping_id, Utc::now(), processed, failed)
            .await?;
        self.mapping_cache.remove(&mapping_id).await;
        Ok(())
    }

    fn report(
        &self,
        mapping: &TableMapping,
        log: &SyncLog,
        status: SyncStatus,
        totals: RunTotals,
        message: String,
        relationship_rows_updated: Option<usize>,
    ) -> SyncReport {
        SyncReport {
            log_id: log.id,
            mapping_id: mapping.id,
            supabase_table: mapping.supabase_table.clone(),
            status,
            records_processed: totals.processed,
            records_failed: totals.failed,
            message,
            started_at: log.started_at,
            completed_at: Utc::now(),
            relationship_rows_updated,
        }
    }

    async fn run_directions(&self, mapping: &TableMapping, log_id: Uuid) -> RunOutcome {
        let mut totals = RunTotals::default();

        if mapping.sync_direction.pulls()
            && let Err(fatal) = self.pull(mapping, log_id, &mut totals).await
        {
            return RunOutcome {
                totals,
                fatal: Some(fatal),
            };
        }
        if mapping.sync_direction.pushes()
            && let Err(fatal) = self.push(mapping, log_id, &mut totals).await
        {
            return RunOutcome {
                totals,
                fatal: Some(fatal),
            };
        }

        RunOutcome {
            totals,
            fatal: None,
        }
    }

    /// Pages through the Glide table and upserts transformed rows, keyed
    /// by `glide_row_id`. Rows that fail validation or coercion are
    /// recorded and skipped.
    async fn pull(
        &self,
        mapping: &TableMapping,
        log_id: Uuid,
        totals: &mut RunTotals,
    ) -> Result<(), RunFatal> {
        let columns = transform::destination_columns(mapping);
        let mut start_at: Option<String> = None;

        loop {
            let page = self
                .glide
                .query_table_page(&mapping.glide_table, start_at.as_deref())
                .await
                .map_err(|error| RunFatal::Glide {
                    context: "queryTables failed",
                    error,
                })?;

            if page.rows.is_empty() {
                break;
            }

            let mut batch = Vec::with_capacity(page.rows.len());
            for row in &page.rows {
                match transform::transform_row(row, mapping) {
                    Ok(value) => batch.push(value),
                    Err(err) => {
                        totals.failed += 1;
                        let error_type = match err {
                            RowError::MissingRowId => SyncErrorType::Validation,
                            RowError::Transform { .. } => SyncErrorType::Transform,
                        };
                        self.recorder
                            .record(
                                Some(mapping.id),
                                error_type,
                                err.to_string(),
                                Some(Value::Object(row.clone())),
                                false,
                            )
                            .await;
                    }
                }
            }

            for chunk in batch.chunks(self.config.upsert_chunk_size) {
                let upserted = self
                    .records
                    .upsert_rows(&mapping.supabase_table, &columns, chunk.to_vec())
                    .await
                    .map_err(RunFatal::Database)?;
                totals.processed += upserted as i64;
                Metrics::records_pulled(upserted as u64);
            }

            self.logs
                .update_log_progress(log_id, SyncStatus::Processing, totals.processed)
                .await
                .map_err(RunFatal::Database)?;

            match page.next {
                Some(next) if start_at.as_deref() != Some(next.as_str()) => {
                    start_at = Some(next);
                }
                Some(_) => {
                    warn!(
                        "glide returned a repeated continuation token for {}; stopping pull",
                        mapping.glide_table
                    );
                    break;
                }
                None => break,
            }
        }

        Ok(())
    }

    /// Pages local rows and ships them to Glide. Rows without a
    /// `glide_row_id` become add-row mutations and adopt the rowID Glide
    /// assigns; the rest become set-columns mutations.
    async fn push(
        &self,
        mapping: &TableMapping,
        log_id: Uuid,
        totals: &mut RunTotals,
    ) -> Result<(), RunFatal> {
        let page_size = self.config.push_page_size as i64;
        let mut offset = 0i64;
        let mut batches_attempted = 0usize;
        let mut batches_failed = 0usize;

        loop {
            let rows = self
                .records
                .fetch_rows(&mapping.supabase_table, page_size, offset)
                .await
                .map_err(RunFatal::Database)?;
            if rows.is_empty() {
                break;
            }
            let fetched = rows.len() as i64;

            let mut items = Vec::with_capacity(rows.len());
            for doc in &rows {
                let Some(local) = doc.as_object() else {
                    continue;
                };
                let column_values = transform::row_to_column_values(local, mapping);
                let row_id = local
                    .get(GLIDE_ROW_ID_COLUMN)
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|id| !id.is_empty());
                items.push(match row_id {
                    Some(id) => PushItem {
                        mutation: Mutation::SetColumnsInRow {
                            table_name: mapping.glide_table.clone(),
                            column_values,
                            row_id: id.to_string(),
                        },
                        local_id: None,
                    },
                    None => PushItem {
                        mutation: Mutation::AddRowToTable {
                            table_name: mapping.glide_table.clone(),
                            column_values,
                        },
                        local_id: local
                            .get("id")
                            .and_then(Value::as_str)
                            .and_then(|id| Uuid::parse_str(id).ok()),
                    },
                });
            }

            for chunk in items.chunks(self.config.mutation_batch_size) {
                batches_attempted += 1;
                let mutations: Vec<Mutation> =
                    chunk.iter().map(|item| item.mutation.clone()).collect();

                match self.glide.mutate_batch(&mutations).await {
                    Ok(results) => {
                        totals.processed += mutations.len() as i64;
                        Metrics::records_pushed(mutations.len() as u64);
                        self.write_back_row_ids(mapping, chunk, &results).await?;
                    }
                    Err(error @ GlideError::RateLimited { .. }) => {
                        return Err(RunFatal::Glide {
                            context: "mutateTables rate limited after retries",
                            error,
                        });
                    }
                    Err(error) => {
                        batches_failed += 1;
                        totals.failed += mutations.len() as i64;
                        self.recorder
                            .record_glide(Some(mapping.id), "mutateTables batch failed", &error)
                            .await;
                    }
                }
            }

            self.logs
                .update_log_progress(log_id, SyncStatus::Processing, totals.processed)
                .await
                .map_err(RunFatal::Database)?;

            if fetched < page_size {
                break;
            }
            offset += page_size;
        }

        if batches_attempted > 0 && batches_failed == batches_attempted {
            return Err(RunFatal::Aborted(format!(
                "all {batches_attempted} mutation batches failed"
            )));
        }
        Ok(())
    }

    /// Stores returned rowIDs on the local rows that were just created in
    /// Glide. A row that vanished locally in the meantime is skipped; the
    /// next run will simply re-add it.
    async fn write_back_row_ids(
        &self,
        mapping: &TableMapping,
        items: &[PushItem],
        results: &[MutationResult],
    ) -> Result<(), RunFatal> {
        for (item, result) in items.iter().zip(results.iter()) {
            let (Some(local_id), Some(row_id)) = (item.local_id, result.row_id.as_deref()) else {
                continue;
            };
            match self
                .records
                .set_glide_row_id(&mapping.supabase_table, local_id, row_id)
                .await
            {
                Ok(()) => {}
                Err(DatabaseError::NotFound(message)) => {
                    warn!("rowID writeback skipped: {message}");
                }
                Err(err) => return Err(RunFatal::Database(err)),
            }
        }
        Ok(())
    }
}
