use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use once_cell::sync::Lazy;
use salvo::prelude::*;

use crate::db::models::SyncErrorType;

static STARTED_AT: Lazy<Instant> = Lazy::new(Instant::now);

static RUNS_STARTED: AtomicU64 = AtomicU64::new(0);
static RUNS_COMPLETED: AtomicU64 = AtomicU64::new(0);
static RUNS_FAILED: AtomicU64 = AtomicU64::new(0);
static ACTIVE_RUNS: AtomicU64 = AtomicU64::new(0);
static RECORDS_PULLED: AtomicU64 = AtomicU64::new(0);
static RECORDS_PUSHED: AtomicU64 = AtomicU64::new(0);
static RECORDS_FAILED: AtomicU64 = AtomicU64::new(0);
static VALIDATION_ERRORS: AtomicU64 = AtomicU64::new(0);
static TRANSFORM_ERRORS: AtomicU64 = AtomicU64::new(0);
static API_ERRORS: AtomicU64 = AtomicU64::new(0);
static RATE_LIMIT_ERRORS: AtomicU64 = AtomicU64::new(0);
static NETWORK_ERRORS: AtomicU64 = AtomicU64::new(0);
static API_REQUESTS: AtomicU64 = AtomicU64::new(0);
static API_RETRIES: AtomicU64 = AtomicU64::new(0);
static RELATIONSHIP_ROWS_UPDATED: AtomicU64 = AtomicU64::new(0);
static CACHE_HITS: AtomicU64 = AtomicU64::new(0);
static CACHE_MISSES: AtomicU64 = AtomicU64::new(0);

pub struct Metrics;

impl Metrics {
    /// Anchors the uptime clock; called once at startup.
    pub fn init() {
        Lazy::force(&STARTED_AT);
    }

    pub fn run_started() {
        RUNS_STARTED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn run_completed() {
        RUNS_COMPLETED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn run_failed() {
        RUNS_FAILED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_active_runs(count: u64) {
        ACTIVE_RUNS.store(count, Ordering::Relaxed);
    }

    pub fn records_pulled(count: u64) {
        RECORDS_PULLED.fetch_add(count, Ordering::Relaxed);
    }

    pub fn records_pushed(count: u64) {
        RECORDS_PUSHED.fetch_add(count, Ordering::Relaxed);
    }

    pub fn records_failed(count: u64) {
        RECORDS_FAILED.fetch_add(count, Ordering::Relaxed);
    }

    pub fn sync_error(error_type: SyncErrorType) {
        let counter = match error_type {
            SyncErrorType::Validation => &VALIDATION_ERRORS,
            SyncErrorType::Transform => &TRANSFORM_ERRORS,
            SyncErrorType::Api => &API_ERRORS,
            SyncErrorType::RateLimit => &RATE_LIMIT_ERRORS,
            SyncErrorType::Network => &NETWORK_ERRORS,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn api_request() {
        API_REQUESTS.fetch_add(1, Ordering::Relaxed);
    }

    pub fn api_retry() {
        API_RETRIES.fetch_add(1, Ordering::Relaxed);
    }

    pub fn relationship_rows_updated(count: u64) {
        RELATIONSHIP_ROWS_UPDATED.fetch_add(count, Ordering::Relaxed);
    }

    pub fn cache_hit() {
        CACHE_HITS.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_miss() {
        CACHE_MISSES.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn format_prometheus() -> String {
    let uptime = STARTED_AT.elapsed().as_secs();
    let runs_started = RUNS_STARTED.load(Ordering::Relaxed);
    let runs_completed = RUNS_COMPLETED.load(Ordering::Relaxed);
    let runs_failed = RUNS_FAILED.load(Ordering::Relaxed);
    let active_runs = ACTIVE_RUNS.load(Ordering::Relaxed);
    let records_pulled = RECORDS_PULLED.load(Ordering::Relaxed);
    let records_pushed = RECORDS_PUSHED.load(Ordering::Relaxed);
    let records_failed = RECORDS_FAILED.load(Ordering::Relaxed);
    let validation_errors = VALIDATION_ERRORS.load(Ordering::Relaxed);
    let transform_errors = TRANSFORM_ERRORS.load(Ordering::Relaxed);
    let api_errors = API_ERRORS.load(Ordering::Relaxed);
    let rate_limit_errors = RATE_LIMIT_ERRORS.load(Ordering::Relaxed);
    let network_errors = NETWORK_ERRORS.load(Ordering::Relaxed);
    let api_requests = API_REQUESTS.load(Ordering::Relaxed);
    let api_retries = API_RETRIES.load(Ordering::Relaxed);
    let relationship_rows = RELATIONSHIP_ROWS_UPDATED.load(Ordering::Relaxed);
    let cache_hits = CACHE_HITS.load(Ordering::Relaxed);
    let cache_misses = CACHE_MISSES.load(Ordering::Relaxed);

    let total_cache = cache_hits + cache_misses;
    let cache_hit_rate = if total_cache > 0 {
        (cache_hits as f64 / total_cache as f64) * 100.0
    } else {
        0.0
    };

    format!(
        r#"# HELP glide_sync_uptime_seconds Number of seconds the daemon has been running
# TYPE glide_sync_uptime_seconds gauge
glide_sync_uptime_seconds {}

# HELP glide_sync_runs_started_total Total number of sync runs started
# TYPE glide_sync_runs_started_total counter
glide_sync_runs_started_total {}

# HELP glide_sync_runs_completed_total Number of sync runs that completed
# TYPE glide_sync_runs_completed_total counter
glide_sync_runs_completed_total {}

# HELP glide_sync_runs_failed_total Number of sync runs that failed
# TYPE glide_sync_runs_failed_total counter
glide_sync_runs_failed_total {}

# HELP glide_sync_active_runs Number of sync runs currently executing
# TYPE glide_sync_active_runs gauge
glide_sync_active_runs {}

# HELP glide_sync_records_pulled_total Rows upserted from Glide into Postgres
# TYPE glide_sync_records_pulled_total counter
glide_sync_records_pulled_total {}

# HELP glide_sync_records_pushed_total Rows pushed from Postgres into Glide
# TYPE glide_sync_records_pushed_total counter
glide_sync_records_pushed_total {}

# HELP glide_sync_records_failed_total Rows that failed during a sync run
# TYPE glide_sync_records_failed_total counter
glide_sync_records_failed_total {}

# HELP glide_sync_validation_errors_total Recorded validation errors
# TYPE glide_sync_validation_errors_total counter
glide_sync_validation_errors_total {}

# HELP glide_sync_transform_errors_total Recorded transform errors
# TYPE glide_sync_transform_errors_total counter
glide_sync_transform_errors_total {}

# HELP glide_sync_api_errors_total Recorded Glide API errors
# TYPE glide_sync_api_errors_total counter
glide_sync_api_errors_total {}

# HELP glide_sync_rate_limit_errors_total Recorded rate-limit errors
# TYPE glide_sync_rate_limit_errors_total counter
glide_sync_rate_limit_errors_total {}

# HELP glide_sync_network_errors_total Recorded network errors
# TYPE glide_sync_network_errors_total counter
glide_sync_network_errors_total {}

# HELP glide_sync_api_requests_total HTTP requests issued to the Glide API
# TYPE glide_sync_api_requests_total counter
glide_sync_api_requests_total {}

# HELP glide_sync_api_retries_total Glide API requests that were retried
# TYPE glide_sync_api_retries_total counter
glide_sync_api_retries_total {}

# HELP glide_sync_relationship_rows_updated_total Foreign-key rows backfilled by relationship passes
# TYPE glide_sync_relationship_rows_updated_total counter
glide_sync_relationship_rows_updated_total {}

# HELP glide_sync_cache_hits_total Mapping cache hits
# TYPE glide_sync_cache_hits_total counter
glide_sync_cache_hits_total {}

# HELP glide_sync_cache_misses_total Mapping cache misses
# TYPE glide_sync_cache_misses_total counter
glide_sync_cache_misses_total {}

# HELP glide_sync_cache_hit_rate_percent Mapping cache hit rate as percentage
# TYPE glide_sync_cache_hit_rate_percent gauge
glide_sync_cache_hit_rate_percent {}
"#,
        uptime,
        runs_started,
        runs_completed,
        runs_failed,
        active_runs,
        records_pulled,
        records_pushed,
        records_failed,
        validation_errors,
        transform_errors,
        api_errors,
        rate_limit_errors,
        network_errors,
        api_requests,
        api_retries,
        relationship_rows,
        cache_hits,
        cache_misses,
        cache_hit_rate,
    )
}

#[handler]
pub async fn metrics_endpoint(res: &mut Response) {
    res.headers_mut()
        .insert("Content-Type", "text/plain; charset=utf-8".parse().unwrap());
    res.body(format_prometheus());
}
