use std::sync::Arc;

use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::db::models::{SyncErrorRecord, SyncErrorType};
use crate::db::stores::SyncErrorStore;
use crate::glide::GlideError;
use crate::web::metrics::Metrics;

/// Writes classified per-record failures. Recording is best effort: a
/// failure to persist the error is logged and swallowed so it can never
/// take down the run that produced it.
#[derive(Clone)]
pub struct ErrorRecorder {
    store: Arc<dyn SyncErrorStore>,
}

impl ErrorRecorder {
    pub fn new(store: Arc<dyn SyncErrorStore>) -> Self {
        Self { store }
    }

    pub async fn record(
        &self,
        mapping_id: Option<Uuid>,
        error_type: SyncErrorType,
        message: String,
        record_data: Option<Value>,
        retryable: bool,
    ) {
        Metrics::sync_error(error_type);
        warn!("sync error ({}): {message}", error_type.as_str());

        let record = SyncErrorRecord::new(mapping_id, error_type, message, record_data, retryable);
        if let Err(err) = self.store.record_error(&record).await {
            warn!("failed to persist sync error: {err}");
        }
    }

    pub async fn record_glide(&self, mapping_id: Option<Uuid>, context: &str, error: &GlideError) {
        let (error_type, retryable) = classify_glide(error);
        self.record(
            mapping_id,
            error_type,
            format!("{context}: {error}"),
            None,
            retryable,
        )
        .await;
    }
}

/// Maps a Glide client failure onto the stored error taxonomy, plus
/// whether retrying the record later could plausibly succeed.
pub fn classify_glide(error: &GlideError) -> (SyncErrorType, bool) {
    match error {
        GlideError::RateLimited { .. } => (SyncErrorType::RateLimit, true),
        GlideError::Network(_) => (SyncErrorType::Network, true),
        GlideError::Api { status, .. } if (500..=599).contains(status) => {
            (SyncErrorType::Api, true)
        }
        GlideError::Api { .. } => (SyncErrorType::Api, false),
        GlideError::InvalidResponse(_) => (SyncErrorType::Api, false),
    }
}
