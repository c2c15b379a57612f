use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::db::models::SyncStatus;
use crate::sync::SyncEngine;

/// Drives periodic sync cycles over every enabled mapping. The first
/// cycle runs at startup, then one per interval.
pub struct SyncScheduler {
    engine: Arc<SyncEngine>,
    interval: Duration,
}

impl SyncScheduler {
    /// Returns `None` when `interval_seconds` is zero; runs are then
    /// triggered only through the HTTP API or the command line.
    pub fn new(engine: Arc<SyncEngine>, config: &SyncConfig) -> Option<Self> {
        if config.interval_seconds == 0 {
            return None;
        }
        Some(Self {
            engine,
            interval: Duration::from_secs(config.interval_seconds),
        })
    }

    pub async fn run(self) {
        info!(
            "sync scheduler started, cycle every {}s",
            self.interval.as_secs()
        );
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            match self.engine.sync_all_enabled().await {
                Ok(reports) => {
                    let failed = reports
                        .iter()
                        .filter(|r| r.status != SyncStatus::Completed)
                        .count();
                    info!(
                        "scheduled cycle finished: {} runs, {} failed",
                        reports.len(),
                        failed
                    );
                }
                Err(err) => warn!("scheduled cycle failed: {err}"),
            }
        }
    }
}
