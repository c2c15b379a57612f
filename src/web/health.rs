use salvo::prelude::*;
use serde_json::json;

use crate::web::web_state;

#[handler]
pub async fn health_check(res: &mut Response) {
    res.render("OK");
}

#[handler]
pub async fn get_status(res: &mut Response) {
    let state = web_state();
    let uptime_seconds = state.started_at.elapsed().as_secs();

    let mappings = state.db_manager.mapping_store();
    let errors = state.db_manager.error_store();
    let logs = state.db_manager.log_store();
    let (mapping_count, unresolved_errors, recent_runs) = match tokio::try_join!(
        mappings.count_mappings(),
        errors.count_unresolved(),
        logs.list_logs(None, 5, 0)
    ) {
        Ok(results) => results,
        Err(err) => {
            res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
            res.render(Json(json!({ "error": format!("database error: {err}") })));
            return;
        }
    };

    let status = json!({
        "status": "running",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": uptime_seconds,
        "sync": {
            "mappings": mapping_count,
            "unresolved_errors": unresolved_errors,
            "active_runs": state.engine.active_run_count(),
            "scheduler_interval_seconds": state.config.sync.interval_seconds,
            "recent_runs": recent_runs,
        }
    });

    res.render(Json(status));
}
