use salvo::prelude::*;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::db::models::RelationshipMapping;
use crate::sync::{EngineError, validation};
use crate::web::web_state;

fn render_error(res: &mut Response, status: StatusCode, message: &str) {
    res.status_code(status);
    res.render(Json(json!({ "error": message })));
}

fn render_db_error(res: &mut Response, err: DatabaseError) {
    match err {
        DatabaseError::NotFound(message) => render_error(res, StatusCode::NOT_FOUND, &message),
        DatabaseError::Query(message) if message.contains("duplicate key") => {
            render_error(res, StatusCode::CONFLICT, &message);
        }
        other => render_error(
            res,
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("database error: {other}"),
        ),
    }
}

fn render_engine_error(res: &mut Response, err: EngineError) {
    let status = match &err {
        EngineError::MappingNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::MappingDisabled(_) | EngineError::RunInProgress(_) => StatusCode::CONFLICT,
        EngineError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    render_error(res, status, &err.to_string());
}

#[handler]
pub async fn trigger_sync(res: &mut Response) {
    match web_state().engine.sync_all_enabled().await {
        Ok(reports) => {
            res.render(Json(json!({
                "reports": reports,
                "count": reports.len(),
            })));
        }
        Err(err) => render_engine_error(res, err),
    }
}

#[handler]
pub async fn trigger_mapping_sync(req: &mut Request, res: &mut Response) {
    let id = match req.param::<Uuid>("id") {
        Some(v) => v,
        None => {
            render_error(res, StatusCode::BAD_REQUEST, "invalid mapping id");
            return;
        }
    };

    // a run that fails mid-flight still renders 200 with its report;
    // only refusals map to error statuses
    match web_state().engine.sync_mapping(id).await {
        Ok(report) => res.render(Json(json!({ "report": report }))),
        Err(err) => render_engine_error(res, err),
    }
}

#[handler]
pub async fn list_logs(req: &mut Request, res: &mut Response) {
    let mapping_id = req.query::<Uuid>("mapping_id");
    let limit = req.query::<i64>("limit").unwrap_or(50).clamp(1, 500);
    let offset = req.query::<i64>("offset").unwrap_or(0).max(0);

    match web_state()
        .db_manager
        .log_store()
        .list_logs(mapping_id, limit, offset)
        .await
    {
        Ok(logs) => {
            res.render(Json(json!({
                "logs": logs,
                "count": logs.len(),
                "limit": limit,
                "offset": offset,
            })));
        }
        Err(err) => render_db_error(res, err),
    }
}

#[handler]
pub async fn get_log(req: &mut Request, res: &mut Response) {
    let id = match req.param::<Uuid>("id") {
        Some(v) => v,
        None => {
            render_error(res, StatusCode::BAD_REQUEST, "invalid log id");
            return;
        }
    };

    match web_state().db_manager.log_store().get_log(id).await {
        Ok(Some(log)) => res.render(Json(json!({ "log": log }))),
        Ok(None) => render_error(res, StatusCode::NOT_FOUND, "sync log not found"),
        Err(err) => render_db_error(res, err),
    }
}

#[handler]
pub async fn list_errors(req: &mut Request, res: &mut Response) {
    let mapping_id = req.query::<Uuid>("mapping_id");
    let include_resolved = req.query::<bool>("include_resolved").unwrap_or(false);
    let limit = req.query::<i64>("limit").unwrap_or(50).clamp(1, 500);
    let offset = req.query::<i64>("offset").unwrap_or(0).max(0);

    let store = web_state().db_manager.error_store();
    let errors = match store
        .list_errors(mapping_id, include_resolved, limit, offset)
        .await
    {
        Ok(errors) => errors,
        Err(err) => {
            render_db_error(res, err);
            return;
        }
    };
    let unresolved = match store.count_unresolved().await {
        Ok(count) => count,
        Err(err) => {
            render_db_error(res, err);
            return;
        }
    };

    res.render(Json(json!({
        "errors": errors,
        "count": errors.len(),
        "unresolved": unresolved,
        "limit": limit,
        "offset": offset,
    })));
}

#[derive(Debug, Default, Deserialize)]
struct ResolveBody {
    #[serde(default)]
    notes: Option<String>,
}

#[handler]
pub async fn resolve_error(req: &mut Request, res: &mut Response) {
    let id = match req.param::<Uuid>("id") {
        Some(v) => v,
        None => {
            render_error(res, StatusCode::BAD_REQUEST, "invalid error id");
            return;
        }
    };
    // body is optional; an empty or absent body resolves without notes
    let body = req.parse_json::<ResolveBody>().await.unwrap_or_default();

    match web_state()
        .db_manager
        .error_store()
        .resolve_error(id, body.notes.as_deref())
        .await
    {
        Ok(()) => res.render(Json(json!({ "ok": true }))),
        Err(err) => render_db_error(res, err),
    }
}

#[derive(Debug, Deserialize)]
struct RelationshipBody {
    supabase_table: String,
    rowid_column: String,
    target_table: String,
    #[serde(default)]
    target_column: Option<String>,
    fk_column: String,
}

#[handler]
pub async fn list_relationships(res: &mut Response) {
    match web_state()
        .db_manager
        .relationship_store()
        .list_relationships()
        .await
    {
        Ok(relationships) => {
            res.render(Json(json!({
                "relationships": relationships,
                "count": relationships.len(),
            })));
        }
        Err(err) => render_db_error(res, err),
    }
}

#[handler]
pub async fn create_relationship(req: &mut Request, res: &mut Response) {
    let body = match req.parse_json::<RelationshipBody>().await {
        Ok(body) => body,
        Err(err) => {
            render_error(
                res,
                StatusCode::BAD_REQUEST,
                &format!("invalid relationship body: {err}"),
            );
            return;
        }
    };

    let mut relationship = RelationshipMapping::new(
        body.supabase_table,
        body.rowid_column,
        body.target_table,
        body.fk_column,
    );
    if let Some(target_column) = body.target_column {
        relationship.target_column = target_column;
    }

    let issues = validation::relationship_issues(&relationship);
    if !issues.is_empty() {
        render_error(res, StatusCode::BAD_REQUEST, &issues.join("; "));
        return;
    }

    match web_state()
        .db_manager
        .relationship_store()
        .create_relationship(&relationship)
        .await
    {
        Ok(()) => {
            res.status_code(StatusCode::CREATED);
            res.render(Json(json!({ "relationship": relationship })));
        }
        Err(err) => render_db_error(res, err),
    }
}

#[handler]
pub async fn delete_relationship(req: &mut Request, res: &mut Response) {
    let id = match req.param::<Uuid>("id") {
        Some(v) => v,
        None => {
            render_error(res, StatusCode::BAD_REQUEST, "invalid relationship id");
            return;
        }
    };

    match web_state()
        .db_manager
        .relationship_store()
        .delete_relationship(id)
        .await
    {
        Ok(()) => res.render(Json(json!({ "ok": true }))),
        Err(err) => render_db_error(res, err),
    }
}

#[handler]
pub async fn map_relationships(req: &mut Request, res: &mut Response) {
    let table = req.query::<String>("table");

    match web_state().engine.map_relationships(table.as_deref()).await {
        Ok(report) => res.render(Json(json!({ "report": report }))),
        Err(err) => render_engine_error(res, err),
    }
}
