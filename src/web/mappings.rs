use chrono::Utc;
use salvo::prelude::*;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::db::models::{ColumnMappings, SyncDirection, TableMapping};
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

#[derive(Debug, Deserialize)]
struct MappingBody {
    glide_table: String,
    #[serde(default)]
    glide_table_display_name: Option<String>,
    supabase_table: String,
    column_mappings: ColumnMappings,
    sync_direction: SyncDirection,
    #[serde(default)]
    enabled: Option<bool>,
}

impl MappingBody {
    fn into_mapping(self) -> TableMapping {
        let display = self
            .glide_table_display_name
            .unwrap_or_else(|| self.glide_table.clone());
        let mut mapping = TableMapping::new(
            self.glide_table,
            display,
            self.supabase_table,
            self.column_mappings,
            self.sync_direction,
        );
        if let Some(enabled) = self.enabled {
            mapping.enabled = enabled;
        }
        mapping
    }
}

#[handler]
pub async fn list_mappings(req: &mut Request, res: &mut Response) {
    let limit = req.query::<i64>("limit").unwrap_or(100).clamp(1, 1000);
    let offset = req.query::<i64>("offset").unwrap_or(0).max(0);
    let store = web_state().db_manager.mapping_store();

    let mappings = match store.list_mappings(limit, offset).await {
        Ok(mappings) => mappings,
        Err(err) => {
            render_db_error(res, err);
            return;
        }
    };
    let total = match store.count_mappings().await {
        Ok(total) => total,
        Err(err) => {
            render_db_error(res, err);
            return;
        }
    };

    res.render(Json(json!({
        "mappings": mappings,
        "count": mappings.len(),
        "total": total,
        "limit": limit,
        "offset": offset,
    })));
}

#[handler]
pub async fn get_mapping(req: &mut Request, res: &mut Response) {
    let id = match req.param::<Uuid>("id") {
        Some(v) => v,
        None => {
            render_error(res, StatusCode::BAD_REQUEST, "invalid mapping id");
            return;
        }
    };

    match web_state().engine.get_mapping_cached(id).await {
        Ok(Some(mapping)) => res.render(Json(json!({ "mapping": mapping }))),
        Ok(None) => render_error(res, StatusCode::NOT_FOUND, "mapping not found"),
        Err(EngineError::Database(err)) => render_db_error(res, err),
        Err(err) => render_error(res, StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()),
    }
}

#[handler]
pub async fn create_mapping(req: &mut Request, res: &mut Response) {
    let body = match req.parse_json::<MappingBody>().await {
        Ok(body) => body,
        Err(err) => {
            render_error(
                res,
                StatusCode::BAD_REQUEST,
                &format!("invalid mapping body: {err}"),
            );
            return;
        }
    };

    let mapping = body.into_mapping();
    let issues = validation::mapping_issues(&mapping);
    if !issues.is_empty() {
        render_error(res, StatusCode::BAD_REQUEST, &issues.join("; "));
        return;
    }

    match web_state()
        .db_manager
        .mapping_store()
        .create_mapping(&mapping)
        .await
    {
        Ok(()) => {
            res.status_code(StatusCode::CREATED);
            res.render(Json(json!({ "mapping": mapping })));
        }
        Err(err) => render_db_error(res, err),
    }
}

#[handler]
pub async fn update_mapping(req: &mut Request, res: &mut Response) {
    let id = match req.param::<Uuid>("id") {
        Some(v) => v,
        None => {
            render_error(res, StatusCode::BAD_REQUEST, "invalid mapping id");
            return;
        }
    };
    let body = match req.parse_json::<MappingBody>().await {
        Ok(body) => body,
        Err(err) => {
            render_error(
                res,
                StatusCode::BAD_REQUEST,
                &format!("invalid mapping body: {err}"),
            );
            return;
        }
    };

    let store = web_state().db_manager.mapping_store();
    let mut mapping = match store.get_mapping(id).await {
        Ok(Some(m)) => m,
        Ok(None) => {
            render_error(res, StatusCode::NOT_FOUND, "mapping not found");
            return;
        }
        Err(err) => {
            render_db_error(res, err);
            return;
        }
    };

    let display = body
        .glide_table_display_name
        .unwrap_or_else(|| body.glide_table.clone());
    mapping.glide_table = body.glide_table;
    mapping.glide_table_display_name = display;
    mapping.supabase_table = body.supabase_table;
    mapping.column_mappings = body.column_mappings;
    mapping.sync_direction = body.sync_direction;
    if let Some(enabled) = body.enabled {
        mapping.enabled = enabled;
    }
    mapping.updated_at = Utc::now();

    let issues = validation::mapping_issues(&mapping);
    if !issues.is_empty() {
        render_error(res, StatusCode::BAD_REQUEST, &issues.join("; "));
        return;
    }

    match store.update_mapping(&mapping).await {
        Ok(()) => {
            web_state().engine.invalidate_mapping(id).await;
            res.render(Json(json!({ "mapping": mapping })));
        }
        Err(err) => render_db_error(res, err),
    }
}

#[handler]
pub async fn delete_mapping(req: &mut Request, res: &mut Response) {
    let id = match req.param::<Uuid>("id") {
        Some(v) => v,
        None => {
            render_error(res, StatusCode::BAD_REQUEST, "invalid mapping id");
            return;
        }
    };

    match web_state()
        .db_manager
        .mapping_store()
        .delete_mapping(id)
        .await
    {
        Ok(()) => {
            web_state().engine.invalidate_mapping(id).await;
            res.render(Json(json!({ "ok": true })));
        }
        Err(err) => render_db_error(res, err),
    }
}

async fn set_enabled(req: &mut Request, res: &mut Response, enabled: bool) {
    let id = match req.param::<Uuid>("id") {
        Some(v) => v,
        None => {
            render_error(res, StatusCode::BAD_REQUEST, "invalid mapping id");
            return;
        }
    };

    match web_state()
        .db_manager
        .mapping_store()
        .set_mapping_enabled(id, enabled)
        .await
    {
        Ok(()) => {
            web_state().engine.invalidate_mapping(id).await;
            res.render(Json(json!({ "ok": true, "enabled": enabled })));
        }
        Err(err) => render_db_error(res, err),
    }
}

#[handler]
pub async fn enable_mapping(req: &mut Request, res: &mut Response) {
    set_enabled(req, res, true).await;
}

#[handler]
pub async fn disable_mapping(req: &mut Request, res: &mut Response) {
    set_enabled(req, res, false).await;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn mapping_body_fills_in_display_name_and_enabled() {
        let body: MappingBody = serde_json::from_value(json!({
            "glide_table": "native-table-1",
            "supabase_table": "clients",
            "sync_direction": "to_supabase",
            "column_mappings": {
                "Name": {
                    "glide_column_name": "Name",
                    "supabase_column_name": "client_name",
                    "data_type": "string"
                }
            }
        }))
        .unwrap();

        let mapping = body.into_mapping();
        assert_eq!(mapping.glide_table_display_name, "native-table-1");
        assert!(mapping.enabled);
        assert_eq!(mapping.sync_direction, SyncDirection::ToSupabase);
    }

    #[test]
    fn mapping_body_honors_explicit_fields() {
        let body: MappingBody = serde_json::from_value(json!({
            "glide_table": "native-table-1",
            "glide_table_display_name": "Clients",
            "supabase_table": "clients",
            "sync_direction": "both",
            "enabled": false,
            "column_mappings": {}
        }))
        .unwrap();

        let mapping = body.into_mapping();
        assert_eq!(mapping.glide_table_display_name, "Clients");
        assert!(!mapping.enabled);
    }
}
