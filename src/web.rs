use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use once_cell::sync::OnceCell;
use salvo::prelude::*;
use tracing::info;

use crate::config::Config;
use crate::db::DatabaseManager;
use crate::sync::SyncEngine;

mod health;
mod mappings;
pub mod metrics;
mod sync_api;

use health::{get_status, health_check};
use mappings::{
    create_mapping, delete_mapping, disable_mapping, enable_mapping, get_mapping, list_mappings,
    update_mapping,
};
use metrics::metrics_endpoint;
use sync_api::{
    create_relationship, delete_relationship, get_log, list_errors, list_logs, list_relationships,
    map_relationships, resolve_error, trigger_mapping_sync, trigger_sync,
};

#[derive(Clone)]
pub struct WebState {
    pub config: Arc<Config>,
    pub db_manager: Arc<DatabaseManager>,
    pub engine: Arc<SyncEngine>,
    pub started_at: Instant,
}

static WEB_STATE: OnceCell<WebState> = OnceCell::new();

pub fn web_state() -> &'static WebState {
    WEB_STATE
        .get()
        .expect("web state is not initialized before handler execution")
}

#[derive(Clone)]
pub struct WebServer {
    config: Arc<Config>,
}

impl WebServer {
    pub async fn new(
        config: Arc<Config>,
        db_manager: Arc<DatabaseManager>,
        engine: Arc<SyncEngine>,
    ) -> Result<Self> {
        let _ = WEB_STATE.set(WebState {
            config: config.clone(),
            db_manager,
            engine,
            started_at: Instant::now(),
        });

        Ok(Self { config })
    }

    pub async fn start(&self) -> Result<()> {
        let bind_addr = format!("{}:{}", self.config.web.bind_address, self.config.web.port);
        info!("starting web server on {}", bind_addr);

        let acceptor = TcpListener::new(bind_addr).bind().await;
        Server::new(acceptor)
            .serve(root_router(self.config.metrics.enabled))
            .await;

        Ok(())
    }
}

pub fn root_router(metrics_enabled: bool) -> Router {
    let mut router = Router::new()
        .push(Router::with_path("health").get(health_check))
        .push(Router::with_path("status").get(get_status));
    if metrics_enabled {
        router = router.push(Router::with_path("metrics").get(metrics_endpoint));
    }
    router.push(
        Router::with_path("api/v1")
            .push(
                Router::with_path("mappings")
                    .get(list_mappings)
                    .post(create_mapping),
            )
            .push(
                Router::with_path("mappings/{id}")
                    .get(get_mapping)
                    .put(update_mapping)
                    .delete(delete_mapping),
            )
            .push(Router::with_path("mappings/{id}/enable").post(enable_mapping))
            .push(Router::with_path("mappings/{id}/disable").post(disable_mapping))
            .push(Router::with_path("sync").post(trigger_sync))
            .push(Router::with_path("sync/{id}").post(trigger_mapping_sync))
            .push(Router::with_path("logs").get(list_logs))
            .push(Router::with_path("logs/{id}").get(get_log))
            .push(Router::with_path("errors").get(list_errors))
            .push(Router::with_path("errors/{id}/resolve").post(resolve_error))
            .push(
                Router::with_path("relationships")
                    .get(list_relationships)
                    .post(create_relationship),
            )
            // literal segment registered ahead of the {id} capture
            .push(Router::with_path("relationships/map").post(map_relationships))
            .push(Router::with_path("relationships/{id}").delete(delete_relationship)),
    )
}
