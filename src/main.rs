#![forbid(unsafe_code)]
#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

mod cache;
mod cli;
mod config;
mod db;
mod glide;
mod scheduler;
mod sync;
mod utils;
mod web;

use config::Config;
use web::WebServer;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    if let Some(command) = cli.command {
        return cli::run_command(command, &cli.config).await;
    }

    let config = Arc::new(Config::load_from_file(&cli.config)?);
    utils::logging::init_tracing(&config.logging);
    web::metrics::Metrics::init();

    info!("glide-sync starting up");

    let db_manager = Arc::new(db::DatabaseManager::new(&config.database).await?);
    db_manager.migrate().await?;

    let glide_client = Arc::new(glide::GlideClient::new(&config.glide)?);
    let engine = Arc::new(sync::SyncEngine::new(
        &db_manager,
        glide_client,
        config.sync.clone(),
    ));

    let web_server = WebServer::new(config.clone(), db_manager.clone(), engine.clone()).await?;
    let web_handle = tokio::spawn(async move {
        if let Err(e) = web_server.start().await {
            error!("web server error: {}", e);
        }
    });

    let scheduler_handle = match scheduler::SyncScheduler::new(engine.clone(), &config.sync) {
        Some(scheduler) => tokio::spawn(scheduler.run()),
        None => {
            info!("scheduled sync disabled, runs are triggered via the HTTP API or CLI");
            tokio::spawn(futures::future::pending::<()>())
        }
    };

    tokio::pin!(web_handle);
    tokio::pin!(scheduler_handle);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl+C, beginning shutdown");
        },
        _ = &mut web_handle => {
            info!("web server task exited, beginning shutdown");
        },
        _ = &mut scheduler_handle => {
            info!("scheduler task exited, beginning shutdown");
        },
    }

    web_handle.abort();
    scheduler_handle.abort();

    info!("glide-sync shutting down");
    Ok(())
}
