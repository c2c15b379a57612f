use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use serde_json::json;
use uuid::Uuid;

use crate::config::Config;
use crate::db::DatabaseManager;
use crate::glide::GlideClient;
use crate::sync::SyncEngine;

#[derive(Parser, Debug)]
#[command(name = "glide-sync")]
#[command(about = "Glide to Supabase synchronization service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[arg(short, long, env = "CONFIG_PATH", default_value = "config.yaml")]
    pub config: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Run a sync cycle and exit")]
    Sync {
        #[arg(short, long, help = "Sync a single mapping by id", conflicts_with = "all")]
        mapping: Option<Uuid>,

        #[arg(short, long, help = "Sync every enabled mapping")]
        all: bool,
    },

    #[command(about = "Run the relationship backfill pass and exit")]
    Relationships {
        #[arg(short, long, help = "Restrict the pass to one table")]
        table: Option<String>,
    },

    #[command(about = "List configured table mappings")]
    ListMappings {
        #[arg(short, long, default_value = "100")]
        limit: i64,
    },

    #[command(about = "Show sync status")]
    Status,

    #[command(about = "Validate the configuration file")]
    ValidateConfig,
}

/// Runs a one-shot subcommand against the configured database, printing
/// results as JSON on stdout. Logs go to stderr.
pub async fn run_command(command: Commands, config_path: &Path) -> Result<()> {
    if let Commands::ValidateConfig = command {
        return validate_config(config_path);
    }

    let config = Arc::new(Config::load_from_file(config_path)?);
    crate::utils::logging::init_tracing(&config.logging);

    let db_manager = Arc::new(DatabaseManager::new(&config.database).await?);
    db_manager.migrate().await?;

    match command {
        Commands::Sync {
            mapping: Some(mapping_id),
            ..
        } => {
            let engine = build_engine(&db_manager, &config)?;
            let report = engine.sync_mapping(mapping_id).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Sync { .. } => {
            let engine = build_engine(&db_manager, &config)?;
            let reports = engine.sync_all_enabled().await?;
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        Commands::Relationships { table } => {
            let engine = build_engine(&db_manager, &config)?;
            let report = engine.map_relationships(table.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::ListMappings { limit } => {
            let mappings = db_manager
                .mapping_store()
                .list_mappings(limit.clamp(1, 1000), 0)
                .await?;
            let listing = json!({
                "mappings": mappings,
                "count": mappings.len(),
            });
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        Commands::Status => {
            let mapping_count = db_manager.mapping_store().count_mappings().await?;
            let unresolved = db_manager.error_store().count_unresolved().await?;
            let recent_runs = db_manager.log_store().list_logs(None, 5, 0).await?;
            let status = json!({
                "mappings": mapping_count,
                "unresolved_errors": unresolved,
                "recent_runs": recent_runs,
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        // handled before the config load
        Commands::ValidateConfig => {}
    }

    Ok(())
}

fn validate_config(path: &Path) -> Result<()> {
    match Config::load_from_file(path) {
        Ok(_) => {
            println!("configuration at {} is valid", path.display());
            Ok(())
        }
        Err(err) => Err(anyhow!(
            "configuration at {} is invalid: {err}",
            path.display()
        )),
    }
}

fn build_engine(db_manager: &DatabaseManager, config: &Config) -> Result<Arc<SyncEngine>> {
    let glide_client = Arc::new(GlideClient::new(&config.glide)?);
    Ok(Arc::new(SyncEngine::new(
        db_manager,
        glide_client,
        config.sync.clone(),
    )))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn sync_accepts_a_mapping_id() {
        let cli = Cli::parse_from([
            "glide-sync",
            "sync",
            "--mapping",
            "a3bb189e-8bf9-4888-9912-ace4e6543002",
        ]);
        match cli.command {
            Some(Commands::Sync {
                mapping: Some(id), ..
            }) => {
                assert_eq!(id.to_string(), "a3bb189e-8bf9-4888-9912-ace4e6543002");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn mapping_and_all_flags_conflict() {
        let result = Cli::try_parse_from([
            "glide-sync",
            "sync",
            "--mapping",
            "a3bb189e-8bf9-4888-9912-ace4e6543002",
            "--all",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn config_path_defaults_to_config_yaml() {
        let cli = Cli::parse_from(["glide-sync"]);
        assert_eq!(cli.config, PathBuf::from("config.yaml"));
        assert!(cli.command.is_none());
    }
}
