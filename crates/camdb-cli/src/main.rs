mod kpi;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use camdb_kpi::{EngineConfig, KpiEngine, PgKpiStore};

use crate::kpi::KpiCommands;

#[derive(Debug, Parser)]
#[command(name = "camdb-cli")]
#[command(about = "Campaign KPI database command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// KPI maintenance
    Kpi {
        #[command(subcommand)]
        command: KpiCommands,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = camdb_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = camdb_db::PoolConfig::from_app_config(&config);
    let pool = camdb_db::connect_pool(&config.database_url, pool_config).await?;
    tracing::debug!(command = ?cli.command, "running command");

    match cli.command {
        Commands::Migrate => {
            let applied = camdb_db::run_migrations(&pool).await?;
            println!("applied {applied} migrations");
        }
        Commands::Kpi { command } => {
            let engine = KpiEngine::new(
                Arc::new(PgKpiStore::new(pool)),
                EngineConfig::from_app_config(&config),
            );
            match command {
                KpiCommands::Recalc { campaign, account } => {
                    kpi::run_kpi_recalc(&engine, campaign, account).await?;
                }
                KpiCommands::Init { campaign, account } => {
                    kpi::run_kpi_init(&engine, campaign, account).await?;
                }
                KpiCommands::Reconcile => kpi::run_kpi_reconcile(&engine).await?,
                KpiCommands::Show { campaign, account } => {
                    kpi::run_kpi_show(&engine, campaign, account).await?;
                }
            }
        }
    }

    Ok(())
}
