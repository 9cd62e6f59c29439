mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;

use camdb_kpi::{Dispatcher, EngineConfig, KpiEngine, PgKpiStore};
use tracing_subscriber::EnvFilter;

use crate::api::{build_app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = camdb_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    tracing::info!(env = %config.env, bind_addr = %config.bind_addr, "starting camdb-server");

    let pool_config = camdb_db::PoolConfig::from_app_config(&config);
    let pool = camdb_db::connect_pool(&config.database_url, pool_config).await?;
    let applied = camdb_db::run_migrations(&pool).await?;
    tracing::info!(applied, "migrations complete");

    let engine = KpiEngine::new(
        Arc::new(PgKpiStore::new(pool.clone())),
        EngineConfig::from_app_config(&config),
    );
    let _scheduler = scheduler::build_scheduler(engine.clone(), &config).await?;

    let app = build_app(AppState {
        pool,
        dispatcher: Dispatcher::new(engine),
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
