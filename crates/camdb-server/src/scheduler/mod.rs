//! Background job scheduler.
//!
//! Initialises a [`JobScheduler`] at server startup and registers the nightly
//! KPI reconciliation sweep.

use camdb_kpi::KpiEngine;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process. Dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// the cron expression is invalid, or the scheduler fails to start.
pub async fn build_scheduler(
    engine: KpiEngine,
    config: &camdb_core::AppConfig,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    register_reconcile_job(&scheduler, engine, &config.reconcile_cron).await?;

    scheduler.start().await?;
    Ok(scheduler)
}

/// Register the KPI reconciliation job.
///
/// Recomputes every linked account scope and the campaign-wide scope of each
/// campaign they belong to, converging any value a failed or skipped trigger
/// left stale. Runs at 03:30 UTC by default (`CAMDB_RECONCILE_CRON`).
async fn register_reconcile_job(
    scheduler: &JobScheduler,
    engine: KpiEngine,
    cron: &str,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(cron, move |_uuid, _lock| {
        let engine = engine.clone();

        Box::pin(async move {
            tracing::info!("scheduler: starting kpi reconciliation run");
            run_reconcile_job(&engine).await;
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron = %cron, "scheduler: registered kpi reconciliation job");
    Ok(())
}

async fn run_reconcile_job(engine: &KpiEngine) {
    match engine.reconcile_all().await {
        Ok(report) if report.failures.is_empty() => {
            tracing::info!(
                scopes = report.scopes,
                "scheduler: kpi reconciliation run complete"
            );
        }
        Ok(report) => {
            tracing::warn!(
                scopes = report.scopes,
                succeeded = report.succeeded,
                failed = report.failures.len(),
                "scheduler: kpi reconciliation finished with failures"
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "scheduler: kpi reconciliation could not list links");
        }
    }
}
