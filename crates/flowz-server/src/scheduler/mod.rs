//! Background job scheduler.
//!
//! A batch whose client disconnects stops mid-run with the job still
//! `running` (the orchestrator makes no further writes once the stream is
//! closed). The reaper registered here periodically fails such stranded jobs
//! so the dashboard does not show them as live forever.

use std::sync::Arc;

use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use flowz_core::AppConfig;

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive for
/// the lifetime of the process — dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// a job cannot be registered, or the scheduler fails to start.
pub async fn build_scheduler(
    pool: PgPool,
    config: Arc<AppConfig>,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    register_reaper_job(&scheduler, pool, config).await?;

    scheduler.start().await?;
    Ok(scheduler)
}

/// Register the stale-job reaper, running every 15 minutes.
async fn register_reaper_job(
    scheduler: &JobScheduler,
    pool: PgPool,
    config: Arc<AppConfig>,
) -> Result<(), JobSchedulerError> {
    let pool = Arc::new(pool);

    let job = Job::new_async("0 */15 * * * *", move |_uuid, _lock| {
        let pool = Arc::clone(&pool);
        let config = Arc::clone(&config);

        Box::pin(async move {
            run_reaper(&pool, &config).await;
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}

/// Fails jobs stuck in `running` beyond the configured timeout.
async fn run_reaper(pool: &PgPool, config: &AppConfig) {
    #[allow(clippy::cast_possible_wrap)]
    let older_than_secs = config.stale_job_timeout_secs as i64;

    match flowz_db::fail_stale_jobs(pool, older_than_secs).await {
        Ok(reaped) if reaped.is_empty() => {
            tracing::debug!("reaper: no stale generation jobs");
        }
        Ok(reaped) => {
            tracing::warn!(
                count = reaped.len(),
                older_than_secs,
                "reaper: failed stale generation jobs"
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "reaper: could not fail stale jobs");
        }
    }
}
