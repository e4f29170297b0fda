//! Scheduled background tasks using tokio-cron-scheduler.
//!
//! ```text
//! Scheduler (GEOCODE_SCHEDULE)
//!     │
//!     └─► start_job(Comprehensive)
//!             └─► already processing → skipped, logged
//! ```

use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::domains::geocoding::actions::start_job;
use crate::domains::geocoding::models::{JobParams, JobType};
use crate::kernel::ServerDeps;

/// Start the periodic comprehensive geocoding trigger
pub async fn start_scheduler(schedule: &str, deps: ServerDeps) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let geocode_job = Job::new_async(schedule, move |_uuid, _lock| {
        let deps = deps.clone();
        Box::pin(async move {
            if let Err(e) = run_scheduled_geocode(&deps).await {
                tracing::error!("Scheduled geocoding task failed: {}", e);
            }
        })
    })?;

    scheduler.add(geocode_job).await?;
    scheduler.start().await?;

    tracing::info!(schedule = %schedule, "Scheduled geocoding started");
    Ok(scheduler)
}

async fn run_scheduled_geocode(deps: &ServerDeps) -> Result<()> {
    let handle = start_job(JobType::Comprehensive, JobParams::default(), deps).await?;

    if handle.already_running {
        tracing::info!(
            job_id = %handle.job_id,
            "Skipping scheduled geocoding: comprehensive job still processing"
        );
    } else {
        tracing::info!(job_id = %handle.job_id, "Scheduled geocoding job started");
    }
    Ok(())
}
