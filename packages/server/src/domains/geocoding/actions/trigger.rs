//! Entry points that register a job and hand it to a background task.

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::orchestrator::{run_job, OrchestratorConfig};
use crate::domains::geocoding::models::{GeocodeJob, JobParams, JobStatus, JobType};
use crate::kernel::{CreateJobOutcome, ServerDeps};

/// What a trigger produced
pub struct JobHandle {
    pub job_id: Uuid,
    /// True when an existing processing job was returned instead of a new one
    pub already_running: bool,
    task: Option<JoinHandle<Result<JobStatus>>>,
}

impl JobHandle {
    /// Wait for the background run. `None` when this trigger did not start one.
    pub async fn wait(self) -> Result<Option<JobStatus>> {
        match self.task {
            Some(task) => {
                let status = task.await.context("geocoding task panicked")??;
                Ok(Some(status))
            }
            None => Ok(None),
        }
    }
}

/// Register a job and start it in the background.
///
/// If a job of the same type is already processing, nothing is started and
/// the existing job's id is returned.
pub async fn start_job(job_type: JobType, params: JobParams, deps: &ServerDeps) -> Result<JobHandle> {
    let job = match deps.jobs.create(job_type, &params).await? {
        CreateJobOutcome::AlreadyRunning(existing) => {
            info!(
                job_id = %existing.id,
                job_type = %job_type,
                "geocoding job already processing, not starting another"
            );
            return Ok(JobHandle {
                job_id: existing.id,
                already_running: true,
                task: None,
            });
        }
        CreateJobOutcome::Created(job) => job,
    };

    let config = OrchestratorConfig::for_job(job_type, &params);
    let cancel = deps.shutdown.child_token();
    let task_deps = deps.clone();
    let job_id = job.id;

    info!(job_id = %job_id, job_type = %job_type, "geocoding job registered");

    let task = deps.tasks.spawn(async move {
        let result = run_job(job_id, &config, &task_deps, &cancel).await;
        if let Err(e) = &result {
            error!(job_id = %job_id, error = %e, "could not record geocoding job outcome");
        }
        result
    });

    Ok(JobHandle {
        job_id,
        already_running: false,
        task: Some(task),
    })
}

/// Clear stuck processing rows for `job_type` (or every type); returns how many were reset
pub async fn reset_stuck_jobs(job_type: Option<JobType>, deps: &ServerDeps) -> Result<u64> {
    let types = match job_type {
        Some(job_type) => vec![job_type],
        None => JobType::ALL.to_vec(),
    };

    let mut reset = 0;
    for job_type in types {
        let count = deps.jobs.reset_processing(job_type).await?;
        if count > 0 {
            warn!(job_type = %job_type, count, "reset stuck geocoding jobs");
        }
        reset += count;
    }
    Ok(reset)
}

pub struct Recovery {
    pub reset: u64,
    pub handle: JobHandle,
}

/// Force stuck jobs of every type to failed, then start a fresh run of `job_type`
pub async fn recover_and_restart(
    job_type: JobType,
    params: JobParams,
    deps: &ServerDeps,
) -> Result<Recovery> {
    let reset = reset_stuck_jobs(None, deps).await?;
    let handle = start_job(job_type, params, deps).await?;

    info!(reset, job_id = %handle.job_id, "geocoding recovery complete");
    Ok(Recovery { reset, handle })
}

/// Current state of a job
pub async fn job_status(job_id: Uuid, deps: &ServerDeps) -> Result<Option<GeocodeJob>> {
    deps.jobs.find_by_id(job_id).await
}
