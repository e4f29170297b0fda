//! Job orchestrator: drives the batch processor across one or more
//! collections until they are exhausted or a safety ceiling trips.
//!
//! # Loop
//!
//! ```text
//! for each collection (declared order)
//!     │
//!     ├─► check ceilings (cancelled, wall clock, inactivity)
//!     ├─► select next page after the cursor
//!     │       └─► empty → collection exhausted
//!     ├─► process_batch → fold into progress → persist snapshot
//!     ├─► short page or batch cap → next collection
//!     └─► sleep per backoff schedule
//! ```
//!
//! Every job type is the same loop with different data: collection list,
//! page size, batch cap, ceilings and backoff live in [`OrchestratorConfig`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use super::batch::{process_batch, BatchOptions};
use crate::domains::geocoding::models::{
    BatchResult, CollectionSpec, JobParams, JobProgress, JobStatus, JobSummary, JobType,
};
use crate::kernel::ServerDeps;

/// Largest page a request may ask for
pub const MAX_BATCH_SIZE: i64 = 100;

// ============================================================================
// Configuration
// ============================================================================

/// Inter-batch delays chosen from the last batch's outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffSchedule {
    /// At least one record was updated
    pub after_success: Duration,
    /// Nothing succeeded and something failed (quota, outage)
    pub after_systemic_failure: Duration,
    /// Anything else, including retrying after a hard failure
    pub otherwise: Duration,
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self {
            after_success: Duration::from_secs(5),
            after_systemic_failure: Duration::from_secs(60),
            otherwise: Duration::from_secs(10),
        }
    }
}

impl BackoffSchedule {
    pub fn delay_after(&self, batch: &BatchResult) -> Duration {
        if batch.successful > 0 {
            self.after_success
        } else if batch.is_systemic_failure() {
            self.after_systemic_failure
        } else {
            self.otherwise
        }
    }
}

#[derive(Debug, Clone, TypedBuilder)]
pub struct OrchestratorConfig {
    /// Visited in order
    pub collections: Vec<CollectionSpec>,
    #[builder(default = 50)]
    pub batch_size: i64,
    /// Per-collection cap on batches; `None` runs until exhausted
    #[builder(default, setter(strip_option))]
    pub max_batches: Option<i64>,
    #[builder(default = Duration::from_secs(60 * 60))]
    pub max_runtime: Duration,
    /// Longest allowed gap since the last successful record update
    #[builder(default = Duration::from_secs(10 * 60))]
    pub max_inactivity: Duration,
    /// Hard failures (not record misses) in a row before giving up
    #[builder(default = 10)]
    pub max_consecutive_failures: u32,
    #[builder(default)]
    pub backoff: BackoffSchedule,
    #[builder(default)]
    pub batch: BatchOptions,
}

impl OrchestratorConfig {
    /// Preset for a job type, with request overrides applied
    pub fn for_job(job_type: JobType, params: &JobParams) -> Self {
        let collections: Vec<CollectionSpec> = job_type
            .collections()
            .into_iter()
            .map(|c| c.spec().with_reprocess_all(params.reprocess_all))
            .collect();

        let (default_batch_size, default_max_batches, max_runtime) = match job_type {
            JobType::Comprehensive => (20, Some(50), Duration::from_secs(2 * 60 * 60)),
            _ => (50, None, Duration::from_secs(60 * 60)),
        };

        Self {
            collections,
            batch_size: params
                .batch_size
                .unwrap_or(default_batch_size)
                .clamp(1, MAX_BATCH_SIZE),
            max_batches: params.max_batches.map(|m| m.max(1)).or(default_max_batches),
            max_runtime,
            max_inactivity: Duration::from_secs(10 * 60),
            max_consecutive_failures: 10,
            backoff: BackoffSchedule::default(),
            batch: BatchOptions::default(),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Conditions that end a run as `failed`
#[derive(Debug, Error)]
pub enum JobError {
    #[error("timeout: job exceeded maximum runtime of {limit_secs}s")]
    WallClockExceeded { limit_secs: u64 },

    #[error("stalled: no successful update for {idle_secs}s (inactivity limit {limit_secs}s)")]
    Stalled { idle_secs: u64, limit_secs: u64 },

    #[error("aborted after {count} consecutive batch failures: {last_error}")]
    TooManyFailures { count: u32, last_error: String },

    #[error("cancelled: server shutting down")]
    Cancelled,
}

// ============================================================================
// Run
// ============================================================================

struct RunState {
    started: Instant,
    last_success: Instant,
    consecutive_failures: u32,
    progress: JobProgress,
}

impl RunState {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            started: now,
            last_success: now,
            consecutive_failures: 0,
            progress: JobProgress::default(),
        }
    }

    fn check_ceilings(
        &self,
        config: &OrchestratorConfig,
        cancel: &CancellationToken,
    ) -> Result<(), JobError> {
        if cancel.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        if self.started.elapsed() > config.max_runtime {
            return Err(JobError::WallClockExceeded {
                limit_secs: config.max_runtime.as_secs(),
            });
        }

        let idle = self.last_success.elapsed();
        if idle > config.max_inactivity {
            return Err(JobError::Stalled {
                idle_secs: idle.as_secs(),
                limit_secs: config.max_inactivity.as_secs(),
            });
        }

        Ok(())
    }

    /// Count a hard failure; errors out once the ceiling is reached
    fn record_hard_failure(
        &mut self,
        config: &OrchestratorConfig,
        error: &anyhow::Error,
    ) -> Result<(), JobError> {
        self.consecutive_failures += 1;
        warn!(
            error = %error,
            consecutive_failures = self.consecutive_failures,
            "batch step failed"
        );

        if self.consecutive_failures >= config.max_consecutive_failures {
            return Err(JobError::TooManyFailures {
                count: self.consecutive_failures,
                last_error: error.to_string(),
            });
        }
        Ok(())
    }
}

async fn pause(delay: Duration, cancel: &CancellationToken) -> Result<(), JobError> {
    tokio::select! {
        _ = tokio::time::sleep(delay) => Ok(()),
        _ = cancel.cancelled() => Err(JobError::Cancelled),
    }
}

/// Run a job that is already registered as processing, then record its
/// terminal status. Returns the status written.
///
/// Errors only when the terminal write itself fails.
pub async fn run_job(
    job_id: Uuid,
    config: &OrchestratorConfig,
    deps: &ServerDeps,
    cancel: &CancellationToken,
) -> Result<JobStatus> {
    info!(
        job_id = %job_id,
        collections = config.collections.len(),
        batch_size = config.batch_size,
        max_batches = ?config.max_batches,
        "geocoding job starting"
    );

    let mut state = RunState::new();
    let outcome = drive(job_id, &mut state, config, deps, cancel).await;
    let progress = state.progress;

    match outcome {
        Ok(()) => {
            let message = format!(
                "Geocoded {} of {} records across {} collection(s) in {} batches ({} failed)",
                progress.successful,
                progress.processed,
                config.collections.len(),
                progress.batches,
                progress.failed
            );
            info!(job_id = %job_id, "{}", message);

            let summary = JobSummary::from_progress(&progress, message);
            deps.jobs.mark_completed(job_id, &progress, &summary).await?;
            notify_completion(job_id, deps);
            Ok(JobStatus::Completed)
        }
        Err(e) => {
            error!(
                job_id = %job_id,
                error = %e,
                processed = progress.processed,
                successful = progress.successful,
                "geocoding job failed"
            );

            let summary = JobSummary::from_progress(&progress, format!("Job failed: {}", e));
            deps.jobs
                .mark_failed(job_id, &e.to_string(), &progress, &summary)
                .await?;
            Ok(JobStatus::Failed)
        }
    }
}

async fn drive(
    job_id: Uuid,
    state: &mut RunState,
    config: &OrchestratorConfig,
    deps: &ServerDeps,
    cancel: &CancellationToken,
) -> Result<(), JobError> {
    for spec in &config.collections {
        let name = spec.name();
        let mut cursor: Option<Uuid> = None;
        let mut batches: i64 = 0;

        state.progress.collection_entry(name);
        state.progress.current_collection = Some(name.to_string());
        info!(job_id = %job_id, collection = %name, "processing collection");

        loop {
            state.check_ceilings(config, cancel)?;

            let records = match deps
                .records
                .select_pending(spec, cursor, config.batch_size)
                .await
            {
                Ok(records) => records,
                Err(e) => {
                    state.record_hard_failure(config, &e)?;
                    pause(config.backoff.otherwise, cancel).await?;
                    continue;
                }
            };

            if records.is_empty() {
                state.progress.mark_exhausted(name);
                info!(job_id = %job_id, collection = %name, "collection exhausted");
                break;
            }

            let page_len = records.len() as i64;
            cursor = records.last().map(|r| r.id);

            let batch = process_batch(&records, spec, config.batch, deps).await;
            batches += 1;
            if batch.successful > 0 {
                state.last_success = Instant::now();
            }
            state.progress.apply_batch(name, &batch);

            info!(
                job_id = %job_id,
                collection = %name,
                batch = batches,
                processed = batch.processed,
                successful = batch.successful,
                failed = batch.failed,
                total_successful = state.progress.successful,
                "batch complete"
            );

            match deps.jobs.record_progress(job_id, &state.progress).await {
                Ok(()) => state.consecutive_failures = 0,
                Err(e) => state.record_hard_failure(config, &e)?,
            }

            if page_len < config.batch_size {
                state.progress.mark_exhausted(name);
                info!(job_id = %job_id, collection = %name, "collection exhausted");
                break;
            }

            if config.max_batches.is_some_and(|max| batches >= max) {
                info!(job_id = %job_id, collection = %name, batches, "batch cap reached");
                break;
            }

            let delay = config.backoff.delay_after(&batch);
            if batch.is_systemic_failure() {
                warn!(
                    job_id = %job_id,
                    collection = %name,
                    delay_secs = delay.as_secs(),
                    "no records geocoded in batch, backing off"
                );
            }
            pause(delay, cancel).await?;
        }
    }

    Ok(())
}

/// Fire-and-forget; failures are logged and otherwise ignored
fn notify_completion(job_id: Uuid, deps: &ServerDeps) {
    let jobs = Arc::clone(&deps.jobs);
    let notifier = Arc::clone(&deps.notifier);

    tokio::spawn(async move {
        let job = match jobs.find_by_id(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => return,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "could not load job for completion notice");
                return;
            }
        };

        if let Err(e) = notifier.job_completed(&job).await {
            warn!(job_id = %job_id, error = %e, "completion notification failed");
        }
    });
}
