pub mod batch;
pub mod orchestrator;
pub mod trigger;

pub use batch::{process_batch, BatchOptions};
pub use orchestrator::{run_job, BackoffSchedule, JobError, OrchestratorConfig, MAX_BATCH_SIZE};
pub use trigger::{job_status, recover_and_restart, reset_stuck_jobs, start_job, JobHandle, Recovery};
