// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Batch processing and orchestration are domain functions that use these traits.
//
// Naming convention: Base* for trait names (e.g., BaseGeocoder, BaseJobStore)

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::common::utils::Coordinates;
use crate::domains::geocoding::models::{
    CollectionSpec, GeocodableRecord, GeocodeJob, JobParams, JobProgress, JobSummary, JobType,
};

// =============================================================================
// Geocoder Trait (Infrastructure - forward geocoding provider)
// =============================================================================

/// Errors from a single forward-geocoding call.
///
/// A query that simply has no match is not an error; see [`BaseGeocoder::forward`].
#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("geocoding request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("geocoding provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("geocoding request timed out")]
    Timeout,

    #[error("invalid geocoding response: {0}")]
    Parse(String),
}

#[async_trait]
pub trait BaseGeocoder: Send + Sync {
    /// Resolve a free-text location. `Ok(None)` means the provider had no match.
    async fn forward(&self, query: &str) -> Result<Option<Coordinates>, GeocodeError>;
}

// =============================================================================
// Record Store Trait (Infrastructure - target collections)
// =============================================================================

#[async_trait]
pub trait BaseRecordStore: Send + Sync {
    /// Up to `limit` rows with id greater than `after` that still need
    /// coordinates, ordered by id. Empty means the collection is exhausted.
    async fn select_pending(
        &self,
        collection: &CollectionSpec,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<GeocodableRecord>>;

    /// Write latitude/longitude to one row, leaving every other column alone
    async fn write_coordinates(
        &self,
        collection: &CollectionSpec,
        id: Uuid,
        coordinates: Coordinates,
    ) -> Result<()>;
}

// =============================================================================
// Job Store Trait (Infrastructure - job registry persistence)
// =============================================================================

/// Result of asking the registry for a new run
#[derive(Debug, Clone)]
pub enum CreateJobOutcome {
    Created(GeocodeJob),
    /// A run of the same type is already processing
    AlreadyRunning(GeocodeJob),
}

impl CreateJobOutcome {
    pub fn job(&self) -> &GeocodeJob {
        match self {
            CreateJobOutcome::Created(job) | CreateJobOutcome::AlreadyRunning(job) => job,
        }
    }
}

#[async_trait]
pub trait BaseJobStore: Send + Sync {
    /// Create a processing row unless one of the same type already exists
    async fn create(&self, job_type: JobType, params: &JobParams) -> Result<CreateJobOutcome>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<GeocodeJob>>;

    async fn find_processing(&self, job_type: JobType) -> Result<Option<GeocodeJob>>;

    /// Most recently started jobs first
    async fn list_recent(&self, limit: i64) -> Result<Vec<GeocodeJob>>;

    async fn record_progress(&self, id: Uuid, progress: &JobProgress) -> Result<()>;

    async fn mark_completed(
        &self,
        id: Uuid,
        progress: &JobProgress,
        summary: &JobSummary,
    ) -> Result<()>;

    async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        progress: &JobProgress,
        summary: &JobSummary,
    ) -> Result<()>;

    /// Force processing rows of `job_type` to failed; returns how many were reset
    async fn reset_processing(&self, job_type: JobType) -> Result<u64>;
}

// =============================================================================
// Completion Notifier Trait (Infrastructure - fire-and-forget)
// =============================================================================

#[async_trait]
pub trait BaseCompletionNotifier: Send + Sync {
    async fn job_completed(&self, job: &GeocodeJob) -> Result<()>;
}
