//! PostgreSQL implementations of the record and job store traits.
//!
//! Thin adapters over the model methods in `domains::geocoding::models`.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, warn};
use uuid::Uuid;

use super::traits::{BaseJobStore, BaseRecordStore, CreateJobOutcome};
use crate::common::utils::Coordinates;
use crate::domains::geocoding::models::{
    CollectionSpec, GeocodableRecord, GeocodeJob, JobParams, JobProgress, JobSummary, JobType,
};

pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BaseRecordStore for PgRecordStore {
    async fn select_pending(
        &self,
        collection: &CollectionSpec,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<GeocodableRecord>> {
        GeocodableRecord::find_pending(collection, after, limit, &self.pool).await
    }

    async fn write_coordinates(
        &self,
        collection: &CollectionSpec,
        id: Uuid,
        coordinates: Coordinates,
    ) -> Result<()> {
        GeocodableRecord::update_coordinates(collection, id, coordinates, &self.pool).await
    }
}

pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BaseJobStore for PgJobStore {
    async fn create(&self, job_type: JobType, params: &JobParams) -> Result<CreateJobOutcome> {
        if let Some(existing) = GeocodeJob::find_processing(job_type, &self.pool).await? {
            return Ok(CreateJobOutcome::AlreadyRunning(existing));
        }

        let job = GeocodeJob::new_processing(job_type, params.clone());
        if let Some(created) = job.insert_processing(&self.pool).await? {
            return Ok(CreateJobOutcome::Created(created));
        }

        // Lost the race against a concurrent trigger
        debug!(job_type = %job_type, "processing job created concurrently");
        let existing = GeocodeJob::find_processing(job_type, &self.pool)
            .await?
            .ok_or_else(|| anyhow!("conflicting {} job vanished before it could be read", job_type))?;
        Ok(CreateJobOutcome::AlreadyRunning(existing))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<GeocodeJob>> {
        GeocodeJob::find_by_id(id, &self.pool).await
    }

    async fn find_processing(&self, job_type: JobType) -> Result<Option<GeocodeJob>> {
        GeocodeJob::find_processing(job_type, &self.pool).await
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<GeocodeJob>> {
        GeocodeJob::find_recent(limit, &self.pool).await
    }

    async fn record_progress(&self, id: Uuid, progress: &JobProgress) -> Result<()> {
        if !GeocodeJob::update_progress(id, progress, &self.pool).await? {
            warn!(job_id = %id, "progress not recorded: job is no longer processing");
        }
        Ok(())
    }

    async fn mark_completed(
        &self,
        id: Uuid,
        progress: &JobProgress,
        summary: &JobSummary,
    ) -> Result<()> {
        if !GeocodeJob::mark_completed(id, progress, summary, &self.pool).await? {
            warn!(job_id = %id, "completion not recorded: job is no longer processing");
        }
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        progress: &JobProgress,
        summary: &JobSummary,
    ) -> Result<()> {
        if !GeocodeJob::mark_failed(id, error, progress, summary, &self.pool).await? {
            warn!(job_id = %id, "failure not recorded: job is no longer processing");
        }
        Ok(())
    }

    async fn reset_processing(&self, job_type: JobType) -> Result<u64> {
        GeocodeJob::reset_processing(job_type, &self.pool).await
    }
}
