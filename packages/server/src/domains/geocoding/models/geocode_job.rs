//! Persisted geocoding job runs.
//!
//! A row is created in `processing`, receives a progress snapshot after every
//! batch, and transitions to `completed` or `failed` exactly once. Every
//! mutation below is guarded by `status = 'processing'`, so terminal rows are
//! never rewritten.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::batch_result::BatchResult;
use super::collection::Collection;

/// Error recorded on rows force-reset by an operator
pub const MANUAL_RESET_ERROR: &str = "manually reset: stuck job cleared by operator";

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "geocode_job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    #[serde(alias = "running")]
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Job type discriminates the collection scope of a run.
///
/// At most one job per type may be processing at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Providers,
    Companies,
    Schools,
    JobListings,
    /// Every collection, visited in declared order
    Comprehensive,
}

impl JobType {
    pub const ALL: [JobType; 5] = [
        JobType::Providers,
        JobType::Companies,
        JobType::Schools,
        JobType::JobListings,
        JobType::Comprehensive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Providers => "providers",
            JobType::Companies => "companies",
            JobType::Schools => "schools",
            JobType::JobListings => "job_listings",
            JobType::Comprehensive => "comprehensive",
        }
    }

    /// Collections visited by this job type, in order
    pub fn collections(&self) -> Vec<Collection> {
        match self {
            JobType::Providers => vec![Collection::Providers],
            JobType::Companies => vec![Collection::Companies],
            JobType::Schools => vec![Collection::Schools],
            JobType::JobListings => vec![Collection::JobListings],
            JobType::Comprehensive => Collection::ALL.to_vec(),
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "providers" => Ok(JobType::Providers),
            "companies" => Ok(JobType::Companies),
            "schools" => Ok(JobType::Schools),
            "job_listings" => Ok(JobType::JobListings),
            "comprehensive" => Ok(JobType::Comprehensive),
            _ => Err(anyhow::anyhow!("Invalid job type: {}", s)),
        }
    }
}

// ============================================================================
// Snapshots
// ============================================================================

/// Parameters a run was requested with
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobParams {
    pub batch_size: Option<i64>,
    pub max_batches: Option<i64>,
    #[serde(default)]
    pub reprocess_all: bool,
}

/// Per-collection totals
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionProgress {
    pub collection: String,
    pub processed: i64,
    pub successful: i64,
    pub failed: i64,
    pub batches: i64,
    pub exhausted: bool,
}

/// Progress snapshot written after every batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    pub processed: i64,
    pub successful: i64,
    pub failed: i64,
    pub batches: i64,
    pub current_collection: Option<String>,
    pub last_batch: Option<BatchResult>,
    pub collections: Vec<CollectionProgress>,
}

impl JobProgress {
    /// Fold a batch into the totals for `collection`
    pub fn apply_batch(&mut self, collection: &str, batch: &BatchResult) {
        self.processed += batch.processed;
        self.successful += batch.successful;
        self.failed += batch.failed;
        self.batches += 1;
        self.current_collection = Some(collection.to_string());
        self.last_batch = Some(batch.clone());

        let entry = self.collection_entry(collection);
        entry.processed += batch.processed;
        entry.successful += batch.successful;
        entry.failed += batch.failed;
        entry.batches += 1;
    }

    pub fn mark_exhausted(&mut self, collection: &str) {
        self.collection_entry(collection).exhausted = true;
    }

    pub fn collection_entry(&mut self, collection: &str) -> &mut CollectionProgress {
        if let Some(idx) = self
            .collections
            .iter()
            .position(|c| c.collection == collection)
        {
            return &mut self.collections[idx];
        }

        self.collections.push(CollectionProgress {
            collection: collection.to_string(),
            ..Default::default()
        });
        let last = self.collections.len() - 1;
        &mut self.collections[last]
    }
}

/// Terminal totals and a human-readable message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub processed: i64,
    pub successful: i64,
    pub failed: i64,
    pub batches: i64,
    pub collections: Vec<CollectionProgress>,
    pub message: String,
}

impl JobSummary {
    pub fn from_progress(progress: &JobProgress, message: impl Into<String>) -> Self {
        Self {
            processed: progress.processed,
            successful: progress.successful,
            failed: progress.failed,
            batches: progress.batches,
            collections: progress.collections.clone(),
            message: message.into(),
        }
    }
}

// ============================================================================
// GeocodeJob Model
// ============================================================================

#[derive(FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct GeocodeJob {
    pub id: Uuid,
    pub job_type: String,
    pub status: JobStatus,
    pub params: Json<JobParams>,
    pub progress: Option<Json<JobProgress>>,
    pub result: Option<Json<JobSummary>>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

const COLUMNS: &str = "id, job_type, status, params, progress, result, error, \
                       started_at, completed_at, updated_at";

impl GeocodeJob {
    /// New in-memory row in `processing`, not yet persisted
    pub fn new_processing(job_type: JobType, params: JobParams) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            job_type: job_type.to_string(),
            status: JobStatus::Processing,
            params: Json(params),
            progress: None,
            result: None,
            error: None,
            started_at: now,
            completed_at: None,
            updated_at: now,
        }
    }

    pub fn progress(&self) -> Option<&JobProgress> {
        self.progress.as_ref().map(|p| &p.0)
    }

    pub fn summary(&self) -> Option<&JobSummary> {
        self.result.as_ref().map(|r| &r.0)
    }

    /// Insert a processing row.
    ///
    /// Returns `None` when another row of the same type is already
    /// processing (the partial unique index rejects the insert).
    pub async fn insert_processing(&self, pool: &PgPool) -> Result<Option<Self>> {
        let job = sqlx::query_as::<_, Self>(&format!(
            r#"
            INSERT INTO geocode_jobs (id, job_type, status, params, started_at, updated_at)
            VALUES ($1, $2, 'processing', $3, $4, $4)
            ON CONFLICT (job_type) WHERE status = 'processing' DO NOTHING
            RETURNING {COLUMNS}
            "#
        ))
        .bind(self.id)
        .bind(&self.job_type)
        .bind(&self.params)
        .bind(self.started_at)
        .fetch_optional(pool)
        .await?;
        Ok(job)
    }

    pub async fn find_by_id(id: Uuid, pool: &PgPool) -> Result<Option<Self>> {
        let job = sqlx::query_as::<_, Self>(&format!(
            "SELECT {COLUMNS} FROM geocode_jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;
        Ok(job)
    }

    /// The processing row for a job type, if any
    pub async fn find_processing(job_type: JobType, pool: &PgPool) -> Result<Option<Self>> {
        let job = sqlx::query_as::<_, Self>(&format!(
            "SELECT {COLUMNS} FROM geocode_jobs \
             WHERE job_type = $1 AND status = 'processing' \
             ORDER BY started_at DESC LIMIT 1"
        ))
        .bind(job_type.as_str())
        .fetch_optional(pool)
        .await?;
        Ok(job)
    }

    pub async fn find_recent(limit: i64, pool: &PgPool) -> Result<Vec<Self>> {
        let jobs = sqlx::query_as::<_, Self>(&format!(
            "SELECT {COLUMNS} FROM geocode_jobs ORDER BY started_at DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(pool)
        .await?;
        Ok(jobs)
    }

    /// Write a progress snapshot. Returns false if the row is no longer processing.
    pub async fn update_progress(id: Uuid, progress: &JobProgress, pool: &PgPool) -> Result<bool> {
        let rows = sqlx::query(
            r#"
            UPDATE geocode_jobs
            SET progress = $1,
                updated_at = NOW()
            WHERE id = $2 AND status = 'processing'
            "#,
        )
        .bind(Json(progress))
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();
        Ok(rows > 0)
    }

    pub async fn mark_completed(
        id: Uuid,
        progress: &JobProgress,
        summary: &JobSummary,
        pool: &PgPool,
    ) -> Result<bool> {
        let rows = sqlx::query(
            r#"
            UPDATE geocode_jobs
            SET status = 'completed',
                progress = $1,
                result = $2,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $3 AND status = 'processing'
            "#,
        )
        .bind(Json(progress))
        .bind(Json(summary))
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();
        Ok(rows > 0)
    }

    pub async fn mark_failed(
        id: Uuid,
        error: &str,
        progress: &JobProgress,
        summary: &JobSummary,
        pool: &PgPool,
    ) -> Result<bool> {
        let rows = sqlx::query(
            r#"
            UPDATE geocode_jobs
            SET status = 'failed',
                error = $1,
                progress = $2,
                result = $3,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $4 AND status = 'processing'
            "#,
        )
        .bind(error)
        .bind(Json(progress))
        .bind(Json(summary))
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();
        Ok(rows > 0)
    }

    /// Force every processing row of a job type to failed
    pub async fn reset_processing(job_type: JobType, pool: &PgPool) -> Result<u64> {
        let rows = sqlx::query(
            r#"
            UPDATE geocode_jobs
            SET status = 'failed',
                error = $1,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE job_type = $2 AND status = 'processing'
            "#,
        )
        .bind(MANUAL_RESET_ERROR)
        .bind(job_type.as_str())
        .execute(pool)
        .await?
        .rows_affected();
        Ok(rows)
    }
}
