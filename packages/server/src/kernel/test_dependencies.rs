// TestDependencies - mock implementations for testing
//
// In-memory stand-ins for every infrastructure trait, so batch and job logic
// can run without Postgres or the geocoding provider.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{
    BaseCompletionNotifier, BaseGeocoder, BaseJobStore, BaseRecordStore, CreateJobOutcome,
    GeocodeError, ServerDeps,
};
use crate::common::utils::Coordinates;
use crate::domains::geocoding::models::{
    Collection, CollectionSpec, GeocodableRecord, GeocodeJob, JobParams, JobProgress, JobStatus,
    JobSummary, JobType, MANUAL_RESET_ERROR,
};

// =============================================================================
// Mock Geocoder
// =============================================================================

/// Canned outcome; `GeocodeError` is not `Clone`, so errors are rebuilt per call
#[derive(Debug, Clone)]
enum MockResponse {
    Hit(Coordinates),
    Miss,
    Status { status: u16, body: String },
    Timeout,
    Parse(String),
}

impl MockResponse {
    fn from_result(result: Result<Option<Coordinates>, GeocodeError>) -> Self {
        match result {
            Ok(Some(coordinates)) => MockResponse::Hit(coordinates),
            Ok(None) => MockResponse::Miss,
            Err(GeocodeError::Status { status, body }) => MockResponse::Status { status, body },
            Err(GeocodeError::Timeout) => MockResponse::Timeout,
            Err(e) => MockResponse::Parse(e.to_string()),
        }
    }

    fn to_result(&self) -> Result<Option<Coordinates>, GeocodeError> {
        match self {
            MockResponse::Hit(coordinates) => Ok(Some(*coordinates)),
            MockResponse::Miss => Ok(None),
            MockResponse::Status { status, body } => Err(GeocodeError::Status {
                status: *status,
                body: body.clone(),
            }),
            MockResponse::Timeout => Err(GeocodeError::Timeout),
            MockResponse::Parse(message) => Err(GeocodeError::Parse(message.clone())),
        }
    }
}

pub struct MockGeocoder {
    default: MockResponse,
    responses: HashMap<String, MockResponse>,
    latency: Duration,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockGeocoder {
    fn with_default(default: MockResponse) -> Self {
        Self {
            default,
            responses: HashMap::new(),
            latency: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every query resolves to `coordinates`
    pub fn hit_all(coordinates: Coordinates) -> Self {
        Self::with_default(MockResponse::Hit(coordinates))
    }

    /// Every query has no match
    pub fn miss_all() -> Self {
        Self::with_default(MockResponse::Miss)
    }

    /// Every query fails with the given provider status
    pub fn fail_all(status: u16) -> Self {
        Self::with_default(MockResponse::Status {
            status,
            body: "mock provider failure".to_string(),
        })
    }

    /// Override the outcome for one exact query string
    pub fn respond_to(
        mut self,
        query: &str,
        result: Result<Option<Coordinates>, GeocodeError>,
    ) -> Self {
        self.responses
            .insert(query.to_string(), MockResponse::from_result(result));
        self
    }

    /// Delay every call (use with paused tokio time)
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl BaseGeocoder for MockGeocoder {
    async fn forward(&self, query: &str) -> Result<Option<Coordinates>, GeocodeError> {
        self.calls.lock().unwrap().push(query.to_string());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.responses
            .get(query)
            .unwrap_or(&self.default)
            .to_result()
    }
}

// =============================================================================
// In-Memory Record Store
// =============================================================================

/// Collections keyed by id, so iteration order matches `ORDER BY id`
pub struct InMemoryRecordStore {
    collections: Mutex<HashMap<Collection, BTreeMap<Uuid, GeocodableRecord>>>,
    select_calls: AtomicUsize,
    write_calls: AtomicUsize,
    failing_selects: AtomicUsize,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
            select_calls: AtomicUsize::new(0),
            write_calls: AtomicUsize::new(0),
            failing_selects: AtomicUsize::new(0),
        }
    }

    pub fn insert(&self, collection: Collection, record: GeocodableRecord) {
        self.collections
            .lock()
            .unwrap()
            .entry(collection)
            .or_default()
            .insert(record.id, record);
    }

    pub fn get(&self, collection: Collection, id: Uuid) -> Option<GeocodableRecord> {
        self.collections
            .lock()
            .unwrap()
            .get(&collection)
            .and_then(|rows| rows.get(&id).cloned())
    }

    /// All rows of a collection in id order
    pub fn records(&self, collection: Collection) -> Vec<GeocodableRecord> {
        self.collections
            .lock()
            .unwrap()
            .get(&collection)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Make the next `count` selections fail
    pub fn fail_next_selects(&self, count: usize) {
        self.failing_selects.store(count, Ordering::SeqCst);
    }

    pub fn select_count(&self) -> usize {
        self.select_calls.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

fn matches_selection(spec: &CollectionSpec, record: &GeocodableRecord) -> bool {
    if !spec.reprocess_all && !record.needs_geocoding() {
        return false;
    }
    if spec.require_city && record.city.as_deref().map_or(true, str::is_empty) {
        return false;
    }
    true
}

#[async_trait]
impl BaseRecordStore for InMemoryRecordStore {
    async fn select_pending(
        &self,
        collection: &CollectionSpec,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<GeocodableRecord>> {
        self.select_calls.fetch_add(1, Ordering::SeqCst);

        let failing = self.failing_selects.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_selects.store(failing - 1, Ordering::SeqCst);
            return Err(anyhow!("connection refused"));
        }

        let collections = self.collections.lock().unwrap();
        let Some(rows) = collections.get(&collection.collection) else {
            return Ok(Vec::new());
        };

        Ok(rows
            .values()
            .filter(|r| after.map_or(true, |cursor| r.id > cursor))
            .filter(|r| matches_selection(collection, r))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn write_coordinates(
        &self,
        collection: &CollectionSpec,
        id: Uuid,
        coordinates: Coordinates,
    ) -> Result<()> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);

        let mut collections = self.collections.lock().unwrap();
        let record = collections
            .get_mut(&collection.collection)
            .and_then(|rows| rows.get_mut(&id))
            .ok_or_else(|| anyhow!("{} row {} not found", collection.table, id))?;

        record.latitude = Some(coordinates.latitude);
        record.longitude = Some(coordinates.longitude);
        Ok(())
    }
}

// =============================================================================
// In-Memory Job Store
// =============================================================================

/// Mirrors the Postgres registry: one processing row per type, and
/// updates only land on processing rows
pub struct InMemoryJobStore {
    jobs: Mutex<Vec<GeocodeJob>>,
    progress_writes: AtomicUsize,
    terminal_write_latency: Duration,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            progress_writes: AtomicUsize::new(0),
            terminal_write_latency: Duration::ZERO,
        }
    }

    /// Delay completed/failed writes, like a database round trip
    pub fn with_terminal_write_latency(mut self, latency: Duration) -> Self {
        self.terminal_write_latency = latency;
        self
    }

    async fn terminal_write_delay(&self) {
        if !self.terminal_write_latency.is_zero() {
            tokio::time::sleep(self.terminal_write_latency).await;
        }
    }

    /// Seed a row as-is (e.g. a stale processing job)
    pub fn insert(&self, job: GeocodeJob) {
        self.jobs.lock().unwrap().push(job);
    }

    pub fn jobs(&self) -> Vec<GeocodeJob> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn progress_write_count(&self) -> usize {
        self.progress_writes.load(Ordering::SeqCst)
    }

    fn update_processing(&self, id: Uuid, apply: impl FnOnce(&mut GeocodeJob)) {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs
            .iter_mut()
            .find(|j| j.id == id && j.status == JobStatus::Processing)
        {
            apply(job);
            job.updated_at = Utc::now();
        }
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseJobStore for InMemoryJobStore {
    async fn create(&self, job_type: JobType, params: &JobParams) -> Result<CreateJobOutcome> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(existing) = jobs
            .iter()
            .find(|j| j.job_type == job_type.as_str() && j.status == JobStatus::Processing)
        {
            return Ok(CreateJobOutcome::AlreadyRunning(existing.clone()));
        }

        let job = GeocodeJob::new_processing(job_type, params.clone());
        jobs.push(job.clone());
        Ok(CreateJobOutcome::Created(job))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<GeocodeJob>> {
        Ok(self.jobs.lock().unwrap().iter().find(|j| j.id == id).cloned())
    }

    async fn find_processing(&self, job_type: JobType) -> Result<Option<GeocodeJob>> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .find(|j| j.job_type == job_type.as_str() && j.status == JobStatus::Processing)
            .cloned())
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<GeocodeJob>> {
        let mut jobs = self.jobs.lock().unwrap().clone();
        jobs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        jobs.truncate(limit.max(0) as usize);
        Ok(jobs)
    }

    async fn record_progress(&self, id: Uuid, progress: &JobProgress) -> Result<()> {
        self.progress_writes.fetch_add(1, Ordering::SeqCst);
        self.update_processing(id, |job| job.progress = Some(Json(progress.clone())));
        Ok(())
    }

    async fn mark_completed(
        &self,
        id: Uuid,
        progress: &JobProgress,
        summary: &JobSummary,
    ) -> Result<()> {
        self.terminal_write_delay().await;
        self.update_processing(id, |job| {
            job.status = JobStatus::Completed;
            job.progress = Some(Json(progress.clone()));
            job.result = Some(Json(summary.clone()));
            job.completed_at = Some(Utc::now());
        });
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        progress: &JobProgress,
        summary: &JobSummary,
    ) -> Result<()> {
        self.terminal_write_delay().await;
        self.update_processing(id, |job| {
            job.status = JobStatus::Failed;
            job.error = Some(error.to_string());
            job.progress = Some(Json(progress.clone()));
            job.result = Some(Json(summary.clone()));
            job.completed_at = Some(Utc::now());
        });
        Ok(())
    }

    async fn reset_processing(&self, job_type: JobType) -> Result<u64> {
        let mut jobs = self.jobs.lock().unwrap();
        let mut reset = 0;
        for job in jobs
            .iter_mut()
            .filter(|j| j.job_type == job_type.as_str() && j.status == JobStatus::Processing)
        {
            job.status = JobStatus::Failed;
            job.error = Some(MANUAL_RESET_ERROR.to_string());
            job.completed_at = Some(Utc::now());
            job.updated_at = Utc::now();
            reset += 1;
        }
        Ok(reset)
    }
}

// =============================================================================
// Recording Notifier
// =============================================================================

pub struct RecordingNotifier {
    delivered: Mutex<Vec<GeocodeJob>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    /// Notifier whose every delivery errors
    pub fn failing() -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn delivered(&self) -> Vec<GeocodeJob> {
        self.delivered.lock().unwrap().clone()
    }
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseCompletionNotifier for RecordingNotifier {
    async fn job_completed(&self, job: &GeocodeJob) -> Result<()> {
        self.delivered.lock().unwrap().push(job.clone());
        if self.fail {
            return Err(anyhow!("webhook unreachable"));
        }
        Ok(())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Ungeocoded record with a fresh id
pub fn record_with(
    address: Option<&str>,
    city: Option<&str>,
    state: Option<&str>,
) -> GeocodableRecord {
    GeocodableRecord {
        id: Uuid::now_v7(),
        label: None,
        address: address.map(String::from),
        city: city.map(String::from),
        state: state.map(String::from),
        postal_code: None,
        latitude: None,
        longitude: None,
    }
}

// =============================================================================
// TestDependencies - Builder for test dependencies
// =============================================================================

#[derive(Clone)]
pub struct TestDependencies {
    pub geocoder: Arc<MockGeocoder>,
    pub records: Arc<InMemoryRecordStore>,
    pub jobs: Arc<InMemoryJobStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub shutdown: CancellationToken,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            geocoder: Arc::new(MockGeocoder::miss_all()),
            records: Arc::new(InMemoryRecordStore::new()),
            jobs: Arc::new(InMemoryJobStore::new()),
            notifier: Arc::new(RecordingNotifier::new()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_geocoder(mut self, geocoder: Arc<MockGeocoder>) -> Self {
        self.geocoder = geocoder;
        self
    }

    pub fn with_records(mut self, records: Arc<InMemoryRecordStore>) -> Self {
        self.records = records;
        self
    }

    pub fn with_jobs(mut self, jobs: Arc<InMemoryJobStore>) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<RecordingNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Convert to ServerDeps for use with geocoding actions
    pub fn into_deps(self) -> ServerDeps {
        ServerDeps::new(
            self.geocoder,
            self.records,
            self.jobs,
            self.notifier,
            self.shutdown,
        )
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
