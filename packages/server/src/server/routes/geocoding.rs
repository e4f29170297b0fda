//! Geocoding job endpoints: trigger, poll, list, recover.

use axum::{
    body::Bytes,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::domains::geocoding::actions::{job_status, recover_and_restart, start_job, JobHandle};
use crate::domains::geocoding::models::{GeocodeJob, JobParams, JobType};
use crate::server::app::AppState;

const DEFAULT_LIST_LIMIT: i64 = 20;
const MAX_LIST_LIMIT: i64 = 100;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        ApiError::Internal(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Internal(error) => {
                tracing::error!(error = %error, "geocoding request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Reference to a run returned by the trigger endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct JobAccepted {
    pub job_id: Uuid,
    pub status: String,
    pub already_running: bool,
}

impl From<&JobHandle> for JobAccepted {
    fn from(handle: &JobHandle) -> Self {
        Self {
            job_id: handle.job_id,
            status: "processing".to_string(),
            already_running: handle.already_running,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RecoverRequest {
    pub job_type: Option<String>,
    pub batch_size: Option<i64>,
    pub max_batches: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecoverResponse {
    pub reset: u64,
    pub job: JobAccepted,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
}

/// An empty body means "use defaults"; anything else must parse.
/// Content type is not checked, so `curl -d` bodies work too.
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {}", e)))
}

fn parse_job_type(raw: &str) -> Result<JobType, ApiError> {
    raw.parse()
        .map_err(|e: anyhow::Error| ApiError::BadRequest(e.to_string()))
}

// ============================================================================
// Handlers
// ============================================================================

/// `POST /api/geocode/jobs/:job_type`
pub async fn trigger_job_handler(
    Extension(state): Extension<AppState>,
    Path(job_type): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<JobAccepted>), ApiError> {
    let job_type = parse_job_type(&job_type)?;
    let params: JobParams = parse_body(&body)?;

    let handle = start_job(job_type, params, &state.deps).await?;
    Ok((StatusCode::ACCEPTED, Json(JobAccepted::from(&handle))))
}

/// `GET /api/geocode/jobs/:id`
pub async fn get_job_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<String>,
) -> Result<Json<GeocodeJob>, ApiError> {
    let id: Uuid = id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid job id: {}", id)))?;

    job_status(id, &state.deps)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Job {} not found", id)))
}

/// `GET /api/geocode/jobs?limit=N`
pub async fn list_jobs_handler(
    Extension(state): Extension<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<GeocodeJob>>, ApiError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);

    Ok(Json(state.deps.jobs.list_recent(limit).await?))
}

/// `POST /api/geocode/recover`
pub async fn recover_handler(
    Extension(state): Extension<AppState>,
    body: Bytes,
) -> Result<Json<RecoverResponse>, ApiError> {
    let request: RecoverRequest = parse_body(&body)?;
    let job_type = match request.job_type.as_deref() {
        Some(raw) => parse_job_type(raw)?,
        None => JobType::Comprehensive,
    };
    let params = JobParams {
        batch_size: request.batch_size,
        max_batches: request.max_batches,
        reprocess_all: false,
    };

    let recovery = recover_and_restart(job_type, params, &state.deps).await?;
    Ok(Json(RecoverResponse {
        reset: recovery.reset,
        job: JobAccepted::from(&recovery.handle),
    }))
}
