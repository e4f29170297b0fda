use axum::{extract::Extension, http::StatusCode, Json};
use serde::Serialize;

use crate::domains::geocoding::models::JobType;
use crate::kernel::ServerDeps;
use crate::server::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    database: DatabaseHealth,
    connection_pool: ConnectionPoolHealth,
    geocoding: GeocodingHealth,
}

#[derive(Serialize)]
pub struct DatabaseHealth {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
pub struct ConnectionPoolHealth {
    size: u32,
    idle_connections: usize,
    max_connections: u32,
}

/// Which job types have a processing row, and how many runs this process is driving
#[derive(Debug, Serialize)]
pub struct GeocodingHealth {
    processing: Vec<String>,
    local_tasks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// A registry error is reported but does not make the service unhealthy;
/// the database ping already covers connectivity.
pub async fn geocoding_health(deps: &ServerDeps) -> GeocodingHealth {
    let mut processing = Vec::new();
    let mut error = None;

    for job_type in JobType::ALL {
        match deps.jobs.find_processing(job_type).await {
            Ok(Some(_)) => processing.push(job_type.to_string()),
            Ok(None) => {}
            Err(e) => {
                error = Some(format!("Job lookup failed: {}", e));
                break;
            }
        }
    }

    GeocodingHealth {
        processing,
        local_tasks: deps.tasks.len(),
        error,
    }
}

/// Health check endpoint
///
/// Returns 200 OK when the database answers within 5s, 503 otherwise.
pub async fn health_handler(
    Extension(state): Extension<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let database = match tokio::time::timeout(
        std::time::Duration::from_secs(5),
        sqlx::query("SELECT 1").execute(&state.db_pool),
    )
    .await
    {
        Ok(Ok(_)) => DatabaseHealth {
            status: "ok".to_string(),
            error: None,
        },
        Ok(Err(e)) => DatabaseHealth {
            status: "error".to_string(),
            error: Some(format!("Query failed: {}", e)),
        },
        Err(_) => DatabaseHealth {
            status: "error".to_string(),
            error: Some("Query timeout (>5s)".to_string()),
        },
    };

    let connection_pool = ConnectionPoolHealth {
        size: state.db_pool.size(),
        idle_connections: state.db_pool.num_idle(),
        max_connections: state.db_pool.options().get_max_connections(),
    };

    let geocoding = geocoding_health(&state.deps).await;

    let (status_code, status) = if database.status == "ok" {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    (
        status_code,
        Json(HealthResponse {
            status: status.to_string(),
            database,
            connection_pool,
            geocoding,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::geocoding::models::{GeocodeJob, JobParams};
    use crate::kernel::test_dependencies::{InMemoryJobStore, TestDependencies};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_reports_processing_job_types() {
        let jobs = Arc::new(InMemoryJobStore::new());
        jobs.insert(GeocodeJob::new_processing(JobType::Schools, JobParams::default()));
        jobs.insert(GeocodeJob::new_processing(JobType::Comprehensive, JobParams::default()));
        let deps = TestDependencies::new().with_jobs(jobs).into_deps();

        let health = geocoding_health(&deps).await;

        assert_eq!(health.processing.len(), 2);
        assert!(health.processing.contains(&"schools".to_string()));
        assert!(health.processing.contains(&"comprehensive".to_string()));
        assert_eq!(health.local_tasks, 0);
        assert!(health.error.is_none());
    }
}
