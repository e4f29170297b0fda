//! Application setup and server configuration.

use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, Method},
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::kernel::ServerDeps;
use crate::server::routes::{
    get_job_handler, health_handler, list_jobs_handler, recover_handler, trigger_job_handler,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub deps: ServerDeps,
}

/// Build the Axum application router
pub fn build_app(pool: PgPool, deps: ServerDeps) -> Router {
    let app_state = AppState {
        db_pool: pool,
        deps,
    };

    // CORS configuration - allow any origin (admin dashboards poll job status)
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route("/api/geocode/jobs", get(list_jobs_handler))
        // `:job` is a job id for GET and a job type for POST
        .route(
            "/api/geocode/jobs/:job",
            get(get_job_handler).post(trigger_job_handler),
        )
        .route("/api/geocode/recover", post(recover_handler))
        .route("/health", get(health_handler))
        // Middleware layers (applied in reverse order - last added runs first)
        .layer(Extension(app_state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
