// Main entry point for the geocoding server

use std::time::Duration;

use anyhow::{Context, Result};
use server_core::kernel::{scheduled_tasks::start_scheduler, ServerDeps};
use server_core::{server::build_app, Config};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const JOB_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting directory geocoding server");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    // Connect to database
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    // Cancelled on shutdown; every running job holds a child token
    let shutdown = CancellationToken::new();
    let deps = ServerDeps::from_config(&config, pool.clone(), shutdown.clone())?;

    let _scheduler = match &config.geocode_schedule {
        Some(schedule) => Some(
            start_scheduler(schedule, deps.clone())
                .await
                .context("Failed to start geocoding scheduler")?,
        ),
        None => {
            tracing::info!("GEOCODE_SCHEDULE not set, scheduled geocoding disabled");
            None
        }
    };

    let app = build_app(pool, deps.clone());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received, cancelling running geocoding jobs");
            shutdown.cancel();
        })
        .await
        .context("Server error")?;

    // Let cancelled jobs write their failed status before the runtime goes away
    if deps.drain_jobs(JOB_SHUTDOWN_GRACE).await {
        tracing::info!("All geocoding jobs stopped");
    }

    Ok(())
}
