//! CLI for running and inspecting geocoding jobs outside the server
//!
//! `run` executes a job in the foreground and prints the final row as JSON.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use server_core::config::Config;
use server_core::domains::geocoding::actions::{job_status, reset_stuck_jobs, start_job};
use server_core::domains::geocoding::models::{GeocodeJob, JobParams, JobType};
use server_core::kernel::ServerDeps;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "geocode_cli")]
#[command(about = "Run and inspect batch geocoding jobs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a job in the foreground until it finishes
    Run {
        /// providers, companies, schools, job_listings or comprehensive
        job_type: JobType,
        #[arg(long)]
        batch_size: Option<i64>,
        #[arg(long)]
        max_batches: Option<i64>,
        /// Geocode rows that already have coordinates too
        #[arg(long)]
        reprocess_all: bool,
    },

    /// Print a job row
    Status { job_id: Uuid },

    /// Force stuck processing jobs to failed
    Reset { job_type: Option<JobType> },
}

fn print_job(job: &GeocodeJob) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(job)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            job_type,
            batch_size,
            max_batches,
            reprocess_all,
        } => {
            let shutdown = CancellationToken::new();
            let deps = connect(shutdown.clone()).await?;

            let ctrl_c = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted, stopping job after current record");
                    ctrl_c.cancel();
                }
            });

            let params = JobParams {
                batch_size,
                max_batches,
                reprocess_all,
            };
            let handle = start_job(job_type, params, &deps).await?;
            let job_id = handle.job_id;

            if handle.already_running {
                eprintln!("A {} job is already processing: {}", job_type, job_id);
            } else {
                handle.wait().await?;
            }

            match job_status(job_id, &deps).await? {
                Some(job) => print_job(&job)?,
                None => bail!("Job {} disappeared", job_id),
            }
        }

        Commands::Status { job_id } => {
            let deps = connect(CancellationToken::new()).await?;
            match job_status(job_id, &deps).await? {
                Some(job) => print_job(&job)?,
                None => bail!("Job {} not found", job_id),
            }
        }

        Commands::Reset { job_type } => {
            let deps = connect(CancellationToken::new()).await?;
            let reset = reset_stuck_jobs(job_type, &deps).await?;
            println!("Reset {} stuck job(s)", reset);
        }
    }

    Ok(())
}

/// Every command loads the full configuration, so a missing geocoding
/// token fails fast here too
async fn connect(shutdown: CancellationToken) -> Result<ServerDeps> {
    let config = Config::from_env()?;
    let pool = PgPool::connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    ServerDeps::from_config(&config, pool, shutdown)
}
