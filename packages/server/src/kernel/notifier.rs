use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

use super::traits::BaseCompletionNotifier;
use crate::domains::geocoding::models::GeocodeJob;

/// Posts the finished job row as JSON to a configured URL
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build webhook HTTP client")?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl BaseCompletionNotifier for WebhookNotifier {
    async fn job_completed(&self, job: &GeocodeJob) -> Result<()> {
        self.client
            .post(&self.url)
            .json(job)
            .send()
            .await
            .context("Completion webhook request failed")?
            .error_for_status()
            .context("Completion webhook rejected the notification")?;

        info!(job_id = %job.id, "Completion webhook delivered");
        Ok(())
    }
}

/// Used when no webhook is configured
pub struct NoopNotifier;

#[async_trait]
impl BaseCompletionNotifier for NoopNotifier {
    async fn job_completed(&self, _job: &GeocodeJob) -> Result<()> {
        Ok(())
    }
}
