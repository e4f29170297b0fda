//! Server dependencies for geocoding jobs (using traits for testability)
//!
//! This module provides the central dependency container handed to every
//! geocoding action. All external services use trait abstractions so tests
//! can swap in the mocks from `test_dependencies`.

use anyhow::Result;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::Config;
use crate::kernel::{
    BaseCompletionNotifier, BaseGeocoder, BaseJobStore, BaseRecordStore, MapboxGeocoder,
    NoopNotifier, PgJobStore, PgRecordStore, WebhookNotifier,
};

/// Server dependencies accessible to geocoding actions
#[derive(Clone)]
pub struct ServerDeps {
    pub geocoder: Arc<dyn BaseGeocoder>,
    pub records: Arc<dyn BaseRecordStore>,
    pub jobs: Arc<dyn BaseJobStore>,
    pub notifier: Arc<dyn BaseCompletionNotifier>,
    /// Parent token for every spawned job; cancelled on process shutdown
    pub shutdown: CancellationToken,
    /// Every spawned job task, so shutdown can wait for terminal writes
    pub tasks: TaskTracker,
}

impl ServerDeps {
    /// Create new ServerDeps with the given dependencies
    pub fn new(
        geocoder: Arc<dyn BaseGeocoder>,
        records: Arc<dyn BaseRecordStore>,
        jobs: Arc<dyn BaseJobStore>,
        notifier: Arc<dyn BaseCompletionNotifier>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            geocoder,
            records,
            jobs,
            notifier,
            shutdown,
            tasks: TaskTracker::new(),
        }
    }

    /// Production wiring: Postgres stores, Mapbox client, optional webhook
    pub fn from_config(config: &Config, pool: PgPool, shutdown: CancellationToken) -> Result<Self> {
        let geocoder: Arc<dyn BaseGeocoder> = Arc::new(MapboxGeocoder::new(&config.geocoding)?);

        let notifier: Arc<dyn BaseCompletionNotifier> = match &config.completion_webhook_url {
            Some(url) => Arc::new(WebhookNotifier::new(url.clone())?),
            None => Arc::new(NoopNotifier),
        };

        Ok(Self::new(
            geocoder,
            Arc::new(PgRecordStore::new(pool.clone())),
            Arc::new(PgJobStore::new(pool)),
            notifier,
            shutdown,
        ))
    }

    /// Cancel running jobs and wait (up to `grace`) for them to record
    /// their final status. Returns false if the grace period ran out.
    pub async fn drain_jobs(&self, grace: Duration) -> bool {
        self.shutdown.cancel();
        self.tasks.close();

        match tokio::time::timeout(grace, self.tasks.wait()).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(
                    remaining = self.tasks.len(),
                    "geocoding jobs still running after shutdown grace period"
                );
                false
            }
        }
    }
}
