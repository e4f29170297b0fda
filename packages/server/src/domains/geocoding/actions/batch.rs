//! Geocode one page of records and write results back row by row.

use std::time::Duration;

use tracing::{debug, instrument};

use crate::domains::geocoding::models::{BatchResult, CollectionSpec, GeocodableRecord};
use crate::kernel::{GeocodeError, ServerDeps};

/// Pacing and bounds for a single batch
#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    /// Pause between records, regardless of outcome
    pub record_delay: Duration,
    /// Upper bound on one geocoding call
    pub request_timeout: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            record_delay: Duration::from_millis(100),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Geocode `records` sequentially.
///
/// Record-level problems (no address, no match, provider error, write error)
/// are counted and described in the result; they never propagate.
#[instrument(skip(records, collection, options, deps), fields(collection = %collection.name(), count = records.len()))]
pub async fn process_batch(
    records: &[GeocodableRecord],
    collection: &CollectionSpec,
    options: BatchOptions,
    deps: &ServerDeps,
) -> BatchResult {
    let mut result = BatchResult::default();

    for (idx, record) in records.iter().enumerate() {
        if idx > 0 {
            tokio::time::sleep(options.record_delay).await;
        }

        match geocode_record(record, collection, options.request_timeout, deps).await {
            Ok(()) => result.record_success(),
            Err(reason) => {
                debug!(record = %record.describe(), reason = %reason, "record not geocoded");
                result.record_failure(format!("{}: {}", record.describe(), reason));
            }
        }
    }

    result
}

async fn geocode_record(
    record: &GeocodableRecord,
    collection: &CollectionSpec,
    request_timeout: Duration,
    deps: &ServerDeps,
) -> Result<(), String> {
    let query = record
        .geocode_query()
        .ok_or_else(|| "no address data".to_string())?;

    let lookup = tokio::time::timeout(request_timeout, deps.geocoder.forward(&query))
        .await
        .unwrap_or(Err(GeocodeError::Timeout));

    let coordinates = match lookup {
        Ok(Some(coordinates)) => coordinates,
        Ok(None) => return Err(format!("no match for \"{}\"", query)),
        Err(e) => return Err(e.to_string()),
    };

    deps.records
        .write_coordinates(collection, record.id, coordinates)
        .await
        .map_err(|e| format!("failed to save coordinates: {}", e))
}
