//! Postgres record and job stores against a real database.
//!
//! Requires Docker: `cargo test --test pg_store_tests -- --ignored`

mod common;

use common::{
    create_geocoded_provider, create_test_job_listing, create_test_provider, create_test_school,
    provider_snapshot, TestHarness,
};
use server_core::common::utils::Coordinates;
use server_core::domains::geocoding::models::{
    BatchResult, Collection, GeocodeJob, JobParams, JobProgress, JobStatus, JobSummary, JobType,
    MANUAL_RESET_ERROR,
};
use server_core::kernel::{BaseJobStore, BaseRecordStore, CreateJobOutcome, PgJobStore, PgRecordStore};
use test_context::test_context;

// =============================================================================
// Record store
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn select_pending_pages_by_id_and_skips_geocoded_rows(ctx: &TestHarness) {
    let pool = &ctx.db_pool;
    let store = PgRecordStore::new(pool.clone());
    let spec = Collection::Providers.spec();

    let a = create_test_provider(pool, "A", Some("1 Main St"), Some("Austin"), Some("TX")).await.unwrap();
    let b = create_test_provider(pool, "B", None, Some("Dallas"), Some("TX")).await.unwrap();
    create_geocoded_provider(pool, "Done", "Houston", 29.7604, -95.3698).await.unwrap();
    // Providers require a city
    create_test_provider(pool, "No city", Some("9 Elm St"), None, Some("TX")).await.unwrap();
    let c = create_test_provider(pool, "C", None, Some("El Paso"), Some("TX")).await.unwrap();

    let first = store.select_pending(&spec, None, 2).await.unwrap();
    assert_eq!(first.iter().map(|r| r.id).collect::<Vec<_>>(), vec![a, b]);
    assert_eq!(first[0].label.as_deref(), Some("A"));
    assert_eq!(first[0].geocode_query().as_deref(), Some("1 Main St, Austin, TX"));

    let second = store.select_pending(&spec, Some(b), 2).await.unwrap();
    assert_eq!(second.iter().map(|r| r.id).collect::<Vec<_>>(), vec![c]);

    let done = store.select_pending(&spec, Some(c), 2).await.unwrap();
    assert!(done.is_empty());

    let everything = store
        .select_pending(&spec.clone().with_reprocess_all(true), None, 10)
        .await
        .unwrap();
    assert_eq!(everything.len(), 4);
}

#[test_context(TestHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn collection_without_address_column_projects_null(ctx: &TestHarness) {
    let pool = &ctx.db_pool;
    let store = PgRecordStore::new(pool.clone());

    let id = create_test_school(pool, "Central PT Program", Some("Austin")).await.unwrap();
    create_test_school(pool, "Unknown City", None).await.unwrap();

    let rows = store
        .select_pending(&Collection::Schools.spec(), None, 10)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, id);
    assert_eq!(rows[0].address, None);
    assert_eq!(rows[0].geocode_query().as_deref(), Some("Austin, TX"));
}

#[test_context(TestHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn write_coordinates_touches_only_coordinates(ctx: &TestHarness) {
    let pool = &ctx.db_pool;
    let store = PgRecordStore::new(pool.clone());
    let spec = Collection::Providers.spec();

    let id = create_test_provider(pool, "Core Physio", None, Some("Austin"), Some("TX")).await.unwrap();
    let (name_before, _, _, updated_before) = provider_snapshot(pool, id).await.unwrap();

    store
        .write_coordinates(&spec, id, Coordinates::from_lon_lat(-97.7431, 30.2672))
        .await
        .unwrap();

    let (name, latitude, longitude, updated_at) = provider_snapshot(pool, id).await.unwrap();
    assert_eq!(name, name_before);
    assert_eq!(updated_at, updated_before);
    assert_eq!(latitude, Some(30.2672));
    assert_eq!(longitude, Some(-97.7431));

    let missing = store
        .write_coordinates(&spec, uuid::Uuid::now_v7(), Coordinates::from_lon_lat(0.0, 0.0))
        .await;
    assert!(missing.is_err());
}

#[test_context(TestHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn numeric_coordinate_columns_are_selected_and_written(ctx: &TestHarness) {
    let pool = &ctx.db_pool;
    let store = PgRecordStore::new(pool.clone());
    let spec = Collection::JobListings.spec();

    let pending = create_test_job_listing(pool, "Outpatient PT", Some("Austin"), None).await.unwrap();
    let placed = create_test_job_listing(pool, "Home Health PT", Some("Dallas"), Some((32.7767, -96.797)))
        .await
        .unwrap();

    let rows = store.select_pending(&spec, None, 10).await.unwrap();
    assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![pending]);
    assert_eq!(rows[0].latitude, None);

    // Reprocessing decodes the NUMERIC values that are already there
    let all = store
        .select_pending(&spec.clone().with_reprocess_all(true), None, 10)
        .await
        .unwrap();
    let existing = all.iter().find(|r| r.id == placed).unwrap();
    assert_eq!(existing.latitude, Some(32.7767));
    assert_eq!(existing.longitude, Some(-96.797));

    store
        .write_coordinates(&spec, pending, Coordinates::from_lon_lat(-97.7431, 30.2672))
        .await
        .unwrap();
    assert!(store.select_pending(&spec, None, 10).await.unwrap().is_empty());

    let (latitude, longitude): (f64, f64) = sqlx::query_as(
        "SELECT latitude::float8, longitude::float8 FROM job_listings WHERE id = $1",
    )
    .bind(pending)
    .fetch_one(pool)
    .await
    .unwrap();
    assert_eq!((latitude, longitude), (30.2672, -97.7431));
}

// =============================================================================
// Job store
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn only_one_processing_job_per_type(ctx: &TestHarness) {
    let jobs = PgJobStore::new(ctx.db_pool.clone());
    let params = JobParams::default();

    let first = jobs.create(JobType::Providers, &params).await.unwrap();
    let CreateJobOutcome::Created(created) = first else {
        panic!("expected a new job");
    };
    assert_eq!(created.status, JobStatus::Processing);

    let second = jobs.create(JobType::Providers, &params).await.unwrap();
    assert!(matches!(second, CreateJobOutcome::AlreadyRunning(ref j) if j.id == created.id));

    // The unique index also stops inserts that skip the pre-check
    let racing = GeocodeJob::new_processing(JobType::Providers, params.clone());
    assert!(racing.insert_processing(&ctx.db_pool).await.unwrap().is_none());

    let other = jobs.create(JobType::Schools, &params).await.unwrap();
    assert!(matches!(other, CreateJobOutcome::Created(_)));
}

#[test_context(TestHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn terminal_jobs_are_never_rewritten(ctx: &TestHarness) {
    let jobs = PgJobStore::new(ctx.db_pool.clone());
    let job = jobs
        .create(JobType::Companies, &JobParams::default())
        .await
        .unwrap()
        .job()
        .clone();

    let mut progress = JobProgress::default();
    progress.apply_batch(
        "companies",
        &BatchResult {
            processed: 10,
            successful: 6,
            failed: 4,
            errors: vec![],
        },
    );
    jobs.record_progress(job.id, &progress).await.unwrap();

    let summary = JobSummary::from_progress(&progress, "done");
    jobs.mark_completed(job.id, &progress, &summary).await.unwrap();

    // Late writes are ignored
    jobs.mark_failed(job.id, "late failure", &progress, &summary)
        .await
        .unwrap();
    jobs.record_progress(job.id, &JobProgress::default()).await.unwrap();

    let stored = jobs.find_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert!(stored.error.is_none());
    assert!(stored.completed_at.is_some());
    assert_eq!(stored.progress().unwrap().successful, 6);
    assert_eq!(stored.summary().unwrap().message, "done");

    // A new run of the same type may start once the old one is terminal
    let next = jobs.create(JobType::Companies, &JobParams::default()).await.unwrap();
    assert!(matches!(next, CreateJobOutcome::Created(_)));
}

#[test_context(TestHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn reset_forces_processing_rows_to_failed(ctx: &TestHarness) {
    let jobs = PgJobStore::new(ctx.db_pool.clone());
    let stuck = jobs
        .create(JobType::Comprehensive, &JobParams::default())
        .await
        .unwrap()
        .job()
        .id;

    assert_eq!(jobs.reset_processing(JobType::Comprehensive).await.unwrap(), 1);
    assert_eq!(jobs.reset_processing(JobType::Comprehensive).await.unwrap(), 0);

    let job = jobs.find_by_id(stuck).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some(MANUAL_RESET_ERROR));
    assert!(jobs.find_processing(JobType::Comprehensive).await.unwrap().is_none());

    let recent = jobs.list_recent(10).await.unwrap();
    assert_eq!(recent.len(), 1);
}
