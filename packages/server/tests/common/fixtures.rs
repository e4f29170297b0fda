//! Test fixtures for creating rows in the location-bearing tables.

use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

/// Insert a provider without coordinates
pub async fn create_test_provider(
    pool: &PgPool,
    name: &str,
    address: Option<&str>,
    city: Option<&str>,
    state: Option<&str>,
) -> Result<Uuid> {
    let id = Uuid::now_v7();
    sqlx::query(
        "INSERT INTO providers (id, name, address, city, state, zip_code) \
         VALUES ($1, $2, $3, $4, $5, NULL)",
    )
    .bind(id)
    .bind(name)
    .bind(address)
    .bind(city)
    .bind(state)
    .execute(pool)
    .await?;
    Ok(id)
}

/// Insert a provider that already has coordinates
pub async fn create_geocoded_provider(
    pool: &PgPool,
    name: &str,
    city: &str,
    latitude: f64,
    longitude: f64,
) -> Result<Uuid> {
    let id = Uuid::now_v7();
    sqlx::query(
        "INSERT INTO providers (id, name, city, state, latitude, longitude) \
         VALUES ($1, $2, $3, 'TX', $4, $5)",
    )
    .bind(id)
    .bind(name)
    .bind(city)
    .bind(latitude)
    .bind(longitude)
    .execute(pool)
    .await?;
    Ok(id)
}

pub async fn create_test_school(pool: &PgPool, name: &str, city: Option<&str>) -> Result<Uuid> {
    let id = Uuid::now_v7();
    sqlx::query("INSERT INTO schools (id, name, city, state) VALUES ($1, $2, $3, 'TX')")
        .bind(id)
        .bind(name)
        .bind(city)
        .execute(pool)
        .await?;
    Ok(id)
}

/// Name, coordinates and `updated_at` of a provider
pub async fn provider_snapshot(
    pool: &PgPool,
    id: Uuid,
) -> Result<(String, Option<f64>, Option<f64>, chrono::DateTime<chrono::Utc>)> {
    let row = sqlx::query_as(
        "SELECT name, latitude, longitude, updated_at FROM providers WHERE id = $1",
    )
    .bind(id)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Insert a job listing; its coordinate columns are NUMERIC
pub async fn create_test_job_listing(
    pool: &PgPool,
    title: &str,
    city: Option<&str>,
    coordinates: Option<(f64, f64)>,
) -> Result<Uuid> {
    let id = Uuid::now_v7();
    sqlx::query(
        "INSERT INTO job_listings (id, title, city, state, latitude, longitude) \
         VALUES ($1, $2, $3, 'TX', $4, $5)",
    )
    .bind(id)
    .bind(title)
    .bind(city)
    .bind(coordinates.map(|(lat, _)| lat))
    .bind(coordinates.map(|(_, lon)| lon))
    .execute(pool)
    .await?;
    Ok(id)
}
