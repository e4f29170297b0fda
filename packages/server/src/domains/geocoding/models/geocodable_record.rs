use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::collection::CollectionSpec;
use crate::common::utils::{build_query, AddressParts, Coordinates};

/// Projection of a location-bearing row, uniform across collections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct GeocodableRecord {
    pub id: Uuid,
    pub label: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl GeocodableRecord {
    pub fn needs_geocoding(&self) -> bool {
        self.latitude.is_none() || self.longitude.is_none()
    }

    pub fn address_parts(&self) -> AddressParts<'_> {
        AddressParts {
            address: self.address.as_deref(),
            city: self.city.as_deref(),
            state: self.state.as_deref(),
            postal_code: self.postal_code.as_deref(),
        }
    }

    /// Free-text geocoding query, or `None` when the row has no usable location
    pub fn geocode_query(&self) -> Option<String> {
        build_query(self.address_parts())
    }

    /// Short identifier for logs and batch error lists
    pub fn describe(&self) -> String {
        let location = [self.city.as_deref(), self.state.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", ");

        if location.is_empty() {
            self.id.to_string()
        } else {
            format!("{} ({})", self.id, location)
        }
    }

    /// Select up to `limit` rows after `after` that still need geocoding
    pub async fn find_pending(
        spec: &CollectionSpec,
        after: Option<Uuid>,
        limit: i64,
        pool: &PgPool,
    ) -> Result<Vec<Self>> {
        let records = sqlx::query_as::<_, Self>(&spec.select_pending_sql())
            .bind(after)
            .bind(limit)
            .fetch_all(pool)
            .await?;
        Ok(records)
    }

    /// Write coordinates to a single row. No other column is touched.
    pub async fn update_coordinates(
        spec: &CollectionSpec,
        id: Uuid,
        coordinates: Coordinates,
        pool: &PgPool,
    ) -> Result<()> {
        let rows = sqlx::query(&spec.update_coordinates_sql())
            .bind(coordinates.latitude)
            .bind(coordinates.longitude)
            .bind(id)
            .execute(pool)
            .await?
            .rows_affected();

        if rows == 0 {
            return Err(anyhow!("{} row {} not found", spec.table, id));
        }
        Ok(())
    }
}
