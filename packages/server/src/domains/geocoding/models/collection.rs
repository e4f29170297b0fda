use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Location-bearing collections the geocoder is allowed to touch.
///
/// This is the allow-list: table and column names interpolated into SQL
/// only ever come from [`Collection::spec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Providers,
    Companies,
    Schools,
    JobListings,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Providers,
        Collection::Companies,
        Collection::Schools,
        Collection::JobListings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Providers => "providers",
            Collection::Companies => "companies",
            Collection::Schools => "schools",
            Collection::JobListings => "job_listings",
        }
    }

    /// Column mapping for this collection
    pub fn spec(self) -> CollectionSpec {
        match self {
            Collection::Providers => CollectionSpec {
                collection: self,
                table: "providers",
                label_column: Some("name"),
                address_column: Some("address"),
                city_column: "city",
                state_column: "state",
                postal_code_column: Some("zip_code"),
                require_city: true,
                reprocess_all: false,
            },
            Collection::Companies => CollectionSpec {
                collection: self,
                table: "companies",
                label_column: Some("name"),
                address_column: Some("address"),
                city_column: "city",
                state_column: "state",
                postal_code_column: Some("zip_code"),
                require_city: false,
                reprocess_all: false,
            },
            // No street address column; city/state/zip only
            Collection::Schools => CollectionSpec {
                collection: self,
                table: "schools",
                label_column: Some("name"),
                address_column: None,
                city_column: "city",
                state_column: "state",
                postal_code_column: Some("zip_code"),
                require_city: true,
                reprocess_all: false,
            },
            Collection::JobListings => CollectionSpec {
                collection: self,
                table: "job_listings",
                label_column: Some("title"),
                address_column: None,
                city_column: "city",
                state_column: "state",
                postal_code_column: None,
                require_city: true,
                reprocess_all: false,
            },
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Collection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "providers" => Ok(Collection::Providers),
            "companies" => Ok(Collection::Companies),
            "schools" => Ok(Collection::Schools),
            "job_listings" => Ok(Collection::JobListings),
            _ => Err(anyhow::anyhow!("Unknown collection: {}", s)),
        }
    }
}

/// Per-collection field projection and selection predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSpec {
    pub collection: Collection,
    pub table: &'static str,
    pub label_column: Option<&'static str>,
    pub address_column: Option<&'static str>,
    pub city_column: &'static str,
    pub state_column: &'static str,
    pub postal_code_column: Option<&'static str>,
    /// Skip rows without a usable city
    pub require_city: bool,
    /// Select every row, not only rows missing coordinates
    pub reprocess_all: bool,
}

impl CollectionSpec {
    pub fn name(&self) -> &'static str {
        self.collection.as_str()
    }

    pub fn with_reprocess_all(mut self, reprocess_all: bool) -> Self {
        self.reprocess_all = reprocess_all;
        self
    }

    /// Keyset-paginated selection of rows still needing coordinates.
    ///
    /// Binds: `$1` cursor (uuid, nullable), `$2` limit.
    pub fn select_pending_sql(&self) -> String {
        let label = column_or_null(self.label_column);
        let address = column_or_null(self.address_column);
        let postal_code = column_or_null(self.postal_code_column);

        let mut sql = format!(
            "SELECT id, {label} AS label, {address} AS address, {city}::text AS city, \
             {state}::text AS state, {postal_code} AS postal_code, \
             latitude::float8 AS latitude, longitude::float8 AS longitude \
             FROM {table} WHERE ($1::uuid IS NULL OR id > $1)",
            city = self.city_column,
            state = self.state_column,
            table = self.table,
        );

        if !self.reprocess_all {
            sql.push_str(" AND (latitude IS NULL OR longitude IS NULL)");
        }
        if self.require_city {
            sql.push_str(&format!(
                " AND {city} IS NOT NULL AND {city} <> ''",
                city = self.city_column
            ));
        }

        sql.push_str(" ORDER BY id LIMIT $2");
        sql
    }

    /// Coordinate-only write-back. Binds: `$1` latitude, `$2` longitude, `$3` id.
    pub fn update_coordinates_sql(&self) -> String {
        format!(
            "UPDATE {} SET latitude = $1, longitude = $2 WHERE id = $3",
            self.table
        )
    }
}

fn column_or_null(column: Option<&str>) -> String {
    match column {
        Some(column) => format!("{}::text", column),
        None => "NULL::text".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_round_trips_through_str() {
        for collection in Collection::ALL {
            let parsed: Collection = collection.as_str().parse().unwrap();
            assert_eq!(parsed, collection);
        }
        assert!("members".parse::<Collection>().is_err());
    }

    #[test]
    fn test_select_filters_missing_coordinates_by_default() {
        let sql = Collection::Providers.spec().select_pending_sql();
        assert!(sql.contains("FROM providers"));
        assert!(sql.contains("(latitude IS NULL OR longitude IS NULL)"));
        assert!(sql.contains("city IS NOT NULL AND city <> ''"));
        assert!(sql.contains("address::text AS address"));
        // Coordinate columns may be NUMERIC in the directory schema
        assert!(sql.contains("latitude::float8 AS latitude, longitude::float8 AS longitude"));
        assert!(sql.ends_with("ORDER BY id LIMIT $2"));
    }

    #[test]
    fn test_select_without_address_column() {
        let sql = Collection::Schools.spec().select_pending_sql();
        assert!(sql.contains("NULL::text AS address"));
        assert!(sql.contains("zip_code::text AS postal_code"));

        let sql = Collection::JobListings.spec().select_pending_sql();
        assert!(sql.contains("title::text AS label"));
        assert!(sql.contains("NULL::text AS postal_code"));
    }

    #[test]
    fn test_reprocess_all_drops_coordinate_predicate() {
        let sql = Collection::Companies
            .spec()
            .with_reprocess_all(true)
            .select_pending_sql();
        assert!(!sql.contains("latitude IS NULL"));
        // Companies are not narrowed by city
        assert!(!sql.contains("city <> ''"));
    }

    #[test]
    fn test_update_touches_only_coordinates() {
        let sql = Collection::JobListings.spec().update_coordinates_sql();
        assert_eq!(
            sql,
            "UPDATE job_listings SET latitude = $1, longitude = $2 WHERE id = $3"
        );
    }
}
