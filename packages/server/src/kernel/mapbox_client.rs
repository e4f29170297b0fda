//! Forward geocoding via the Mapbox Geocoding API.
//!
//! One GET per query, restricted to a single country and a single match.
//! There is no retry here; pacing and backoff belong to the orchestrator.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::traits::{BaseGeocoder, GeocodeError};
use crate::common::utils::Coordinates;
use crate::config::GeocodingConfig;

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    /// [longitude, latitude]
    center: Vec<f64>,
}

pub struct MapboxGeocoder {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
    country: String,
}

impl MapboxGeocoder {
    pub fn new(config: &GeocodingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent("ProviderDirectory/1.0 (geocoding jobs)")
            .build()
            .context("Failed to build geocoding HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            country: config.country.clone(),
        })
    }

    fn endpoint(&self, query: &str) -> String {
        format!(
            "{}/geocoding/v5/mapbox.places/{}.json",
            self.base_url,
            urlencoding::encode(query)
        )
    }
}

/// Parse a provider response body into the first match, if any
pub fn parse_response(body: &str) -> Result<Option<Coordinates>, GeocodeError> {
    let collection: FeatureCollection =
        serde_json::from_str(body).map_err(|e| GeocodeError::Parse(e.to_string()))?;

    let Some(feature) = collection.features.into_iter().next() else {
        return Ok(None);
    };

    let &[longitude, latitude] = feature.center.as_slice() else {
        return Err(GeocodeError::Parse(format!(
            "expected [lon, lat] center, got {} values",
            feature.center.len()
        )));
    };

    let coordinates = Coordinates::from_lon_lat(longitude, latitude);
    if !coordinates.is_valid() {
        return Err(GeocodeError::Parse(format!(
            "coordinates out of range: ({}, {})",
            latitude, longitude
        )));
    }

    Ok(Some(coordinates))
}

fn classify(error: reqwest::Error) -> GeocodeError {
    if error.is_timeout() {
        GeocodeError::Timeout
    } else {
        // The request URL carries the access token
        GeocodeError::Http(error.without_url())
    }
}

#[async_trait]
impl BaseGeocoder for MapboxGeocoder {
    async fn forward(&self, query: &str) -> Result<Option<Coordinates>, GeocodeError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(None);
        }

        debug!(query = %query, "Geocoding location");

        let response = self
            .client
            .get(self.endpoint(query))
            .query(&[
                ("access_token", self.api_token.as_str()),
                ("country", self.country.as_str()),
                ("limit", "1"),
            ])
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        let body = response.text().await.map_err(classify)?;

        if !status.is_success() {
            warn!(status = status.as_u16(), query = %query, "Geocoding provider returned an error");
            return Err(GeocodeError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        parse_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_swaps_lon_lat() {
        let body = r#"{"type":"FeatureCollection","features":[{"center":[-97.7431,30.2672]}]}"#;
        let coords = parse_response(body).unwrap().unwrap();
        assert_eq!(coords.longitude, -97.7431);
        assert_eq!(coords.latitude, 30.2672);
    }

    #[test]
    fn test_parse_empty_features_is_a_miss() {
        assert_eq!(parse_response(r#"{"features":[]}"#).unwrap(), None);
        assert_eq!(parse_response(r#"{}"#).unwrap(), None);
    }

    #[test]
    fn test_parse_rejects_malformed_center() {
        assert!(matches!(
            parse_response(r#"{"features":[{"center":[1.0]}]}"#),
            Err(GeocodeError::Parse(_))
        ));
        assert!(matches!(
            parse_response(r#"{"features":[{"center":[10.0, 120.0]}]}"#),
            Err(GeocodeError::Parse(_))
        ));
        assert!(matches!(parse_response("not json"), Err(GeocodeError::Parse(_))));
    }

    #[test]
    fn test_endpoint_percent_encodes_query() {
        let geocoder = MapboxGeocoder::new(&GeocodingConfig {
            api_token: "pk.test".to_string(),
            base_url: "https://api.mapbox.com/".to_string(),
            country: "us".to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap();

        assert_eq!(
            geocoder.endpoint("100 Congress Ave, Austin, TX"),
            "https://api.mapbox.com/geocoding/v5/mapbox.places/100%20Congress%20Ave%2C%20Austin%2C%20TX.json"
        );
    }
}
