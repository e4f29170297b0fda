use serde::{Deserialize, Serialize};

/// Decimal places kept when storing coordinates (~0.1m)
pub const COORDINATE_PRECISION: i32 = 6;

/// Values some imports use in place of a missing fragment
const PLACEHOLDER_FRAGMENTS: &[&str] = &["N/A", "NA", "NONE", "NULL", "UNKNOWN", "-"];

/// A resolved coordinate pair, always in (latitude, longitude) order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Build from a provider `center` pair, which is ordered [longitude, latitude]
    pub fn from_lon_lat(longitude: f64, latitude: f64) -> Self {
        let (latitude, longitude) = round_coords(latitude, longitude);
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Round coordinates to a stable storage precision
///
/// # Example
/// ```
/// use server_core::common::utils::round_coords;
///
/// let (lat, lng) = round_coords(30.26720049, -97.74310051);
/// assert_eq!(lat, 30.2672);
/// assert_eq!(lng, -97.7431);
/// ```
pub fn round_coords(lat: f64, lng: f64) -> (f64, f64) {
    let factor = 10f64.powi(COORDINATE_PRECISION);
    ((lat * factor).round() / factor, (lng * factor).round() / factor)
}

/// Address fragments available on a record
#[derive(Debug, Clone, Copy, Default)]
pub struct AddressParts<'a> {
    pub address: Option<&'a str>,
    pub city: Option<&'a str>,
    pub state: Option<&'a str>,
    pub postal_code: Option<&'a str>,
}

/// Trim, collapse internal whitespace and drop placeholder values
pub fn normalize_fragment(fragment: Option<&str>) -> Option<String> {
    let collapsed = fragment?.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }

    let upper = collapsed.to_uppercase();
    if PLACEHOLDER_FRAGMENTS.iter().any(|p| upper == *p) {
        return None;
    }

    Some(collapsed)
}

/// Build the free-text query for a record.
///
/// A street address wins when present (with whatever city/state/zip exist),
/// then city + state, then state alone. A postal code on its own is not
/// enough to form a query. Returns `None` when nothing usable remains.
pub fn build_query(parts: AddressParts<'_>) -> Option<String> {
    let address = normalize_fragment(parts.address);
    let city = normalize_fragment(parts.city);
    let state = normalize_fragment(parts.state);
    let postal_code = normalize_fragment(parts.postal_code);

    let fragments: Vec<String> = if address.is_some() {
        [address, city, state, postal_code].into_iter().flatten().collect()
    } else if city.is_some() {
        [city, state, postal_code].into_iter().flatten().collect()
    } else if let Some(state) = state {
        vec![state]
    } else {
        return None;
    };

    Some(fragments.join(", "))
}
