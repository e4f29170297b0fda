// Provider Directory - Geocoding Service
//
// Background jobs that enrich location-bearing directory records (providers,
// companies, schools, job listings) with coordinates from an external
// forward-geocoding API.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
