// Business domains
pub mod geocoding;
