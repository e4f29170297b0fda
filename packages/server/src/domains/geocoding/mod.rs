// Batch geocoding of location-bearing directory records
pub mod actions;
pub mod models;
