pub mod geocoding;

pub use geocoding::*;
