// HTTP routes
pub mod geocoding;
pub mod health;

pub use geocoding::*;
pub use health::*;
