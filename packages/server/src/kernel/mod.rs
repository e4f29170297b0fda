//! Kernel module - server infrastructure and dependencies.

pub mod deps;
pub mod mapbox_client;
pub mod notifier;
pub mod pg_stores;
pub mod scheduled_tasks;
pub mod test_dependencies;
pub mod traits;

pub use deps::ServerDeps;
pub use mapbox_client::MapboxGeocoder;
pub use notifier::{NoopNotifier, WebhookNotifier};
pub use pg_stores::{PgJobStore, PgRecordStore};
pub use test_dependencies::TestDependencies;
pub use traits::*;
