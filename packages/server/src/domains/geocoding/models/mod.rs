pub mod batch_result;
pub mod collection;
pub mod geocodable_record;
pub mod geocode_job;

pub use batch_result::*;
pub use collection::*;
pub use geocodable_record::*;
pub use geocode_job::*;
