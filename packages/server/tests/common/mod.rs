// Common test utilities

pub mod fixtures;
pub mod harness;
pub mod stub_provider;

#[allow(unused_imports)]
pub use fixtures::*;
#[allow(unused_imports)]
pub use harness::*;
#[allow(unused_imports)]
pub use stub_provider::*;
