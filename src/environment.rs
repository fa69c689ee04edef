//! Execution environments: the provider registry and the setup/teardown
//! bracket every batch runs inside.

pub mod lifecycle;
pub mod registry;
