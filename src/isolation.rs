//! Per-file isolation primitives: the module cache, the mock registry, and
//! the policy that decides when resets apply.

pub mod mocks;
pub mod module_cache;
pub mod policy;
