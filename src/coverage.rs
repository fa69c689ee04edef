//! Precise call-count coverage: profiler-shaped samples, source
//! classification, and the per-batch collection session.

pub mod filter;
pub mod sample;
pub mod session;
