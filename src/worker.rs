//! Worker-side batch execution split across focused submodules:
//! - `batch`: the batch runner, its loop, and the summary types
//! - `bridge`: inspector handle plus the cancellation bridge task
//! - `runner`: trait seams for runners, resolvers, executors, and engines
//! - `state`: per-worker mutable context and phase timings
//! - `tests`: batch runner unit tests

pub mod batch;
pub mod bridge;
pub mod runner;
pub mod state;
