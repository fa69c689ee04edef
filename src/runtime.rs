//! Runtime glue that wires configuration, cancellation signalling, and
//! telemetry underneath the batch execution loop.

pub mod cancel;
pub mod config;
pub mod telemetry;
