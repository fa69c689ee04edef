use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Lightweight rolling counters describing what a worker did with its batch.
///
/// Counters only ever grow; diagnostics read a [`TelemetrySnapshot`] at batch
/// end rather than sampling individual fields.
#[derive(Default, Debug)]
pub struct Telemetry {
    files_started: AtomicU64,
    files_completed: AtomicU64,
    files_failed: AtomicU64,
    isolation_resets: AtomicU64,
    post_file_resets: AtomicU64,
    coverage_snapshots: AtomicU64,
    batches_interrupted: AtomicU64,
}

impl Telemetry {
    pub fn record_file_started(&self) {
        self.files_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_file_completed(&self) {
        self.files_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_file_failed(&self) {
        self.files_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_isolation_reset(&self) {
        self.isolation_resets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_post_file_reset(&self) {
        self.post_file_resets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_coverage_snapshot(&self) {
        self.coverage_snapshots.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch_interrupted(&self) {
        self.batches_interrupted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn files_started(&self) -> u64 {
        self.files_started.load(Ordering::Relaxed)
    }

    pub fn files_completed(&self) -> u64 {
        self.files_completed.load(Ordering::Relaxed)
    }

    pub fn files_failed(&self) -> u64 {
        self.files_failed.load(Ordering::Relaxed)
    }

    pub fn isolation_resets(&self) -> u64 {
        self.isolation_resets.load(Ordering::Relaxed)
    }

    pub fn post_file_resets(&self) -> u64 {
        self.post_file_resets.load(Ordering::Relaxed)
    }

    pub fn coverage_snapshots(&self) -> u64 {
        self.coverage_snapshots.load(Ordering::Relaxed)
    }

    pub fn batches_interrupted(&self) -> u64 {
        self.batches_interrupted.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            files_started: self.files_started(),
            files_completed: self.files_completed(),
            files_failed: self.files_failed(),
            isolation_resets: self.isolation_resets(),
            post_file_resets: self.post_file_resets(),
            coverage_snapshots: self.coverage_snapshots(),
            batches_interrupted: self.batches_interrupted(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub files_started: u64,
    pub files_completed: u64,
    pub files_failed: u64,
    pub isolation_resets: u64,
    pub post_file_resets: u64,
    pub coverage_snapshots: u64,
    pub batches_interrupted: u64,
}
