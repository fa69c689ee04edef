use crate::coverage::filter::filter_report;
use crate::coverage::sample::CoverageReport;
use crate::runtime::config::CoverageOptions;
use anyhow::Error as AnyError;
use core::future::Future;
use core::pin::Pin;
use std::sync::{Arc, Mutex};

pub type CoverageFuture<'a> = Pin<Box<dyn Future<Output = Result<(), CoverageError>> + Send + 'a>>;
pub type CoverageTakeFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CoverageReport, CoverageError>> + Send + 'a>>;

/// Enumerates the operations of the [`CoverageBackend`] hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverageStage {
    Start,
    Take,
    Stop,
}

/// Error surfaced by coverage backend hooks.
#[derive(Debug)]
pub struct CoverageError {
    stage: CoverageStage,
    source: AnyError,
}

impl CoverageError {
    pub fn new(stage: CoverageStage, source: AnyError) -> Self {
        Self { stage, source }
    }

    pub fn stage(&self) -> CoverageStage {
        self.stage
    }

    pub fn into_source(self) -> AnyError {
        self.source
    }
}

impl core::fmt::Display for CoverageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?} coverage error: {}", self.stage, self.source)
    }
}

impl std::error::Error for CoverageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Trait implemented by the profiler integration that produces raw samples.
pub trait CoverageBackend: Send + Sync + 'static {
    /// Begins precise call-count collection.
    fn start(&self) -> CoverageFuture<'_>;

    /// Returns the samples accumulated so far without stopping collection.
    fn take(&self) -> CoverageTakeFuture<'_>;

    /// Stops collection and releases the underlying profiler session.
    fn stop(&self) -> CoverageFuture<'_>;

    /// Whether the host can produce precise per-call counts at all. Degraded
    /// hosts return `false` and the session serves empty reports instead of
    /// failing.
    fn supports_precise_counts(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Idle,
    Active,
    Stopped,
}

/// Single-bracket coverage session wrapped around one batch.
///
/// The execution loop starts it exactly once before the first file and stops
/// it after the last; the surrounding harness may call [`CoverageSession::take`]
/// any number of times while the bracket is open. A fresh batch gets a fresh
/// session.
pub struct CoverageSession {
    backend: Arc<dyn CoverageBackend>,
    options: CoverageOptions,
    state: Mutex<SessionState>,
}

impl CoverageSession {
    pub fn new(backend: Arc<dyn CoverageBackend>, options: CoverageOptions) -> Self {
        Self {
            backend,
            options,
            state: Mutex::new(SessionState::Idle),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// Starts collection. Starting an already-active or already-stopped
    /// session is a caller error.
    pub async fn start(&self) -> Result<(), CoverageError> {
        if !self.options.enabled {
            tracing::debug!("coverage collection disabled; session start is a no-op");
            return Ok(());
        }

        match self.state() {
            SessionState::Idle => {}
            SessionState::Active => {
                return Err(CoverageError::new(
                    CoverageStage::Start,
                    anyhow::anyhow!("coverage session is already active"),
                ));
            }
            SessionState::Stopped => {
                return Err(CoverageError::new(
                    CoverageStage::Start,
                    anyhow::anyhow!("coverage session was already stopped; sessions are single-bracket"),
                ));
            }
        }

        if self.backend.supports_precise_counts() {
            self.backend.start().await?;
        } else {
            tracing::warn!("coverage backend lacks precise call counts; serving empty reports");
        }

        self.set_state(SessionState::Active);
        tracing::debug!("coverage session started");
        Ok(())
    }

    /// Returns the filtered samples collected so far. Outside an active
    /// bracket, or on a degraded backend, this resolves to an empty report.
    pub async fn take(&self) -> Result<CoverageReport, CoverageError> {
        if !self.options.enabled || self.state() != SessionState::Active {
            return Ok(CoverageReport::default());
        }
        if !self.backend.supports_precise_counts() {
            return Ok(CoverageReport::default());
        }

        let raw = self.backend.take().await?;
        let total = raw.len();
        let filtered = filter_report(raw, &self.options.dependency_dirs);
        tracing::debug!(
            kept = filtered.len(),
            dropped = total - filtered.len(),
            "coverage snapshot taken"
        );
        Ok(filtered)
    }

    /// Stops collection. Best-effort cleanup: calling with no active
    /// collection is a no-op, and a backend failure still leaves the session
    /// stopped so a repeated call cannot fail.
    pub async fn stop(&self) -> Result<(), CoverageError> {
        match self.state() {
            SessionState::Active => {}
            SessionState::Idle | SessionState::Stopped => {
                tracing::debug!("coverage session stop with no active collection");
                return Ok(());
            }
        }

        self.set_state(SessionState::Stopped);
        if self.options.enabled && self.backend.supports_precise_counts() {
            self.backend.stop().await?;
        }
        tracing::debug!("coverage session stopped");
        Ok(())
    }

    fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, next: SessionState) {
        *self.state.lock().unwrap() = next;
    }
}
