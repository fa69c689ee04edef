use crate::isolation::mocks::MockRegistry;
use crate::isolation::module_cache::ModuleCache;
use crate::runtime::cancel::CancelSignal;
use crate::runtime::config::{ResolvedConfig, RuntimeOverrides};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Wall-clock time spent in each phase of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseTimings {
    /// Runner resolution and batch setup, before the environment.
    pub prepare: Duration,
    /// Environment setup plus teardown.
    pub environment: Duration,
    /// Time spent collecting test structure without executing cases.
    pub collect: Duration,
    /// Time spent executing test cases.
    pub run: Duration,
}

pub struct WorkerStateParams {
    pub worker_id: usize,
    pub cancel: CancelSignal,
    pub retained_modules: Vec<String>,
    pub overrides: RuntimeOverrides,
}

/// Mutable per-worker context shared by the batch loop, the execution
/// engine, and the cancellation bridge.
///
/// One instance lives as long as the worker. Batch-scoped pieces (timings,
/// the teardown flag) are reset by constructing a fresh state for the next
/// batch; worker-scoped pieces (module cache, mocks) deliberately survive
/// across batches when isolation is off.
pub struct WorkerState {
    worker_id: usize,
    cancel: CancelSignal,
    current_file: Mutex<Option<PathBuf>>,
    timings: Mutex<PhaseTimings>,
    overrides: Mutex<RuntimeOverrides>,
    environment_teardown_run: AtomicBool,
    module_cache: ModuleCache,
    mocks: MockRegistry,
}

impl WorkerState {
    pub fn new(params: WorkerStateParams) -> Self {
        let WorkerStateParams {
            worker_id,
            cancel,
            retained_modules,
            overrides,
        } = params;

        Self {
            worker_id,
            cancel,
            current_file: Mutex::new(None),
            timings: Mutex::new(PhaseTimings::default()),
            overrides: Mutex::new(overrides),
            environment_teardown_run: AtomicBool::new(false),
            module_cache: ModuleCache::new(retained_modules),
            mocks: MockRegistry::new(),
        }
    }

    /// Builds a state seeded from the batch configuration.
    pub fn from_config(worker_id: usize, config: &ResolvedConfig, cancel: CancelSignal) -> Self {
        Self::new(WorkerStateParams {
            worker_id,
            cancel,
            retained_modules: config.retained_modules().to_vec(),
            overrides: RuntimeOverrides::from_config(config),
        })
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    pub fn module_cache(&self) -> &ModuleCache {
        &self.module_cache
    }

    pub fn mocks(&self) -> &MockRegistry {
        &self.mocks
    }

    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    pub fn set_current_file(&self, path: &Path) {
        *self.current_file.lock().unwrap() = Some(path.to_path_buf());
    }

    pub fn clear_current_file(&self) {
        *self.current_file.lock().unwrap() = None;
    }

    /// The file currently being executed, if any. Used to attribute crashes
    /// that bypass the normal error path.
    pub fn current_file(&self) -> Option<PathBuf> {
        self.current_file.lock().unwrap().clone()
    }

    pub fn timings(&self) -> PhaseTimings {
        *self.timings.lock().unwrap()
    }

    pub fn record_prepare(&self, elapsed: Duration) {
        self.timings.lock().unwrap().prepare = elapsed;
    }

    pub fn add_environment(&self, elapsed: Duration) {
        self.timings.lock().unwrap().environment += elapsed;
    }

    pub fn add_collect(&self, elapsed: Duration) {
        self.timings.lock().unwrap().collect += elapsed;
    }

    pub fn add_run(&self, elapsed: Duration) {
        self.timings.lock().unwrap().run += elapsed;
    }

    /// Current runtime-overridable values as last set by a test file or the
    /// always-reset step.
    pub fn overrides(&self) -> RuntimeOverrides {
        *self.overrides.lock().unwrap()
    }

    /// Applies an in-place mutation. Test files use this to tune assertion
    /// rendering or timeouts for themselves.
    pub fn update_overrides(&self, apply: impl FnOnce(&mut RuntimeOverrides)) {
        apply(&mut self.overrides.lock().unwrap());
    }

    /// Reverts every runtime override to the batch-level configuration.
    pub fn reset_overrides(&self, config: &ResolvedConfig) {
        *self.overrides.lock().unwrap() = RuntimeOverrides::from_config(config);
    }

    /// Marks the environment teardown as having run. Returns `true` on the
    /// first transition only.
    pub fn mark_environment_teardown(&self) -> bool {
        !self.environment_teardown_run.swap(true, Ordering::SeqCst)
    }

    pub fn environment_teardown_run(&self) -> bool {
        self.environment_teardown_run.load(Ordering::SeqCst)
    }
}
