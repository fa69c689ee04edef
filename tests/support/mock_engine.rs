use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use futures::future::BoxFuture;
use testrig::{
    ActiveEnvironment, BatchRunner, BatchRunnerParams, CancelReason, CancelSignal,
    CancelableRunner, CaseEngine, CoverageBackend, CoverageError, CoverageFuture, CoverageReport,
    CoverageSession, CoverageStage, CoverageTakeFuture, EngineFuture, EnvironmentOptions,
    EnvironmentProvider, EnvironmentRegistry, ExecutorFuture, FixedRunnerResolver,
    InspectorBridge, InspectorHandle, ModuleCache, ModuleExecutor, ResolvedConfig,
    ResolvedEnvironment, RunMode, ScriptCoverage, Telemetry, TestRunner, WorkerState,
};
use tokio::time::sleep;

/// Ordered record of the externally visible steps a batch makes. Every fake
/// in this module appends to the same log so tests can assert bracketing.
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<String>>,
}

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

pub fn sample_report() -> CoverageReport {
    CoverageReport::new(vec![
        ScriptCoverage::whole_script("10", "file:///proj/src/math.ts", 3),
        ScriptCoverage::whole_script("11", "file:///proj/node_modules/lodash/index.js", 9),
        ScriptCoverage::whole_script("12", "https://cdn.example.com/polyfill.js", 1),
    ])
}

/// Coverage backend with scripted responses and failure injection.
pub struct ScriptedBackend {
    events: Arc<EventLog>,
    pub started: AtomicU64,
    pub stopped: AtomicU64,
    pub takes: AtomicU64,
    precise: AtomicBool,
    fail_start: AtomicBool,
    fail_stop: AtomicBool,
    report: Mutex<CoverageReport>,
}

impl ScriptedBackend {
    pub fn new(events: Arc<EventLog>) -> Self {
        Self {
            events,
            started: AtomicU64::new(0),
            stopped: AtomicU64::new(0),
            takes: AtomicU64::new(0),
            precise: AtomicBool::new(true),
            fail_start: AtomicBool::new(false),
            fail_stop: AtomicBool::new(false),
            report: Mutex::new(sample_report()),
        }
    }

    /// Makes the backend report that precise call counts are unavailable.
    pub fn degrade(&self) {
        self.precise.store(false, Ordering::SeqCst);
    }

    pub fn set_fail_start(&self) {
        self.fail_start.store(true, Ordering::SeqCst);
    }

    pub fn set_fail_stop(&self) {
        self.fail_stop.store(true, Ordering::SeqCst);
    }

    pub fn set_report(&self, report: CoverageReport) {
        *self.report.lock().unwrap() = report;
    }
}

impl CoverageBackend for ScriptedBackend {
    fn start(&self) -> CoverageFuture<'_> {
        Box::pin(async {
            if self.fail_start.load(Ordering::SeqCst) {
                return Err(CoverageError::new(
                    CoverageStage::Start,
                    anyhow!("profiler refused to attach"),
                ));
            }
            self.started.fetch_add(1, Ordering::SeqCst);
            self.events.push("coverage-start");
            Ok(())
        })
    }

    fn take(&self) -> CoverageTakeFuture<'_> {
        Box::pin(async {
            self.takes.fetch_add(1, Ordering::SeqCst);
            self.events.push("coverage-take");
            Ok(self.report.lock().unwrap().clone())
        })
    }

    fn stop(&self) -> CoverageFuture<'_> {
        Box::pin(async {
            self.stopped.fetch_add(1, Ordering::SeqCst);
            self.events.push("coverage-stop");
            if self.fail_stop.load(Ordering::SeqCst) {
                return Err(CoverageError::new(
                    CoverageStage::Stop,
                    anyhow!("profiler session already gone"),
                ));
            }
            Ok(())
        })
    }

    fn supports_precise_counts(&self) -> bool {
        self.precise.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct ProbeStats {
    pub setups: AtomicU64,
    pub teardowns: AtomicU64,
}

/// Environment provider that records lifecycle traffic and can be told to
/// fail either hook.
pub struct ProbeEnvironment {
    events: Arc<EventLog>,
    stats: Arc<ProbeStats>,
    fail_setup: AtomicBool,
    fail_teardown: AtomicBool,
    seen_options: Mutex<Option<EnvironmentOptions>>,
}

impl ProbeEnvironment {
    pub fn new(events: Arc<EventLog>) -> Self {
        Self {
            events,
            stats: Arc::new(ProbeStats::default()),
            fail_setup: AtomicBool::new(false),
            fail_teardown: AtomicBool::new(false),
            seen_options: Mutex::new(None),
        }
    }

    pub fn stats(&self) -> Arc<ProbeStats> {
        self.stats.clone()
    }

    pub fn set_fail_setup(&self) {
        self.fail_setup.store(true, Ordering::SeqCst);
    }

    pub fn set_fail_teardown(&self) {
        self.fail_teardown.store(true, Ordering::SeqCst);
    }

    pub fn seen_options(&self) -> Option<EnvironmentOptions> {
        self.seen_options.lock().unwrap().clone()
    }
}

impl EnvironmentProvider for ProbeEnvironment {
    fn name(&self) -> &str {
        "probe"
    }

    fn setup(
        &self,
        options: EnvironmentOptions,
    ) -> BoxFuture<'_, Result<Box<dyn ActiveEnvironment>>> {
        Box::pin(async move {
            sleep(Duration::from_millis(5)).await;
            *self.seen_options.lock().unwrap() = Some(options);
            if self.fail_setup.load(Ordering::SeqCst) {
                bail!("probe environment refused to start");
            }
            self.stats.setups.fetch_add(1, Ordering::SeqCst);
            self.events.push("environment-setup");
            Ok(Box::new(ProbeActive {
                events: self.events.clone(),
                stats: self.stats.clone(),
                fail_teardown: self.fail_teardown.load(Ordering::SeqCst),
            }) as Box<dyn ActiveEnvironment>)
        })
    }
}

struct ProbeActive {
    events: Arc<EventLog>,
    stats: Arc<ProbeStats>,
    fail_teardown: bool,
}

impl ActiveEnvironment for ProbeActive {
    fn teardown(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.stats.teardowns.fetch_add(1, Ordering::SeqCst);
            self.events.push("environment-teardown");
            if self.fail_teardown {
                bail!("probe environment stuck on teardown");
            }
            Ok(())
        })
    }
}

/// Two-flag gate the engine can park on so a test controls when a file
/// finishes.
#[derive(Default)]
pub struct Gate {
    entered: AtomicBool,
    released: AtomicBool,
}

impl Gate {
    pub fn entered(&self) -> bool {
        self.entered.load(Ordering::SeqCst)
    }

    pub fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }

    pub async fn pass(&self) {
        self.entered.store(true, Ordering::SeqCst);
        while !self.released.load(Ordering::SeqCst) {
            sleep(Duration::from_millis(5)).await;
        }
    }
}

/// Everything the engine saw at the moment a file started.
#[derive(Debug, Clone)]
pub struct FileObservation {
    pub path: PathBuf,
    pub mode: RunMode,
    pub coverage_active: bool,
    pub cached_modules: Vec<String>,
    pub installed_mocks: usize,
    pub active_mocks: usize,
    pub timeout_override: Duration,
}

/// Case engine that records per-file observations, loads modules through the
/// executor, installs one mock per file, and stretches the timeout override
/// so reset behavior is observable from the outside.
pub struct RecordingEngine {
    coverage: Arc<CoverageSession>,
    events: Arc<EventLog>,
    observations: Mutex<Vec<FileObservation>>,
    fail_on: Mutex<Option<PathBuf>>,
    cancel_after: Mutex<Option<(PathBuf, CancelSignal, CancelReason)>>,
    gate: Mutex<Option<(PathBuf, Arc<Gate>)>>,
    take_mid_run: AtomicBool,
    taken: Mutex<Vec<CoverageReport>>,
}

impl RecordingEngine {
    pub fn new(coverage: Arc<CoverageSession>, events: Arc<EventLog>) -> Self {
        Self {
            coverage,
            events,
            observations: Mutex::new(Vec::new()),
            fail_on: Mutex::new(None),
            cancel_after: Mutex::new(None),
            gate: Mutex::new(None),
            take_mid_run: AtomicBool::new(false),
            taken: Mutex::new(Vec::new()),
        }
    }

    pub fn observations(&self) -> Vec<FileObservation> {
        self.observations.lock().unwrap().clone()
    }

    pub fn set_fail_on(&self, path: PathBuf) {
        *self.fail_on.lock().unwrap() = Some(path);
    }

    pub fn set_cancel_after(&self, path: PathBuf, signal: CancelSignal, reason: CancelReason) {
        *self.cancel_after.lock().unwrap() = Some((path, signal, reason));
    }

    /// Parks the engine on `path` until the returned gate is released.
    pub fn gate_on(&self, path: PathBuf) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *self.gate.lock().unwrap() = Some((path, gate.clone()));
        gate
    }

    pub fn enable_mid_run_take(&self) {
        self.take_mid_run.store(true, Ordering::SeqCst);
    }

    pub fn taken_reports(&self) -> Vec<CoverageReport> {
        self.taken.lock().unwrap().clone()
    }

    async fn observe(
        &self,
        mode: RunMode,
        files: &[PathBuf],
        executor: &dyn ModuleExecutor,
        state: &WorkerState,
    ) -> Result<()> {
        let file = files.first().context("engine invoked with no files")?;
        self.events.push("file-run");
        self.observations.lock().unwrap().push(FileObservation {
            path: file.clone(),
            mode,
            coverage_active: self.coverage.is_active(),
            cached_modules: state.module_cache().specifiers(),
            installed_mocks: state.mocks().installed_count(),
            active_mocks: state.mocks().active_count(),
            timeout_override: state.overrides().test_timeout,
        });

        sleep(Duration::from_millis(1)).await;
        executor.load(file, state.module_cache()).await?;

        let target = format!("mock:{}", file.display());
        state.mocks().install(target.as_str());
        state.mocks().record_call(&target);
        state.update_overrides(|overrides| {
            overrides.test_timeout = Duration::from_secs(99);
        });

        if self.take_mid_run.load(Ordering::SeqCst) {
            let report = self.coverage.take().await?;
            self.taken.lock().unwrap().push(report);
        }

        let gate = self.gate.lock().unwrap().clone();
        if let Some((gated, gate)) = gate {
            if &gated == file {
                gate.pass().await;
            }
        }

        let cancel = self.cancel_after.lock().unwrap().clone();
        if let Some((trigger, signal, reason)) = cancel {
            if &trigger == file {
                signal.deliver(reason);
            }
        }

        let fail = self.fail_on.lock().unwrap().clone();
        if fail.as_deref() == Some(file.as_path()) {
            bail!("case engine failed in {}", file.display());
        }
        Ok(())
    }
}

impl CaseEngine for RecordingEngine {
    fn run<'a>(
        &'a self,
        files: &'a [PathBuf],
        _runner: &'a dyn TestRunner,
        executor: &'a dyn ModuleExecutor,
        state: &'a WorkerState,
    ) -> EngineFuture<'a> {
        Box::pin(self.observe(RunMode::Execute, files, executor, state))
    }

    fn collect<'a>(
        &'a self,
        files: &'a [PathBuf],
        _runner: &'a dyn TestRunner,
        executor: &'a dyn ModuleExecutor,
        state: &'a WorkerState,
    ) -> EngineFuture<'a> {
        Box::pin(self.observe(RunMode::Collect, files, executor, state))
    }
}

/// Executor that only registers the specifier in the module cache.
pub struct StaticExecutor;

impl ModuleExecutor for StaticExecutor {
    fn load<'a>(&'a self, specifier: &'a Path, cache: &'a ModuleCache) -> ExecutorFuture<'a> {
        Box::pin(async move {
            cache.insert(specifier.display().to_string());
            Ok(())
        })
    }
}

/// Runner whose cancel hook records every reason it is handed.
#[derive(Default)]
pub struct RecordingRunner {
    reasons: Mutex<Vec<CancelReason>>,
}

impl RecordingRunner {
    pub fn reasons(&self) -> Vec<CancelReason> {
        self.reasons.lock().unwrap().clone()
    }
}

impl TestRunner for RecordingRunner {
    fn name(&self) -> &str {
        "recording"
    }

    fn as_cancelable(&self) -> Option<&dyn CancelableRunner> {
        Some(self)
    }
}

impl CancelableRunner for RecordingRunner {
    fn on_cancel(&self, reason: CancelReason) {
        self.reasons.lock().unwrap().push(reason);
    }
}

#[derive(Default)]
pub struct CountingInspector {
    pub closes: AtomicU64,
}

impl InspectorBridge for CountingInspector {
    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// One fully wired worker with probes on every seam.
pub struct WorkerHarness {
    pub runner: BatchRunner,
    pub config: Arc<ResolvedConfig>,
    pub events: Arc<EventLog>,
    pub backend: Arc<ScriptedBackend>,
    pub coverage: Arc<CoverageSession>,
    pub engine: Arc<RecordingEngine>,
    pub state: Arc<WorkerState>,
    pub telemetry: Arc<Telemetry>,
    pub signal: CancelSignal,
    pub test_runner: Arc<RecordingRunner>,
    pub environment: Arc<ProbeEnvironment>,
    pub inspector: Arc<CountingInspector>,
}

impl WorkerHarness {
    pub fn new(config: ResolvedConfig) -> Self {
        let config = Arc::new(config);
        let events = Arc::new(EventLog::default());
        let signal = CancelSignal::new();
        let state = Arc::new(WorkerState::from_config(0, &config, signal.clone()));
        let backend = Arc::new(ScriptedBackend::new(events.clone()));
        let coverage = Arc::new(CoverageSession::new(
            backend.clone(),
            config.coverage().clone(),
        ));
        let engine = Arc::new(RecordingEngine::new(coverage.clone(), events.clone()));
        let environment = Arc::new(ProbeEnvironment::new(events.clone()));
        let test_runner = Arc::new(RecordingRunner::default());
        let telemetry = Arc::new(Telemetry::default());
        let inspector = Arc::new(CountingInspector::default());

        let mut registry = EnvironmentRegistry::with_builtins();
        registry.register(environment.clone());

        let runner = BatchRunner::new(BatchRunnerParams {
            config: config.clone(),
            environments: Arc::new(registry),
            resolver: Arc::new(FixedRunnerResolver::new(test_runner.clone())),
            engine: engine.clone(),
            executor: Arc::new(StaticExecutor),
            coverage: coverage.clone(),
            inspector: Arc::new(InspectorHandle::new(inspector.clone())),
            state: state.clone(),
            telemetry: telemetry.clone(),
        });

        Self {
            runner,
            config,
            events,
            backend,
            coverage,
            engine,
            state,
            telemetry,
            signal,
            test_runner,
            environment,
            inspector,
        }
    }

    /// Descriptor pointing at the harness probe environment.
    pub fn descriptor(&self) -> ResolvedEnvironment {
        ResolvedEnvironment::new("probe", EnvironmentOptions::new())
    }
}
