use crate::isolation::module_cache::ModuleCache;
use crate::runtime::cancel::CancelReason;
use crate::runtime::config::ResolvedConfig;
use crate::worker::state::WorkerState;
use anyhow::Result;
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub type EngineFuture<'a> = BoxFuture<'a, Result<()>>;
pub type ExecutorFuture<'a> = BoxFuture<'a, Result<()>>;
pub type RunnerFuture<'a> = BoxFuture<'a, Result<Arc<dyn TestRunner>>>;

/// The framework-facing runner that drives hooks and cases inside a file.
pub trait TestRunner: Send + Sync + 'static {
    /// Runner name, for logs.
    fn name(&self) -> &str;

    /// Cancellation-aware view of the runner, when it has one. Runners
    /// without one simply never hear about cancellations.
    fn as_cancelable(&self) -> Option<&dyn CancelableRunner> {
        None
    }
}

/// Optional runner extension notified once per delivered cancellation.
pub trait CancelableRunner: Send + Sync {
    fn on_cancel(&self, reason: CancelReason);
}

/// Resolves the runner for a batch. Implementations may load framework
/// extensions, so resolution is async and can fail.
pub trait RunnerResolver: Send + Sync + 'static {
    fn resolve(&self, config: Arc<ResolvedConfig>) -> RunnerFuture<'_>;
}

/// Loads one module graph into the worker's cache.
pub trait ModuleExecutor: Send + Sync + 'static {
    fn load<'a>(&'a self, specifier: &'a Path, cache: &'a ModuleCache) -> ExecutorFuture<'a>;
}

/// Executes or collects the cases of the given files through the runner.
///
/// `collect` builds the test structure without executing case bodies; both
/// entry points load modules through the executor so caching behaves the
/// same in either mode.
pub trait CaseEngine: Send + Sync + 'static {
    fn run<'a>(
        &'a self,
        files: &'a [PathBuf],
        runner: &'a dyn TestRunner,
        executor: &'a dyn ModuleExecutor,
        state: &'a WorkerState,
    ) -> EngineFuture<'a>;

    fn collect<'a>(
        &'a self,
        files: &'a [PathBuf],
        runner: &'a dyn TestRunner,
        executor: &'a dyn ModuleExecutor,
        state: &'a WorkerState,
    ) -> EngineFuture<'a>;
}

/// Resolver that always serves the same pre-built runner.
pub struct FixedRunnerResolver {
    runner: Arc<dyn TestRunner>,
}

impl FixedRunnerResolver {
    pub fn new(runner: Arc<dyn TestRunner>) -> Self {
        Self { runner }
    }
}

impl RunnerResolver for FixedRunnerResolver {
    fn resolve(&self, _config: Arc<ResolvedConfig>) -> RunnerFuture<'_> {
        let runner = self.runner.clone();
        Box::pin(async move { Ok(runner) })
    }
}
