use crate::coverage::sample::CoverageReport;
use crate::coverage::session::CoverageSession;
use crate::environment::lifecycle::with_environment;
use crate::environment::registry::{EnvironmentRegistry, ResolvedEnvironment};
use crate::isolation::policy::should_isolate;
use crate::runtime::cancel::CancelReason;
use crate::runtime::config::ResolvedConfig;
use crate::runtime::telemetry::Telemetry;
use crate::worker::bridge::{spawn_cancel_bridge, InspectorHandle};
use crate::worker::runner::{CaseEngine, ModuleExecutor, RunnerResolver, TestRunner};
use crate::worker::state::{PhaseTimings, WorkerState};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// What a batch does with its files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunMode {
    /// Execute test cases.
    Execute,
    /// Build the test structure without executing case bodies.
    Collect,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Execute => "execute",
            RunMode::Collect => "collect",
        }
    }
}

/// Terminal status of one file within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FileStatus {
    Completed,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOutcome {
    pub path: PathBuf,
    pub status: FileStatus,
}

/// Terminal status of the whole batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BatchStatus {
    /// Every file in the batch was visited.
    Completed,
    /// A cancellation stopped the batch before the remaining files started.
    Interrupted(CancelReason),
}

/// Everything the caller learns about a finished batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub status: BatchStatus,
    pub files: Vec<FileOutcome>,
    pub timings: PhaseTimings,
}

impl BatchSummary {
    pub fn is_interrupted(&self) -> bool {
        matches!(self.status, BatchStatus::Interrupted(_))
    }

    pub fn completed_count(&self) -> usize {
        self.files
            .iter()
            .filter(|file| file.status == FileStatus::Completed)
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.files
            .iter()
            .filter(|file| matches!(file.status, FileStatus::Failed(_)))
            .count()
    }
}

pub struct BatchRunnerParams {
    pub config: Arc<ResolvedConfig>,
    pub environments: Arc<EnvironmentRegistry>,
    pub resolver: Arc<dyn RunnerResolver>,
    pub engine: Arc<dyn CaseEngine>,
    pub executor: Arc<dyn ModuleExecutor>,
    pub coverage: Arc<CoverageSession>,
    pub inspector: Arc<InspectorHandle>,
    pub state: Arc<WorkerState>,
    pub telemetry: Arc<Telemetry>,
}

/// Drives one batch of files through the worker: coverage bracket around the
/// environment, per-file isolation and always-reset steps, and the
/// cancellation bridge.
pub struct BatchRunner {
    config: Arc<ResolvedConfig>,
    environments: Arc<EnvironmentRegistry>,
    resolver: Arc<dyn RunnerResolver>,
    engine: Arc<dyn CaseEngine>,
    executor: Arc<dyn ModuleExecutor>,
    coverage: Arc<CoverageSession>,
    inspector: Arc<InspectorHandle>,
    state: Arc<WorkerState>,
    telemetry: Arc<Telemetry>,
}

impl BatchRunner {
    pub fn new(params: BatchRunnerParams) -> Self {
        let BatchRunnerParams {
            config,
            environments,
            resolver,
            engine,
            executor,
            coverage,
            inspector,
            state,
            telemetry,
        } = params;

        Self {
            config,
            environments,
            resolver,
            engine,
            executor,
            coverage,
            inspector,
            state,
            telemetry,
        }
    }

    pub fn state(&self) -> &WorkerState {
        &self.state
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Runs one batch to completion or interruption.
    ///
    /// Coverage starts before the environment goes up and stops inside the
    /// environment body after the last file, so environment setup and
    /// teardown are excluded from collection while file execution is fully
    /// covered.
    #[tracing::instrument(name = "batch", skip_all, fields(
        worker = self.state.worker_id(),
        mode = mode.as_str(),
        files = files.len(),
    ))]
    pub async fn run(
        &self,
        mode: RunMode,
        files: Vec<PathBuf>,
        environment: &ResolvedEnvironment,
    ) -> Result<BatchSummary> {
        let prepare_started = Instant::now();
        tracing::info!(environment = environment.name(), "batch started");

        let seeded = self.state.module_cache().seed_retained();
        tracing::debug!(retained = seeded, "runtime internals registered");

        self.coverage
            .start()
            .await
            .context("failed to start coverage collection")?;

        self.state.reset_overrides(&self.config);

        let runner = match self.resolver.resolve(self.config.clone()).await {
            Ok(runner) => runner,
            Err(error) => {
                self.stop_coverage_best_effort().await;
                return Err(error.context("failed to resolve test runner"));
            }
        };

        let bridge = spawn_cancel_bridge(
            self.state.cancel_signal(),
            runner.clone(),
            self.inspector.clone(),
        );
        self.state.record_prepare(prepare_started.elapsed());

        let result = self
            .execute_batch(mode, &files, environment, runner.as_ref())
            .await;
        if self.state.cancel_signal().is_cancelled() {
            // A delivered cancellation means the bridge is completing; wait
            // for it so the runner hook lands before the summary does.
            if let Err(error) = bridge.await {
                if !error.is_cancelled() {
                    tracing::warn!("cancellation bridge task failed: {error}");
                }
            }
        } else {
            bridge.abort();
        }

        let (status, outcomes) = match result {
            Ok(parts) => parts,
            Err(error) => {
                self.stop_coverage_best_effort().await;
                return Err(error);
            }
        };

        let summary = BatchSummary {
            status,
            files: outcomes,
            timings: self.state.timings(),
        };
        match summary.status {
            BatchStatus::Interrupted(reason) => {
                self.telemetry.record_batch_interrupted();
                tracing::info!(
                    reason = reason.as_str(),
                    completed = summary.completed_count(),
                    "batch interrupted"
                );
            }
            BatchStatus::Completed => {
                tracing::info!(
                    completed = summary.completed_count(),
                    failed = summary.failed_count(),
                    "batch finished"
                );
            }
        }
        Ok(summary)
    }

    /// Filtered coverage collected so far. Outside an active bracket this
    /// resolves to an empty report.
    pub async fn take_coverage(&self) -> Result<CoverageReport> {
        let report = self
            .coverage
            .take()
            .await
            .context("failed to take coverage snapshot")?;
        self.telemetry.record_coverage_snapshot();
        Ok(report)
    }

    async fn execute_batch(
        &self,
        mode: RunMode,
        files: &[PathBuf],
        environment: &ResolvedEnvironment,
        runner: &dyn TestRunner,
    ) -> Result<(BatchStatus, Vec<FileOutcome>)> {
        let signal = self.state.cancel_signal();
        if let Some(reason) = signal.reason() {
            // Cancelled before the environment went up. Nothing was
            // installed, so the teardown is already complete.
            self.stop_coverage_best_effort().await;
            self.state.mark_environment_teardown();
            tracing::info!(reason = reason.as_str(), "batch cancelled before setup");
            return Ok((BatchStatus::Interrupted(reason), Vec::new()));
        }

        let mut outcomes = Vec::with_capacity(files.len());
        let status = with_environment(&self.environments, environment, &self.state, || async {
            let status = self.run_files(mode, files, runner, &mut outcomes).await;
            self.stop_coverage_best_effort().await;
            Ok(status)
        })
        .await?;

        Ok((status, outcomes))
    }

    async fn run_files(
        &self,
        mode: RunMode,
        files: &[PathBuf],
        runner: &dyn TestRunner,
        outcomes: &mut Vec<FileOutcome>,
    ) -> BatchStatus {
        if files.is_empty() {
            // Explicit guard: an empty batch performs no resets at all.
            tracing::info!("empty batch, nothing to run");
            return BatchStatus::Completed;
        }

        let signal = self.state.cancel_signal();
        let isolate = should_isolate(self.config.pool(), self.config.pool_options());

        for file in files {
            if let Some(reason) = signal.reason() {
                tracing::info!(
                    reason = reason.as_str(),
                    remaining = files.len() - outcomes.len(),
                    "cancellation observed between files"
                );
                return BatchStatus::Interrupted(reason);
            }

            if isolate {
                // Mocks go first so module eviction never observes half
                // restored replacements.
                let mocks = self.state.mocks().reset_all();
                let evicted = self.state.module_cache().evict_user_modules();
                self.telemetry.record_isolation_reset();
                tracing::debug!(
                    mocks,
                    evicted,
                    file = %file.display(),
                    "isolation reset applied"
                );
            }

            self.state.set_current_file(file);
            self.telemetry.record_file_started();
            tracing::debug!(file = %file.display(), "file started");

            let file_started = Instant::now();
            let result = match mode {
                RunMode::Execute => {
                    self.engine
                        .run(
                            std::slice::from_ref(file),
                            runner,
                            self.executor.as_ref(),
                            &self.state,
                        )
                        .await
                }
                RunMode::Collect => {
                    self.engine
                        .collect(
                            std::slice::from_ref(file),
                            runner,
                            self.executor.as_ref(),
                            &self.state,
                        )
                        .await
                }
            };
            let elapsed = file_started.elapsed();
            match mode {
                RunMode::Execute => self.state.add_run(elapsed),
                RunMode::Collect => self.state.add_collect(elapsed),
            }

            match result {
                Ok(()) => {
                    self.telemetry.record_file_completed();
                    outcomes.push(FileOutcome {
                        path: file.clone(),
                        status: FileStatus::Completed,
                    });
                }
                Err(error) => {
                    self.telemetry.record_file_failed();
                    tracing::warn!(file = %file.display(), "file failed: {error:#}");
                    outcomes.push(FileOutcome {
                        path: file.clone(),
                        status: FileStatus::Failed(format!("{error:#}")),
                    });
                }
            }

            // Always-reset, applied after failures as much as successes.
            self.state.clear_current_file();
            self.state.reset_overrides(&self.config);
            let restored = self.state.mocks().restore_all();
            self.telemetry.record_post_file_reset();
            tracing::debug!(restored, file = %file.display(), "post-file reset applied");
        }

        BatchStatus::Completed
    }

    async fn stop_coverage_best_effort(&self) {
        if let Err(error) = self.coverage.stop().await {
            tracing::warn!("failed to stop coverage collection: {error}");
        }
    }
}
