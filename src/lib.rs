pub mod coverage;
pub mod environment;
pub mod isolation;
pub mod runtime;
pub mod worker;

pub use coverage::filter::{classify_source, filter_report, SourceClass};
pub use coverage::sample::{CoverageRange, CoverageReport, FunctionCoverage, ScriptCoverage};
pub use coverage::session::{
    CoverageBackend, CoverageError, CoverageFuture, CoverageSession, CoverageStage,
    CoverageTakeFuture,
};
pub use environment::lifecycle::with_environment;
pub use environment::registry::{
    ActiveEnvironment, EnvironmentError, EnvironmentOptions, EnvironmentProvider,
    EnvironmentRegistry, PlainEnvironment, ResolvedEnvironment,
};
pub use isolation::mocks::{MockEntry, MockRegistry};
pub use isolation::module_cache::ModuleCache;
pub use isolation::policy::should_isolate;
pub use runtime::cancel::{CancelReason, CancelSignal};
pub use runtime::config::{
    AssertionConfig, CoverageOptions, PoolKind, PoolKindOptions, PoolOptions, ResolvedConfig,
    ResolvedConfigBuilder, ResolvedConfigParams, RuntimeOverrides,
};
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use worker::batch::{
    BatchRunner, BatchRunnerParams, BatchStatus, BatchSummary, FileOutcome, FileStatus, RunMode,
};
pub use worker::bridge::{spawn_cancel_bridge, InspectorBridge, InspectorHandle, NullInspector};
pub use worker::runner::{
    CancelableRunner, CaseEngine, EngineFuture, ExecutorFuture, FixedRunnerResolver,
    ModuleExecutor, RunnerFuture, RunnerResolver, TestRunner,
};
pub use worker::state::{PhaseTimings, WorkerState, WorkerStateParams};
