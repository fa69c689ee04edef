use anyhow::{bail, Context, Result};
use std::time::Duration;

const DEFAULT_TEST_TIMEOUT_SECS: u64 = 5;
const DEFAULT_TRUNCATE_THRESHOLD: usize = 40;
const DEFAULT_DEPENDENCY_DIR: &str = "node_modules";

/// Default module identities that survive isolation resets. These are the
/// runtime internals every file relies on; evicting them would break the
/// next file's setup.
pub const DEFAULT_RETAINED_MODULES: &[&str] = &["internal:runtime", "internal:mocker"];

/// Worker pool flavor the batch was scheduled on.
///
/// Only thread- and process-based pools participate in module/mock
/// isolation; VM pools recycle whole execution contexts instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    Threads,
    Forks,
    VmThreads,
    VmForks,
}

impl PoolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolKind::Threads => "threads",
            PoolKind::Forks => "forks",
            PoolKind::VmThreads => "vm-threads",
            PoolKind::VmForks => "vm-forks",
        }
    }
}

/// Per-pool-kind knobs. `isolate: None` means "use the default for this
/// pool kind" (true for threads and forks).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolKindOptions {
    pub isolate: Option<bool>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    pub threads: PoolKindOptions,
    pub forks: PoolKindOptions,
}

/// Coverage collection knobs carried into the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageOptions {
    pub enabled: bool,
    /// Directory names whose contents never leave the worker in a coverage
    /// report (dependency stores such as `node_modules`).
    pub dependency_dirs: Vec<String>,
}

impl Default for CoverageOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            dependency_dirs: vec![DEFAULT_DEPENDENCY_DIR.to_owned()],
        }
    }
}

/// Assertion-library presentation options installed at batch setup and
/// re-installed by the always-reset step after every file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssertionConfig {
    /// Maximum rendered length for actual/expected values; 0 disables
    /// truncation.
    pub truncate_threshold: usize,
    pub include_stack: bool,
    pub show_diff: bool,
}

impl Default for AssertionConfig {
    fn default() -> Self {
        Self {
            truncate_threshold: DEFAULT_TRUNCATE_THRESHOLD,
            include_stack: false,
            show_diff: true,
        }
    }
}

/// The slice of configuration a test file may override at runtime.
///
/// The worker state holds one of these; the always-reset step reverts it to
/// the batch-level values after every file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeOverrides {
    pub assertion: AssertionConfig,
    pub test_timeout: Duration,
}

impl RuntimeOverrides {
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self {
            assertion: config.assertion(),
            test_timeout: config.test_timeout(),
        }
    }
}

/// Immutable configuration snapshot for one batch run.
///
/// All instances must be constructed via [`ResolvedConfig::builder`] or
/// [`ResolvedConfig::new`] so invariants are validated before any consumer
/// observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pool: PoolKind,
    pool_options: PoolOptions,
    coverage: CoverageOptions,
    assertion: AssertionConfig,
    test_timeout: Duration,
    retained_modules: Vec<String>,
}

pub struct ResolvedConfigParams {
    pub pool: PoolKind,
    pub pool_options: PoolOptions,
    pub coverage: CoverageOptions,
    pub assertion: AssertionConfig,
    pub test_timeout: Duration,
    pub retained_modules: Vec<String>,
}

impl ResolvedConfig {
    /// Returns a builder to incrementally construct and validate a
    /// configuration.
    pub fn builder() -> ResolvedConfigBuilder {
        ResolvedConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    ///
    /// Prefer [`ResolvedConfig::builder`] when many values use defaults.
    pub fn new(params: ResolvedConfigParams) -> Result<Self> {
        let ResolvedConfigParams {
            pool,
            pool_options,
            coverage,
            assertion,
            test_timeout,
            retained_modules,
        } = params;

        let coverage = CoverageOptions {
            enabled: coverage.enabled,
            dependency_dirs: coverage
                .dependency_dirs
                .into_iter()
                .map(normalized_dir_name)
                .collect(),
        };

        let config = Self {
            pool,
            pool_options,
            coverage,
            assertion,
            test_timeout,
            retained_modules: retained_modules
                .into_iter()
                .map(|id| id.trim().to_owned())
                .collect(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Pool flavor the batch runs on.
    pub fn pool(&self) -> PoolKind {
        self.pool
    }

    /// Per-pool-kind options, including the isolation overrides.
    pub fn pool_options(&self) -> &PoolOptions {
        &self.pool_options
    }

    /// Coverage collection options.
    pub fn coverage(&self) -> &CoverageOptions {
        &self.coverage
    }

    /// Batch-level assertion presentation options.
    pub fn assertion(&self) -> AssertionConfig {
        self.assertion
    }

    /// Per-test timeout applied by the execution engine.
    pub fn test_timeout(&self) -> Duration {
        self.test_timeout
    }

    /// Module identities that survive isolation resets.
    pub fn retained_modules(&self) -> &[String] {
        &self.retained_modules
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        if self.test_timeout.is_zero() {
            bail!("test_timeout must be greater than 0");
        }

        for dir in &self.coverage.dependency_dirs {
            if dir.is_empty() {
                bail!("coverage dependency_dirs entries cannot be empty");
            }
            if dir.contains('/') || dir.contains('\\') {
                bail!(
                    "coverage dependency_dirs entry {dir:?} must be a bare directory name \
                     without path separators"
                );
            }
        }

        for module in &self.retained_modules {
            if module.is_empty() {
                bail!("retained_modules entries cannot be empty");
            }
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct ResolvedConfigBuilder {
    pool: Option<PoolKind>,
    pool_options: Option<PoolOptions>,
    coverage: Option<CoverageOptions>,
    assertion: Option<AssertionConfig>,
    test_timeout: Option<Duration>,
    retained_modules: Option<Vec<String>>,
}

impl ResolvedConfigBuilder {
    pub fn pool(mut self, pool: PoolKind) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn pool_options(mut self, options: PoolOptions) -> Self {
        self.pool_options = Some(options);
        self
    }

    /// Sets the isolation override for both thread and fork pools.
    pub fn isolate(mut self, isolate: bool) -> Self {
        let mut options = self.pool_options.unwrap_or_default();
        options.threads.isolate = Some(isolate);
        options.forks.isolate = Some(isolate);
        self.pool_options = Some(options);
        self
    }

    pub fn coverage(mut self, options: CoverageOptions) -> Self {
        self.coverage = Some(options);
        self
    }

    pub fn assertion(mut self, config: AssertionConfig) -> Self {
        self.assertion = Some(config);
        self
    }

    pub fn test_timeout(mut self, timeout: Duration) -> Self {
        self.test_timeout = Some(timeout);
        self
    }

    pub fn retained_modules(mut self, modules: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.retained_modules = Some(modules.into_iter().map(Into::into).collect());
        self
    }

    pub fn build(self) -> Result<ResolvedConfig> {
        let params = ResolvedConfigParams {
            pool: self.pool.context("pool is required")?,
            pool_options: self.pool_options.unwrap_or_default(),
            coverage: self.coverage.unwrap_or_default(),
            assertion: self.assertion.unwrap_or_default(),
            test_timeout: self
                .test_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_TEST_TIMEOUT_SECS)),
            retained_modules: self.retained_modules.unwrap_or_else(|| {
                DEFAULT_RETAINED_MODULES
                    .iter()
                    .map(|id| (*id).to_owned())
                    .collect()
            }),
        };

        ResolvedConfig::new(params)
    }
}

fn normalized_dir_name(value: String) -> String {
    value
        .trim()
        .trim_end_matches(['/', '\\'])
        .to_owned()
}
