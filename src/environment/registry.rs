use anyhow::Result;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Opaque options bag forwarded verbatim to the provider's setup hook.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentOptions {
    values: HashMap<String, serde_json::Value>,
}

impl EnvironmentOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) -> &mut Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Environment descriptor attached to a batch: which provider to use and the
/// options to hand it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedEnvironment {
    name: String,
    options: EnvironmentOptions,
}

impl ResolvedEnvironment {
    pub fn new(name: impl Into<String>, options: EnvironmentOptions) -> Self {
        Self {
            name: name.into(),
            options,
        }
    }

    /// Provider name, e.g. `plain`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &EnvironmentOptions {
        &self.options
    }
}

/// Errors raised while resolving or driving an environment.
#[derive(Debug)]
pub enum EnvironmentError {
    UnknownEnvironment { name: String },
    Setup { name: String, source: anyhow::Error },
    Teardown { name: String, source: anyhow::Error },
}

impl core::fmt::Display for EnvironmentError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::UnknownEnvironment { name } => {
                write!(f, "unknown environment: {name}")
            }
            Self::Setup { name, source } => {
                write!(f, "environment {name} setup failed: {source}")
            }
            Self::Teardown { name, source } => {
                write!(f, "environment {name} teardown failed: {source}")
            }
        }
    }
}

impl std::error::Error for EnvironmentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::UnknownEnvironment { .. } => None,
            Self::Setup { source, .. } | Self::Teardown { source, .. } => {
                Some(source.as_ref())
            }
        }
    }
}

/// A live environment produced by [`EnvironmentProvider::setup`]. Dropping it
/// without calling [`ActiveEnvironment::teardown`] leaks whatever the setup
/// installed.
pub trait ActiveEnvironment: Send {
    fn teardown(&mut self) -> BoxFuture<'_, Result<()>>;
}

/// Factory for one kind of execution environment.
pub trait EnvironmentProvider: Send + Sync + 'static {
    /// Registry key; `ResolvedEnvironment::name` values refer to this.
    fn name(&self) -> &str;

    /// Installs the environment and returns the handle that undoes it.
    fn setup(&self, options: EnvironmentOptions)
        -> BoxFuture<'_, Result<Box<dyn ActiveEnvironment>>>;
}

impl core::fmt::Debug for dyn EnvironmentProvider {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EnvironmentProvider")
            .field("name", &self.name())
            .finish()
    }
}

/// Builtin provider that installs nothing. Batches that need no simulated
/// host still go through the same lifecycle with it.
pub struct PlainEnvironment;

impl EnvironmentProvider for PlainEnvironment {
    fn name(&self) -> &str {
        "plain"
    }

    fn setup(
        &self,
        _options: EnvironmentOptions,
    ) -> BoxFuture<'_, Result<Box<dyn ActiveEnvironment>>> {
        Box::pin(async { Ok(Box::new(PlainActive) as Box<dyn ActiveEnvironment>) })
    }
}

struct PlainActive;

impl ActiveEnvironment for PlainActive {
    fn teardown(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Name-keyed set of environment providers available to a worker.
pub struct EnvironmentRegistry {
    providers: HashMap<String, Arc<dyn EnvironmentProvider>>,
}

impl EnvironmentRegistry {
    /// Returns an empty registry with no providers at all.
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Returns a registry preloaded with the builtin providers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PlainEnvironment));
        registry
    }

    /// Registers a provider under its own name, replacing any previous
    /// provider with the same name.
    pub fn register(&mut self, provider: Arc<dyn EnvironmentProvider>) {
        self.providers.insert(provider.name().to_owned(), provider);
    }

    pub fn resolve(
        &self,
        name: &str,
    ) -> Result<Arc<dyn EnvironmentProvider>, EnvironmentError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| EnvironmentError::UnknownEnvironment {
                name: name.to_owned(),
            })
    }

    /// Registered provider names, sorted for stable log output.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for EnvironmentRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
