use crate::environment::registry::{EnvironmentError, EnvironmentRegistry, ResolvedEnvironment};
use crate::worker::state::WorkerState;
use anyhow::Result;
use core::future::Future;
use std::time::Instant;

/// Runs `body` inside the environment named by `descriptor`.
///
/// Setup happens before the body, teardown always happens after it, and the
/// worker state's teardown flag is set once the teardown has been attempted.
/// A setup failure skips both the body and the teardown, so the flag stays
/// unset. When the body and the teardown both fail, the body error wins and
/// the teardown failure is only logged.
pub async fn with_environment<T, F, Fut>(
    registry: &EnvironmentRegistry,
    descriptor: &ResolvedEnvironment,
    state: &WorkerState,
    body: F,
) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let provider = registry.resolve(descriptor.name())?;

    let setup_started = Instant::now();
    let mut active = provider
        .setup(descriptor.options().clone())
        .await
        .map_err(|source| EnvironmentError::Setup {
            name: descriptor.name().to_owned(),
            source,
        })?;
    state.add_environment(setup_started.elapsed());
    tracing::debug!(environment = descriptor.name(), "environment ready");

    let outcome = body().await;

    let teardown_started = Instant::now();
    let teardown = active.teardown().await;
    state.add_environment(teardown_started.elapsed());
    state.mark_environment_teardown();

    match (outcome, teardown) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(source)) => Err(EnvironmentError::Teardown {
            name: descriptor.name().to_owned(),
            source,
        }
        .into()),
        (Err(body_error), teardown) => {
            if let Err(error) = teardown {
                tracing::warn!(
                    environment = descriptor.name(),
                    "environment teardown failed after run error: {error:#}"
                );
            }
            Err(body_error)
        }
    }
}
