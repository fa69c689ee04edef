use crate::runtime::config::{PoolKind, PoolOptions};

/// Decides whether the batch applies the per-file isolation reset.
///
/// Thread and fork pools isolate unless their options opt out. Vm pools
/// recycle whole execution contexts between files, so the in-worker reset
/// never applies to them regardless of options.
pub fn should_isolate(pool: PoolKind, options: &PoolOptions) -> bool {
    match pool {
        PoolKind::Threads => options.threads.isolate.unwrap_or(true),
        PoolKind::Forks => options.forks.isolate.unwrap_or(true),
        PoolKind::VmThreads | PoolKind::VmForks => false,
    }
}
