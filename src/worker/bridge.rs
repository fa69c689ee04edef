use crate::runtime::cancel::CancelSignal;
use crate::worker::runner::TestRunner;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Debugger attachment living alongside the worker.
pub trait InspectorBridge: Send + Sync + 'static {
    /// Detaches the debugger. [`InspectorHandle`] guarantees at most one
    /// call per handle.
    fn close(&self);
}

/// Bridge used when no debugger is attached.
pub struct NullInspector;

impl InspectorBridge for NullInspector {
    fn close(&self) {}
}

/// At-most-once wrapper around the inspector bridge.
pub struct InspectorHandle {
    bridge: Arc<dyn InspectorBridge>,
    closed: AtomicBool,
}

impl InspectorHandle {
    pub fn new(bridge: Arc<dyn InspectorBridge>) -> Self {
        Self {
            bridge,
            closed: AtomicBool::new(false),
        }
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(NullInspector))
    }

    /// Closes the bridge on the first call. Returns `false` when the handle
    /// was already closed.
    pub fn close_once(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.bridge.close();
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Spawns the task that reacts to a delivered cancellation.
///
/// On delivery the inspector detaches first, then the runner's cancel hook
/// fires with the recorded reason. The caller owns the handle: await it when
/// a cancellation landed, abort it when the batch ends without one.
pub fn spawn_cancel_bridge(
    signal: CancelSignal,
    runner: Arc<dyn TestRunner>,
    inspector: Arc<InspectorHandle>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let reason = signal.cancelled().await;
        inspector.close_once();
        if let Some(cancelable) = runner.as_cancelable() {
            cancelable.on_cancel(reason);
        }
        tracing::debug!(
            reason = reason.as_str(),
            runner = runner.name(),
            "cancellation bridge notified runner"
        );
    })
}
