use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Why a batch was asked to stop.
///
/// Delivered at most once per signal; once a reason has landed no further
/// run should be attempted for the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CancelReason {
    Timeout,
    UserInterrupt,
    ParentShutdown,
}

impl CancelReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelReason::Timeout => "timeout",
            CancelReason::UserInterrupt => "user-interrupt",
            CancelReason::ParentShutdown => "parent-shutdown",
        }
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single-resolution cancellation signal shared between the batch loop, the
/// cancellation bridge, and external shutdown machinery.
///
/// Clones share the same underlying state. The first delivered reason wins;
/// duplicate deliveries are ignored.
#[derive(Clone)]
pub struct CancelSignal {
    inner: Arc<CancelInner>,
}

struct CancelInner {
    delivered: AtomicBool,
    reason: Mutex<Option<CancelReason>>,
    token: CancellationToken,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancelInner {
                delivered: AtomicBool::new(false),
                reason: Mutex::new(None),
                token: CancellationToken::new(),
            }),
        }
    }

    /// Delivers a cancellation reason. Returns `true` when this call was the
    /// first delivery.
    pub fn deliver(&self, reason: CancelReason) -> bool {
        if self.inner.delivered.swap(true, Ordering::SeqCst) {
            tracing::debug!(reason = %reason, "ignoring duplicate cancellation delivery");
            return false;
        }

        {
            let mut slot = self.inner.reason.lock().unwrap();
            *slot = Some(reason);
        }
        self.inner.token.cancel();
        tracing::info!(reason = %reason, "cancellation delivered");
        true
    }

    /// Reason behind a pending cancellation, or `None` while the signal is
    /// still unresolved.
    ///
    /// The raw token may be cancelled externally without a recorded reason;
    /// that reads back as a parent shutdown.
    pub fn reason(&self) -> Option<CancelReason> {
        let recorded = *self.inner.reason.lock().unwrap();
        if recorded.is_some() {
            return recorded;
        }
        if self.inner.token.is_cancelled() {
            return Some(CancelReason::ParentShutdown);
        }
        None
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Resolves once cancellation lands, yielding the reason.
    pub async fn cancelled(&self) -> CancelReason {
        self.inner.token.cancelled().await;
        self.reason().unwrap_or(CancelReason::ParentShutdown)
    }

    /// Raw token so callers can integrate with their own signal handlers or
    /// cancellation strategies.
    pub fn token(&self) -> CancellationToken {
        self.inner.token.clone()
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}
