//! In-flight request tracking.
//!
//! # Responsibilities
//! - Count requests spawned by the dispatch loop
//! - Let shutdown wait until every request task has finished

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::observability::metrics;

/// Tracks active requests for graceful shutdown.
#[derive(Debug, Clone)]
pub struct RequestTracker {
    active: Arc<watch::Sender<usize>>,
}

impl RequestTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { active: Arc::new(tx) }
    }

    /// Record a new active request. Returns a guard that decrements on drop.
    pub fn track(&self) -> RequestGuard {
        self.active.send_modify(|n| *n += 1);
        metrics::request_started();
        RequestGuard {
            active: Arc::clone(&self.active),
        }
    }

    pub fn active_count(&self) -> usize {
        *self.active.borrow()
    }

    /// Wait until no request is active, or `grace` elapses.
    /// Returns the number of requests still running.
    pub async fn drain(&self, grace: Duration) -> usize {
        let mut rx = self.active.subscribe();
        let _ = tokio::time::timeout(grace, rx.wait_for(|n| *n == 0)).await;
        self.active_count()
    }
}

impl Default for RequestTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that tracks a request's lifetime.
/// Decrements the active count when dropped, including on panic.
#[derive(Debug)]
pub struct RequestGuard {
    active: Arc<watch::Sender<usize>>,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.active.send_modify(|n| *n = n.saturating_sub(1));
        metrics::request_finished();
    }
}
