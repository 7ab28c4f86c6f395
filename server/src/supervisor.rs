//! Ownership of per-connection workers
//!
//! Connection handlers are fire-and-forget: shutdown waits for the acceptor
//! only. The supervisor keeps track of what is still in flight so shutdown can
//! report it, and keeps the spawning strategy out of the protocol code.

use log::debug;
use std::future::Future;
use tokio_util::task::TaskTracker;

/// Spawns and tracks one task per client connection
#[derive(Debug, Clone, Default)]
pub struct ConnectionSupervisor {
    tracker: TaskTracker,
}

impl ConnectionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the worker for `client_id` on the current runtime
    pub fn spawn<F>(&self, client_id: u32, worker: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(worker);
        debug!(
            "Started worker for client {} ({} active)",
            client_id,
            self.tracker.len()
        );
    }

    /// Number of workers that have not finished yet
    pub fn active(&self) -> usize {
        self.tracker.len()
    }

    /// Marks the tracker closed; `active` then only counts draining workers
    pub fn close(&self) {
        self.tracker.close();
    }

    /// Waits until every worker finished or `limit` elapsed
    ///
    /// Returns true if all workers are done. Only meaningful after `close`.
    #[cfg(test)]
    pub(crate) async fn wait_idle(&self, limit: std::time::Duration) -> bool {
        tokio::time::timeout(limit, self.tracker.wait()).await.is_ok()
    }
}
